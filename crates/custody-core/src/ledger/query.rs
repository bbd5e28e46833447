//! Read paths over the ledger: filtered listings and per-subject trails.
//!
//! All functions take a shared `&Connection`, rely on normal snapshot
//! isolation, and never touch the tail lock. Rows come back as typed
//! [`LedgerEntry`] values, never raw rows.

use anyhow::{Context, Result};
use rusqlite::{Connection, params_from_iter};
use std::str::FromStr;

use crate::event::{EventData, EventType, LedgerEntry};

/// Optional filters for [`list_events`].
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only entries of this event type.
    pub event_type: Option<EventType>,
    /// Only entries about this subject.
    pub subject_id: Option<String>,
}

/// One page of a filtered listing, plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPage {
    /// Entries in ascending sequence order.
    pub entries: Vec<LedgerEntry>,
    /// Total entries matching the filter, ignoring offset/limit.
    pub total: u64,
}

const ENTRY_COLUMNS: &str = "sequence_number, event_type, subject_id, event_data, \
                             actor_id, entry_hash, previous_hash, created_at_us";

/// List ledger entries with optional filters and offset/limit paging.
///
/// # Errors
///
/// Returns an error on store failure or when a stored row no longer decodes
/// (corruption belongs to `verify_chain`; the read path reports it loudly).
pub fn list_events(
    conn: &Connection,
    filter: &EventFilter,
    offset: u64,
    limit: u64,
) -> Result<EventPage> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if let Some(event_type) = filter.event_type {
        conditions.push("event_type = ?");
        params.push(event_type.as_str().to_string());
    }
    if let Some(subject_id) = &filter.subject_id {
        conditions.push("subject_id = ?");
        params.push(subject_id.clone());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let total: u64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM ledger_entries{where_clause}"),
            params_from_iter(params.iter()),
            |row| row.get::<_, i64>(0),
        )
        .context("count ledger entries")?
        .try_into()
        .context("negative entry count")?;

    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries{where_clause}
         ORDER BY sequence_number ASC LIMIT {limit} OFFSET {offset}"
    );
    let mut stmt = conn.prepare(&sql).context("prepare listing query")?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), row_to_entry)
        .context("run listing query")?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.context("decode ledger entry row")?);
    }

    Ok(EventPage { entries, total })
}

/// The full audit trail for one subject, in ascending sequence order.
///
/// # Errors
///
/// Returns an error on store failure or row decode failure.
pub fn trail(conn: &Connection, subject_id: &str) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries
             WHERE subject_id = ?1 ORDER BY sequence_number ASC"
        ))
        .context("prepare trail query")?;

    let rows = stmt
        .query_map([subject_id], row_to_entry)
        .context("run trail query")?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.context("decode ledger entry row")?);
    }
    Ok(entries)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let type_raw: String = row.get(1)?;
    let event_type = EventType::from_str(&type_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let data_json: String = row.get(3)?;
    let data = EventData::deserialize_for(event_type, &data_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(LedgerEntry {
        sequence_number: row.get(0)?,
        event_type,
        subject_id: row.get(2)?,
        data,
        actor_id: row.get(4)?,
        entry_hash: row.get(5)?,
        previous_hash: row.get(6)?,
        created_at_us: row.get(7)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
