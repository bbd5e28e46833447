//! Ledger append service — the single serialized section of the core.
//!
//! [`append`] is the only code that writes `ledger_entries` rows. It runs
//! inside an exclusive serialization scope: the [`TailLock`] advisory file
//! lock plus an immediate-mode SQLite transaction, covering the read of the
//! current tail and the insert of the new row as one atomic unit. Two
//! appenders interleaving without this scope could compute the same
//! `previous_hash` and fork the chain; with it, every reader observes
//! entries in gapless `sequence_number` order by construction.
//!
//! The scope is held only for read-tail + hash + insert, and releases via
//! RAII on every exit path — a failed insert never strands the lock.

pub mod query;
pub mod verify;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use crate::error::ErrorCode;
use crate::event::{
    EventData, GENESIS_PREVIOUS_HASH, HashComputeError, LedgerEntry, compute_entry_hash_raw,
    to_canonical_json,
};
use crate::lock::{LockError, TailLock};

/// One append request: everything the caller decides, nothing the chain
/// decides. Sequence number, hashes, and timestamp are computed inside the
/// serialization scope.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    /// The media record, device, user, or tag the event concerns.
    pub subject_id: String,
    /// Typed payload; the event type is derived from the variant.
    pub data: EventData,
    /// User or device attribution, outside the hash.
    pub actor_id: Option<String>,
}

/// Append failure.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    /// The serialization scope could not be acquired (or the store reported
    /// busy) within the bounded wait. Retryable: the caller retries the
    /// whole append, not just the write.
    #[error("append contention: {0}")]
    Contention(String),

    /// Filesystem failure around the tail lock.
    #[error("tail lock I/O error: {0}")]
    Lock(#[from] std::io::Error),

    /// The event payload failed to serialize for hashing.
    #[error(transparent)]
    Hash(#[from] HashComputeError),

    /// The durable write failed.
    #[error("ledger entry write failed: {0}")]
    Storage(rusqlite::Error),
}

impl AppendError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Contention(_) => ErrorCode::AppendContention,
            Self::Lock(_) | Self::Hash(_) | Self::Storage(_) => ErrorCode::EntryWriteFailed,
        }
    }

    /// True when the caller should retry the whole append.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

impl From<LockError> for AppendError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { .. } => Self::Contention(err.to_string()),
            LockError::IoError(io) => Self::Lock(io),
        }
    }
}

impl From<rusqlite::Error> for AppendError {
    fn from(err: rusqlite::Error) -> Self {
        if is_busy(&err) {
            Self::Contention(err.to_string())
        } else {
            Self::Storage(err)
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// Append one event to the ledger.
///
/// Acquires the exclusive serialization scope, reads the current tail,
/// computes the next sequence number and chain hash, inserts the row, and
/// commits. The stored `event_data` is the canonical serialization — the
/// exact bytes the hash covers.
///
/// Never drops an event silently: every failure surfaces as an
/// [`AppendError`].
///
/// # Errors
///
/// [`AppendError::Contention`] when the lock or store is busy past the
/// bounded wait (retryable); other variants on hashing or storage failure.
pub fn append(
    conn: &mut Connection,
    lock_path: &Path,
    lock_timeout: Duration,
    request: AppendRequest,
) -> Result<LedgerEntry, AppendError> {
    let event_type = request.data.event_type();
    let data_json = to_canonical_json(&request.data.to_json_value().map_err(HashComputeError::from)?);

    // Exclusive scope: tail lock first, then an immediate transaction so
    // the write lock is taken up front rather than on first write.
    let guard = TailLock::acquire(lock_path, lock_timeout)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let tail: Option<(i64, String)> = tx
        .query_row(
            "SELECT sequence_number, entry_hash FROM ledger_entries
             ORDER BY sequence_number DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (sequence_number, previous_hash) = match tail {
        Some((seq, hash)) => (seq + 1, hash),
        None => (1, GENESIS_PREVIOUS_HASH.to_string()),
    };

    let created_at_us = Utc::now().timestamp_micros();
    let entry_hash = compute_entry_hash_raw(
        sequence_number,
        event_type.as_str(),
        &data_json,
        &previous_hash,
        created_at_us,
    );

    tx.execute(
        "INSERT INTO ledger_entries (
            sequence_number, event_type, subject_id, event_data,
            actor_id, entry_hash, previous_hash, created_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            sequence_number,
            event_type.as_str(),
            request.subject_id,
            data_json,
            request.actor_id,
            entry_hash,
            previous_hash,
            created_at_us,
        ],
    )?;
    tx.commit()?;
    guard.release();

    tracing::debug!(
        sequence = sequence_number,
        event = %event_type,
        subject = %request.subject_id,
        "ledger entry appended"
    );

    Ok(LedgerEntry {
        sequence_number,
        event_type,
        subject_id: request.subject_id,
        data: request.data,
        actor_id: request.actor_id,
        entry_hash,
        previous_hash,
        created_at_us,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::db;
    use crate::event::data::{TagDeletedData, VideoDeletedData};
    use crate::event::verify_entry_hash;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Connection, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tmp");
        let conn = db::open_ledger(&dir.path().join("ledger.sqlite3")).expect("open");
        let lock_path = dir.path().join("ledger.lock");
        (dir, conn, lock_path)
    }

    fn tag_request(tag: &str) -> AppendRequest {
        AppendRequest {
            subject_id: format!("tag:{tag}"),
            data: EventData::TagDeleted(TagDeletedData {
                tag: tag.into(),
                extra: BTreeMap::new(),
            }),
            actor_id: Some("admin:pat".into()),
        }
    }

    #[test]
    fn genesis_entry_gets_sequence_one_and_sentinel() {
        let (_dir, mut conn, lock) = setup();
        let entry = append(&mut conn, &lock, Duration::from_millis(100), tag_request("a"))
            .expect("append");

        assert_eq!(entry.sequence_number, 1);
        assert_eq!(entry.previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(entry.entry_hash.starts_with("blake3:"));
        assert!(verify_entry_hash(&entry).expect("verify"));
    }

    #[test]
    fn each_entry_links_to_its_predecessor() {
        let (_dir, mut conn, lock) = setup();
        let first = append(&mut conn, &lock, Duration::from_millis(100), tag_request("a"))
            .expect("append 1");
        let second = append(&mut conn, &lock, Duration::from_millis(100), tag_request("b"))
            .expect("append 2");
        let third = append(&mut conn, &lock, Duration::from_millis(100), tag_request("c"))
            .expect("append 3");

        assert_eq!(second.sequence_number, 2);
        assert_eq!(third.sequence_number, 3);
        assert_eq!(second.previous_hash, first.entry_hash);
        assert_eq!(third.previous_hash, second.entry_hash);
    }

    #[test]
    fn stored_event_data_is_canonical() {
        let (_dir, mut conn, lock) = setup();
        let mut extra = BTreeMap::new();
        extra.insert("zulu".to_string(), serde_json::json!(1));
        extra.insert("alpha".to_string(), serde_json::json!(2));
        let request = AppendRequest {
            subject_id: "md-1".into(),
            data: EventData::VideoDeleted(VideoDeletedData {
                reason: Some("expired".into()),
                extra,
            }),
            actor_id: None,
        };
        append(&mut conn, &lock, Duration::from_millis(100), request).expect("append");

        let stored: String = conn
            .query_row(
                "SELECT event_data FROM ledger_entries WHERE sequence_number = 1",
                [],
                |row| row.get(0),
            )
            .expect("stored");
        assert_eq!(stored, r#"{"alpha":2,"reason":"expired","zulu":1}"#);
    }

    #[test]
    fn held_lock_yields_retryable_contention() {
        let (_dir, mut conn, lock) = setup();
        let _held = TailLock::acquire(&lock, Duration::from_millis(100)).expect("hold");

        let err = append(&mut conn, &lock, Duration::from_millis(20), tag_request("a"))
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.code(), ErrorCode::AppendContention);
    }

    #[test]
    fn lock_is_free_after_failed_append() {
        let (_dir, mut conn, lock) = setup();
        // Force an insert failure by dropping the table out from under us.
        conn.execute_batch("DROP TABLE ledger_entries;").expect("drop");
        let err = append(&mut conn, &lock, Duration::from_millis(100), tag_request("a"))
            .unwrap_err();
        assert!(!err.is_retryable());

        // The scope must have been released despite the failure.
        let reacquired = TailLock::acquire(&lock, Duration::from_millis(50));
        assert!(reacquired.is_ok(), "failed append stranded the tail lock");
    }

    #[test]
    fn append_returns_entry_matching_storage() {
        let (_dir, mut conn, lock) = setup();
        let entry = append(&mut conn, &lock, Duration::from_millis(100), tag_request("a"))
            .expect("append");

        let (stored_hash, stored_prev, stored_ts): (String, String, i64) = conn
            .query_row(
                "SELECT entry_hash, previous_hash, created_at_us
                 FROM ledger_entries WHERE sequence_number = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .expect("row");
        assert_eq!(stored_hash, entry.entry_hash);
        assert_eq!(stored_prev, entry.previous_hash);
        assert_eq!(stored_ts, entry.created_at_us);
    }
}
