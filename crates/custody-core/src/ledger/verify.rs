//! Chain verification — proves the ledger's own integrity.
//!
//! [`verify_chain`] walks entries in ascending `sequence_number` order in
//! bounded batches, so memory stays O(batch) over unbounded history. The
//! only state carried between batches is the last sequence number and last
//! entry hash, which makes batching semantically transparent: batches of 1
//! and batches of 1,000 produce the identical report.
//!
//! Findings accumulate; the scan never aborts on the first problem, so a
//! single corruption cannot hide the ones behind it. The chain cannot
//! "throw" — it can only be found wrong.

use rusqlite::Connection;

use crate::error::ErrorCode;
use crate::event::{GENESIS_PREVIOUS_HASH, compute_entry_hash_raw, to_canonical_json};

/// Default batch size for the verification scan.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Aggregate verification report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainReport {
    /// True when every link recomputed correctly.
    pub valid: bool,
    /// How many entries the scan covered.
    pub entries_checked: u64,
    /// One finding per problem, in scan order.
    pub errors: Vec<String>,
}

/// Verification scan error (storage only — findings are data, not errors).
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Underlying store failure.
    #[error("chain verification storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl VerifyError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Storage(_) => ErrorCode::EntryWriteFailed,
        }
    }
}

/// Raw row shape for the scan. Verification works on stored bytes, not on
/// typed payloads: a row whose payload no longer parses is itself a finding.
struct RawEntry {
    sequence_number: i64,
    event_type: String,
    event_data: String,
    entry_hash: String,
    previous_hash: String,
    created_at_us: i64,
}

/// Batched, resumable verification walk.
///
/// Read-only and checkpointed at batch boundaries: callers may stop between
/// [`ChainWalker::step`] calls (cancellation, progress reporting) without
/// corrupting anything, then either resume or discard the walker.
pub struct ChainWalker<'c> {
    conn: &'c Connection,
    batch_size: usize,
    last_sequence: i64,
    last_hash: String,
    entries_checked: u64,
    errors: Vec<String>,
}

impl<'c> ChainWalker<'c> {
    /// Start a walk from the genesis position.
    #[must_use]
    pub fn new(conn: &'c Connection, batch_size: usize) -> Self {
        Self {
            conn,
            batch_size: batch_size.max(1),
            last_sequence: 0,
            last_hash: GENESIS_PREVIOUS_HASH.to_string(),
            entries_checked: 0,
            errors: Vec::new(),
        }
    }

    /// Verify one batch. Returns `false` when the chain is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Storage`] on store failure; findings are
    /// collected, not returned.
    pub fn step(&mut self) -> Result<bool, VerifyError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT sequence_number, event_type, event_data, entry_hash,
                    previous_hash, created_at_us
             FROM ledger_entries
             WHERE sequence_number > ?1
             ORDER BY sequence_number ASC
             LIMIT ?2",
        )?;

        let batch_limit = i64::try_from(self.batch_size).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            rusqlite::params![self.last_sequence, batch_limit],
            |row| {
                Ok(RawEntry {
                    sequence_number: row.get(0)?,
                    event_type: row.get(1)?,
                    event_data: row.get(2)?,
                    entry_hash: row.get(3)?,
                    previous_hash: row.get(4)?,
                    created_at_us: row.get(5)?,
                })
            },
        )?;

        let mut saw_any = false;
        for row in rows {
            let entry = row?;
            saw_any = true;
            self.check_entry(&entry);
            self.last_sequence = entry.sequence_number;
            self.last_hash = entry.entry_hash;
            self.entries_checked += 1;
        }

        Ok(saw_any)
    }

    /// Finish the walk and return the report.
    #[must_use]
    pub fn into_report(self) -> ChainReport {
        ChainReport {
            valid: self.errors.is_empty(),
            entries_checked: self.entries_checked,
            errors: self.errors,
        }
    }

    fn check_entry(&mut self, entry: &RawEntry) {
        let seq = entry.sequence_number;

        // 1. Gapless sequence. Position 0 is the genesis predecessor, so
        //    the first entry must be sequence 1.
        let expected = self.last_sequence + 1;
        if seq != expected {
            self.errors.push(format!(
                "sequence gap between {} and {}",
                self.last_sequence, seq
            ));
        }

        // 2. Chain link against the stored predecessor hash.
        if entry.previous_hash != self.last_hash {
            self.errors.push(format!("broken chain link at sequence {seq}"));
        }

        // 3. Entry hash recomputed from the entry's own stored fields. The
        //    stored payload is re-canonicalized through the same function
        //    the append path used, so formatting tampering surfaces here
        //    exactly like value tampering.
        match serde_json::from_str::<serde_json::Value>(&entry.event_data) {
            Ok(value) => {
                let canonical = to_canonical_json(&value);
                let recomputed = compute_entry_hash_raw(
                    seq,
                    &entry.event_type,
                    &canonical,
                    &entry.previous_hash,
                    entry.created_at_us,
                );
                if recomputed != entry.entry_hash {
                    self.errors.push(format!("hash mismatch at sequence {seq}"));
                }
            }
            Err(_) => {
                self.errors
                    .push(format!("malformed event data at sequence {seq}"));
            }
        }
    }
}

/// Walk the whole chain and report every finding.
///
/// # Errors
///
/// Returns [`VerifyError::Storage`] on store failure.
pub fn verify_chain(conn: &Connection, batch_size: usize) -> Result<ChainReport, VerifyError> {
    let mut walker = ChainWalker::new(conn, batch_size);
    while walker.step()? {}
    let report = walker.into_report();
    if report.valid {
        tracing::debug!(entries = report.entries_checked, "chain verified clean");
    } else {
        tracing::warn!(
            entries = report.entries_checked,
            findings = report.errors.len(),
            "chain verification found problems"
        );
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
