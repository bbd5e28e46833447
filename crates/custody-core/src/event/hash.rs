//! Entry hashing for the custody chain.
//!
//! Guarantees:
//!
//! - Deterministic: the same entry fields always produce the same digest.
//! - Canonical payload: `event_data` is canonical JSON before hashing.
//! - Attribution-free: `actor_id` and `subject_id` are not hash inputs, so
//!   later schema versions may reinterpret attribution without invalidating
//!   any historical hash.
//! - Hash format: `blake3:<64 lowercase hex>`.
//!
//! The hash input byte layout is frozen — entries already exist under it:
//!
//! ```text
//! {sequence_number}\t{event_type}\t{canonical(event_data)}\t{previous_hash}\t{created_at_us}\n
//! ```

use super::LedgerEntry;
use super::canonical::to_canonical_json;
use super::data::EventData;
use super::types::EventType;

/// `previous_hash` of the genesis entry: an all-zero digest of the chain
/// hash's width, kept in the same `blake3:` format space as real links.
pub const GENESIS_PREVIOUS_HASH: &str =
    "blake3:0000000000000000000000000000000000000000000000000000000000000000";

/// Errors that can occur while computing an entry hash.
#[derive(Debug, thiserror::Error)]
pub enum HashComputeError {
    /// The event payload failed to serialize to JSON.
    #[error("failed to serialize event data: {0}")]
    SerializeData(#[from] serde_json::Error),
}

/// Compute the chain hash from already-canonical payload bytes.
///
/// This is the byte-level primitive shared by the append path (which
/// canonicalizes a typed payload first) and the verification scan (which
/// re-canonicalizes the stored payload text). Both sides hash through this
/// one function so the frame cannot drift between them.
#[must_use]
pub fn compute_entry_hash_raw(
    sequence_number: i64,
    event_type: &str,
    canonical_data: &str,
    previous_hash: &str,
    created_at_us: i64,
) -> String {
    let hash_input = format!(
        "{sequence_number}\t{event_type}\t{canonical_data}\t{previous_hash}\t{created_at_us}\n"
    );
    let digest = blake3::hash(hash_input.as_bytes());
    format!("blake3:{digest}")
}

/// Compute the chain hash for one entry from its hashed fields.
///
/// # Errors
///
/// Returns [`HashComputeError::SerializeData`] if the payload fails to
/// serialize.
pub fn compute_entry_hash(
    sequence_number: i64,
    event_type: EventType,
    data: &EventData,
    previous_hash: &str,
    created_at_us: i64,
) -> Result<String, HashComputeError> {
    let data_json = to_canonical_json(&data.to_json_value()?);
    Ok(compute_entry_hash_raw(
        sequence_number,
        event_type.as_str(),
        &data_json,
        previous_hash,
        created_at_us,
    ))
}

/// Recompute an entry's hash from its own fields and compare to the stored
/// value.
///
/// Returns `true` when the stored hash is valid.
///
/// # Errors
///
/// Returns [`HashComputeError`] if the payload cannot be re-serialized.
pub fn verify_entry_hash(entry: &LedgerEntry) -> Result<bool, HashComputeError> {
    let expected = compute_entry_hash(
        entry.sequence_number,
        entry.event_type,
        &entry.data,
        &entry.previous_hash,
        entry.created_at_us,
    )?;
    Ok(entry.entry_hash == expected)
}
