//! Event model for the custody ledger.
//!
//! Defines [`LedgerEntry`] — one immutable, hash-chained row of the
//! append-only log — together with the closed [`EventType`] catalog, typed
//! [`EventData`] payloads, the canonical JSON serialization, and the entry
//! hashing used to link each entry to its predecessor.
//!
//! Entries are created exactly once, by the append service, and never
//! mutated; corrections are new entries.

pub mod canonical;
pub mod data;
pub mod hash;
pub mod types;

pub use canonical::to_canonical_json;
pub use data::{
    AnnotationData, DataParseError, DeviceRegisterData, EventData, PasswordResetData,
    QueueReviewData, TagDeletedData, UploadData, UserCreatedData, UserUpdatedData,
    VideoDeletedData,
};
pub use hash::{
    GENESIS_PREVIOUS_HASH, HashComputeError, compute_entry_hash, compute_entry_hash_raw,
    verify_entry_hash,
};
pub use types::{EventType, UnknownEventType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry in the custody ledger.
///
/// Each entry records one trust-relevant event in strict global order. The
/// chain link is `previous_hash == predecessor.entry_hash`; the first
/// entry's `previous_hash` is [`GENESIS_PREVIOUS_HASH`].
///
/// # Serde
///
/// `Deserialize` is implemented manually: the payload schema depends on
/// `event_type`, which lives outside the JSON payload, so decoding is a
/// two-pass operation through [`EventData::deserialize_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Strictly increasing, gapless, global position. Starts at 1.
    pub sequence_number: i64,

    /// Which kind of event this entry records.
    pub event_type: EventType,

    /// The media record, device, user, or tag the event concerns.
    ///
    /// An index column, not a hash input; payloads carry the subject
    /// internally wherever it matters to the testimony.
    pub subject_id: String,

    /// Typed payload specific to the event type.
    pub data: EventData,

    /// User or device attribution. Deliberately outside the hash so its
    /// meaning can evolve without invalidating historical entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,

    /// BLAKE3 digest binding this entry's contents and position to its
    /// predecessor. Format: `blake3:<hex>`.
    pub entry_hash: String,

    /// The predecessor's `entry_hash`, or the genesis sentinel.
    pub previous_hash: String,

    /// When the append service wrote this entry, microseconds since epoch.
    pub created_at_us: i64,
}

impl<'de> Deserialize<'de> for LedgerEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        /// First pass: capture the discriminant and the raw payload, then
        /// let the discriminant drive typed payload decoding.
        #[derive(Deserialize)]
        struct EntryRaw {
            sequence_number: i64,
            event_type: EventType,
            subject_id: String,
            data: serde_json::Value,
            #[serde(default)]
            actor_id: Option<String>,
            entry_hash: String,
            previous_hash: String,
            created_at_us: i64,
        }

        let raw = EntryRaw::deserialize(deserializer)?;
        let data_json = raw.data.to_string();
        let data = EventData::deserialize_for(raw.event_type, &data_json)
            .map_err(serde::de::Error::custom)?;

        Ok(Self {
            sequence_number: raw.sequence_number,
            event_type: raw.event_type,
            subject_id: raw.subject_id,
            data,
            actor_id: raw.actor_id,
            entry_hash: raw.entry_hash,
            previous_hash: raw.previous_hash,
            created_at_us: raw.created_at_us,
        })
    }
}

impl LedgerEntry {
    /// The entry timestamp as a UTC datetime, for display edges.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.created_at_us)
    }
}

impl std::fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} {} {}",
            self.sequence_number,
            self.event_type,
            self.subject_id,
            match &self.data {
                EventData::DeviceRegister(d) => {
                    format!("{} ({})", d.crypto_version, d.outcome)
                }
                EventData::Upload(d) => format!("{} -> {}", d.media_type, d.outcome),
                EventData::AnnotationUpdate(_) => "annotation edit".to_string(),
                EventData::WebAnnotationUpdate(_) => "web annotation edit".to_string(),
                EventData::VideoDeleted(d) =>
                    d.reason.clone().unwrap_or_else(|| "deleted".to_string()),
                EventData::UserCreated(d) => format!("{} ({})", d.username, d.role),
                EventData::UserUpdated(d) => format!("{} changed", d.field),
                EventData::PasswordReset(_) => "password reset".to_string(),
                EventData::QueueReview(d) => d.decision.clone(),
                EventData::TagDeleted(d) => format!("tag '{}'", d.tag),
            }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
