//! Media records — the content the ledger testifies about.
//!
//! A [`MediaRecord`] row is created once per upload and annotated or
//! soft-deleted later. The record itself is plain mutable storage; the
//! tamper evidence lives in the ledger entries *about* it, never in the
//! row. Failed verifications keep their rows too — the audit trail's value
//! depends on being able to show exactly what was received.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ErrorCode;
use crate::event::AnnotationData;

// ---------------------------------------------------------------------------
// MediaSource
// ---------------------------------------------------------------------------

/// How the content reached the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    /// Captured and streamed by a device in the field.
    Live,
    /// Imported from device storage after the fact.
    Upload,
}

impl MediaSource {
    /// Persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaSource {
    type Err = UnknownStatusValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "upload" => Ok(Self::Upload),
            _ => Err(UnknownStatusValue {
                field: "source",
                raw: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// VerificationStatus
// ---------------------------------------------------------------------------

/// Terminal outcome of the integrity + authenticity checks on one upload.
///
/// Terminal per event: re-evaluation creates a new ledger entry, it never
/// mutates the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationStatus {
    /// Hash matched and a hardware-backed signature verified on live capture.
    #[serde(rename = "verified")]
    Verified,
    /// Hash matched and the signature verified, but the capture path is
    /// software-signed or imported.
    #[serde(rename = "signed-upload")]
    SignedUpload,
    /// Hash matched but the signature did not verify.
    #[serde(rename = "error")]
    Error,
    /// Hash mismatch, or the device is unknown at the trust boundary.
    #[serde(rename = "failed")]
    Failed,
    /// Not yet evaluated.
    #[serde(rename = "pending")]
    Pending,
}

impl VerificationStatus {
    /// Persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::SignedUpload => "signed-upload",
            Self::Error => "error",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = UnknownStatusValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(Self::Verified),
            "signed-upload" => Ok(Self::SignedUpload),
            "error" => Ok(Self::Error),
            "failed" => Ok(Self::Failed),
            "pending" => Ok(Self::Pending),
            _ => Err(UnknownStatusValue {
                field: "verification_status",
                raw: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an unknown enum value from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatusValue {
    /// Which column the value came from.
    pub field: &'static str,
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownStatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value '{}'", self.field, self.raw)
    }
}

impl std::error::Error for UnknownStatusValue {}

// ---------------------------------------------------------------------------
// MediaRecord
// ---------------------------------------------------------------------------

/// One piece of uploaded content and its verification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Stable identifier, derived from content hash and arrival time.
    pub media_id: String,
    /// Owning device.
    pub device_id: String,
    /// SHA-256 hex digest of the raw bytes as received.
    pub content_hash: String,
    /// Capture timestamp claimed by the device, microseconds since epoch.
    pub captured_at_us: Option<i64>,
    /// Capture latitude, when the device reported one.
    pub lat: Option<f64>,
    /// Capture longitude, when the device reported one.
    pub lon: Option<f64>,
    /// MIME-style media type string.
    pub media_type: String,
    /// Live capture or import.
    pub source: MediaSource,
    /// The signature bytes the device presented.
    pub signature: Vec<u8>,
    /// The exact byte string that was signed.
    pub signed_payload: Vec<u8>,
    /// Outcome of integrity + authenticity checks.
    pub verification_status: VerificationStatus,
    /// Annotation: category label.
    pub category: Option<String>,
    /// Annotation: free-text notes.
    pub notes: Option<String>,
    /// Annotation: tag list.
    pub tags: Vec<String>,
    /// Annotation: human-readable location description.
    pub location_description: Option<String>,
    /// When the record was created, microseconds since epoch.
    pub created_at_us: i64,
    /// Soft-delete timestamp; the row is never removed.
    pub deleted_at_us: Option<i64>,
}

impl MediaRecord {
    /// True when the record has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at_us.is_some()
    }
}

/// Media store error.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// No record with the given id.
    #[error("media record '{media_id}' not found")]
    NotFound {
        /// The id that was looked up.
        media_id: String,
    },

    /// Underlying store failure.
    #[error("media storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Tag list failed to encode/decode as JSON.
    #[error("tag list serialization error: {0}")]
    Tags(#[from] serde_json::Error),
}

impl MediaError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::MediaNotFound,
            Self::Storage(_) | Self::Tags(_) => ErrorCode::EntryWriteFailed,
        }
    }
}

/// Insert a freshly verified (or failed) upload record.
///
/// # Errors
///
/// Returns [`MediaError::Storage`] on store failure.
pub fn insert_media(conn: &Connection, record: &MediaRecord) -> Result<(), MediaError> {
    let tags_json = serde_json::to_string(&record.tags)?;
    conn.execute(
        "INSERT INTO media_records (
            media_id, device_id, content_hash, captured_at_us, lat, lon,
            media_type, source, signature, signed_payload, verification_status,
            category, notes, tags, location_description, created_at_us, deleted_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            record.media_id,
            record.device_id,
            record.content_hash,
            record.captured_at_us,
            record.lat,
            record.lon,
            record.media_type,
            record.source.as_str(),
            record.signature,
            record.signed_payload,
            record.verification_status.as_str(),
            record.category,
            record.notes,
            tags_json,
            record.location_description,
            record.created_at_us,
            record.deleted_at_us,
        ],
    )?;
    Ok(())
}

/// Fetch a media record by id.
///
/// # Errors
///
/// Returns [`MediaError::Storage`] on store failure.
pub fn get_media(conn: &Connection, media_id: &str) -> Result<Option<MediaRecord>, MediaError> {
    let record = conn
        .query_row(
            "SELECT media_id, device_id, content_hash, captured_at_us, lat, lon,
                    media_type, source, signature, signed_payload, verification_status,
                    category, notes, tags, location_description, created_at_us, deleted_at_us
             FROM media_records WHERE media_id = ?1",
            params![media_id],
            row_to_media,
        )
        .optional()?;
    Ok(record)
}

/// Apply an annotation edit to a media record, touching only the fields the
/// edit carries.
///
/// # Errors
///
/// Returns [`MediaError::NotFound`] if the record does not exist, or
/// [`MediaError::Storage`] on store failure.
pub fn apply_annotations(
    conn: &Connection,
    media_id: &str,
    edit: &AnnotationData,
) -> Result<MediaRecord, MediaError> {
    let Some(mut record) = get_media(conn, media_id)? else {
        return Err(MediaError::NotFound {
            media_id: media_id.to_string(),
        });
    };

    if let Some(category) = &edit.category {
        record.category = Some(category.clone());
    }
    if let Some(notes) = &edit.notes {
        record.notes = Some(notes.clone());
    }
    if let Some(tags) = &edit.tags {
        record.tags = tags.clone();
    }
    if let Some(location) = &edit.location_description {
        record.location_description = Some(location.clone());
    }

    let tags_json = serde_json::to_string(&record.tags)?;
    conn.execute(
        "UPDATE media_records
         SET category = ?2, notes = ?3, tags = ?4, location_description = ?5
         WHERE media_id = ?1",
        params![
            media_id,
            record.category,
            record.notes,
            tags_json,
            record.location_description,
        ],
    )?;

    Ok(record)
}

/// Soft-delete a media record. The row stays; only `deleted_at_us` is set.
///
/// # Errors
///
/// Returns [`MediaError::NotFound`] if the record does not exist, or
/// [`MediaError::Storage`] on store failure.
pub fn soft_delete_media(
    conn: &Connection,
    media_id: &str,
    deleted_at_us: i64,
) -> Result<MediaRecord, MediaError> {
    let changed = conn.execute(
        "UPDATE media_records SET deleted_at_us = ?2
         WHERE media_id = ?1 AND deleted_at_us IS NULL",
        params![media_id, deleted_at_us],
    )?;

    match get_media(conn, media_id)? {
        Some(record) => {
            if changed == 0 {
                tracing::debug!(media_id, "soft delete was a no-op; already deleted");
            }
            Ok(record)
        }
        None => Err(MediaError::NotFound {
            media_id: media_id.to_string(),
        }),
    }
}

fn row_to_media(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaRecord> {
    let source_raw: String = row.get(7)?;
    let source = MediaSource::from_str(&source_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status_raw: String = row.get(10)?;
    let verification_status = VerificationStatus::from_str(&status_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let tags_json: String = row.get(13)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(13, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(MediaRecord {
        media_id: row.get(0)?,
        device_id: row.get(1)?,
        content_hash: row.get(2)?,
        captured_at_us: row.get(3)?,
        lat: row.get(4)?,
        lon: row.get(5)?,
        media_type: row.get(6)?,
        source,
        signature: row.get(8)?,
        signed_payload: row.get(9)?,
        verification_status,
        category: row.get(11)?,
        notes: row.get(12)?,
        tags,
        location_description: row.get(14)?,
        created_at_us: row.get(15)?,
        deleted_at_us: row.get(16)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_conn() -> Connection {
        let conn = db::open_in_memory().expect("open in-memory ledger");
        crate::registry::register_device(
            &conn,
            "cam-07",
            b"test-public-key",
            crate::registry::CryptoVersion::SoftwareHmac,
            1_754_000_000_000_000,
        )
        .expect("register device");
        conn
    }

    fn sample_record() -> MediaRecord {
        MediaRecord {
            media_id: "md-3fa8c2d91b04".into(),
            device_id: "cam-07".into(),
            content_hash: "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
                .into(),
            captured_at_us: Some(1_754_000_000_000_000),
            lat: Some(-1.2921),
            lon: Some(36.8219),
            media_type: "video/mp4".into(),
            source: MediaSource::Live,
            signature: vec![1, 2, 3],
            signed_payload: b"payload".to_vec(),
            verification_status: VerificationStatus::Verified,
            category: None,
            notes: None,
            tags: vec![],
            location_description: None,
            created_at_us: 1_754_000_000_500_000,
            deleted_at_us: None,
        }
    }

    #[test]
    fn status_string_forms_roundtrip() {
        for status in [
            VerificationStatus::Verified,
            VerificationStatus::SignedUpload,
            VerificationStatus::Error,
            VerificationStatus::Failed,
            VerificationStatus::Pending,
        ] {
            assert_eq!(
                status.as_str().parse::<VerificationStatus>().expect("parse"),
                status
            );
            let json = serde_json::to_string(&status).expect("serialize");
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("ok".parse::<VerificationStatus>().is_err());
    }

    #[test]
    fn source_string_forms_roundtrip() {
        for source in [MediaSource::Live, MediaSource::Upload] {
            assert_eq!(source.as_str().parse::<MediaSource>().expect("parse"), source);
        }
        assert!("stream".parse::<MediaSource>().is_err());
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let conn = test_conn();
        let record = sample_record();
        insert_media(&conn, &record).expect("insert");

        let back = get_media(&conn, &record.media_id)
            .expect("get")
            .expect("exists");
        assert_eq!(back, record);
    }

    #[test]
    fn missing_record_is_none() {
        let conn = test_conn();
        assert!(get_media(&conn, "md-missing").expect("get").is_none());
    }

    #[test]
    fn failed_uploads_are_retained() {
        let conn = test_conn();
        let record = MediaRecord {
            verification_status: VerificationStatus::Failed,
            ..sample_record()
        };
        insert_media(&conn, &record).expect("insert");

        let back = get_media(&conn, &record.media_id)
            .expect("get")
            .expect("failed upload row must exist");
        assert_eq!(back.verification_status, VerificationStatus::Failed);
    }

    #[test]
    fn annotations_touch_only_given_fields() {
        let conn = test_conn();
        let mut record = sample_record();
        record.notes = Some("original note".into());
        insert_media(&conn, &record).expect("insert");

        let edit = AnnotationData {
            category: Some("wildlife".into()),
            tags: Some(vec!["night".into(), "gate-3".into()]),
            ..AnnotationData::default()
        };
        let updated = apply_annotations(&conn, &record.media_id, &edit).expect("annotate");

        assert_eq!(updated.category.as_deref(), Some("wildlife"));
        assert_eq!(updated.tags, vec!["night", "gate-3"]);
        assert_eq!(updated.notes.as_deref(), Some("original note"));
        assert_eq!(
            get_media(&conn, &record.media_id)
                .expect("get")
                .expect("exists"),
            updated
        );
    }

    #[test]
    fn annotate_missing_record_errors() {
        let conn = test_conn();
        let err = apply_annotations(&conn, "md-missing", &AnnotationData::default()).unwrap_err();
        assert!(matches!(err, MediaError::NotFound { .. }));
        assert_eq!(err.code(), crate::error::ErrorCode::MediaNotFound);
    }

    #[test]
    fn soft_delete_keeps_the_row() {
        let conn = test_conn();
        let record = sample_record();
        insert_media(&conn, &record).expect("insert");

        let deleted = soft_delete_media(&conn, &record.media_id, 9_000).expect("delete");
        assert!(deleted.is_deleted());
        assert_eq!(deleted.deleted_at_us, Some(9_000));
        assert_eq!(deleted.content_hash, record.content_hash);

        // Second delete is a no-op, not an error, and keeps the first stamp.
        let again = soft_delete_media(&conn, &record.media_id, 10_000).expect("redelete");
        assert_eq!(again.deleted_at_us, Some(9_000));
    }
}
