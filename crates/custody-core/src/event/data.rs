//! Typed payload structs for each event type.
//!
//! The event type discriminant is stored in its own ledger column, outside
//! the JSON payload, so [`EventData`] deserializes via
//! [`EventData::deserialize_for`] with a known [`EventType`] rather than an
//! internal tag. Unknown payload fields are preserved through
//! `#[serde(flatten)]` maps so old binaries can carry newer events without
//! destroying them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::types::EventType;
use crate::media::{MediaSource, VerificationStatus};
use crate::registry::{CryptoVersion, RegistrationOutcome};

// ---------------------------------------------------------------------------
// EventData — the unified payload enum
// ---------------------------------------------------------------------------

/// Typed payload for a ledger entry, one variant per [`EventType`].
///
/// `EventData` implements `Serialize` by dispatching to the inner struct but
/// not `Deserialize`: decoding requires the external discriminant, so use
/// [`EventData::deserialize_for`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    /// Payload for `device_register`.
    DeviceRegister(DeviceRegisterData),
    /// Payload for `upload`.
    Upload(UploadData),
    /// Payload for `annotation_update`.
    AnnotationUpdate(AnnotationData),
    /// Payload for `web_annotation_update`.
    WebAnnotationUpdate(AnnotationData),
    /// Payload for `video_deleted`.
    VideoDeleted(VideoDeletedData),
    /// Payload for `user_created`.
    UserCreated(UserCreatedData),
    /// Payload for `user_updated`.
    UserUpdated(UserUpdatedData),
    /// Payload for `password_reset`.
    PasswordReset(PasswordResetData),
    /// Payload for `queue_review`.
    QueueReview(QueueReviewData),
    /// Payload for `tag_deleted`.
    TagDeleted(TagDeletedData),
}

impl EventData {
    /// The event type this payload belongs to.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::DeviceRegister(_) => EventType::DeviceRegister,
            Self::Upload(_) => EventType::Upload,
            Self::AnnotationUpdate(_) => EventType::AnnotationUpdate,
            Self::WebAnnotationUpdate(_) => EventType::WebAnnotationUpdate,
            Self::VideoDeleted(_) => EventType::VideoDeleted,
            Self::UserCreated(_) => EventType::UserCreated,
            Self::UserUpdated(_) => EventType::UserUpdated,
            Self::PasswordReset(_) => EventType::PasswordReset,
            Self::QueueReview(_) => EventType::QueueReview,
            Self::TagDeleted(_) => EventType::TagDeleted,
        }
    }

    /// Deserialize a JSON payload into the variant named by `event_type`.
    ///
    /// # Errors
    ///
    /// Returns a [`DataParseError`] if the JSON is malformed or does not
    /// match the schema for the given event type.
    pub fn deserialize_for(event_type: EventType, json: &str) -> Result<Self, DataParseError> {
        let result = match event_type {
            EventType::DeviceRegister => {
                serde_json::from_str::<DeviceRegisterData>(json).map(EventData::DeviceRegister)
            }
            EventType::Upload => serde_json::from_str::<UploadData>(json).map(EventData::Upload),
            EventType::AnnotationUpdate => {
                serde_json::from_str::<AnnotationData>(json).map(EventData::AnnotationUpdate)
            }
            EventType::WebAnnotationUpdate => {
                serde_json::from_str::<AnnotationData>(json).map(EventData::WebAnnotationUpdate)
            }
            EventType::VideoDeleted => {
                serde_json::from_str::<VideoDeletedData>(json).map(EventData::VideoDeleted)
            }
            EventType::UserCreated => {
                serde_json::from_str::<UserCreatedData>(json).map(EventData::UserCreated)
            }
            EventType::UserUpdated => {
                serde_json::from_str::<UserUpdatedData>(json).map(EventData::UserUpdated)
            }
            EventType::PasswordReset => {
                serde_json::from_str::<PasswordResetData>(json).map(EventData::PasswordReset)
            }
            EventType::QueueReview => {
                serde_json::from_str::<QueueReviewData>(json).map(EventData::QueueReview)
            }
            EventType::TagDeleted => {
                serde_json::from_str::<TagDeletedData>(json).map(EventData::TagDeleted)
            }
        };

        result.map_err(|source| DataParseError { event_type, source })
    }

    /// Serialize the payload to a [`serde_json::Value`].
    ///
    /// # Errors
    ///
    /// Returns an error if the inner struct fails to serialize (should not
    /// happen with well-formed data).
    pub fn to_json_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::DeviceRegister(d) => serde_json::to_value(d),
            Self::Upload(d) => serde_json::to_value(d),
            Self::AnnotationUpdate(d) | Self::WebAnnotationUpdate(d) => serde_json::to_value(d),
            Self::VideoDeleted(d) => serde_json::to_value(d),
            Self::UserCreated(d) => serde_json::to_value(d),
            Self::UserUpdated(d) => serde_json::to_value(d),
            Self::PasswordReset(d) => serde_json::to_value(d),
            Self::QueueReview(d) => serde_json::to_value(d),
            Self::TagDeleted(d) => serde_json::to_value(d),
        }
    }
}

impl Serialize for EventData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::DeviceRegister(d) => d.serialize(serializer),
            Self::Upload(d) => d.serialize(serializer),
            Self::AnnotationUpdate(d) | Self::WebAnnotationUpdate(d) => d.serialize(serializer),
            Self::VideoDeleted(d) => d.serialize(serializer),
            Self::UserCreated(d) => d.serialize(serializer),
            Self::UserUpdated(d) => d.serialize(serializer),
            Self::PasswordReset(d) => d.serialize(serializer),
            Self::QueueReview(d) => d.serialize(serializer),
            Self::TagDeleted(d) => d.serialize(serializer),
        }
    }
}

// ---------------------------------------------------------------------------
// DataParseError
// ---------------------------------------------------------------------------

/// Error returned when deserializing an event's JSON payload fails.
#[derive(Debug)]
pub struct DataParseError {
    /// The event type that was being deserialized.
    pub event_type: EventType,
    /// The underlying JSON parse error.
    pub source: serde_json::Error,
}

impl fmt::Display for DataParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} data payload: {}",
            self.event_type, self.source
        )
    }
}

impl std::error::Error for DataParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

// ---------------------------------------------------------------------------
// Payload structs — one per event type
// ---------------------------------------------------------------------------

/// Payload for `device_register`.
///
/// Written for every registration attempt, including refused downgrades, so
/// the version transition itself is always on the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegisterData {
    /// The crypto version the device presented.
    pub crypto_version: CryptoVersion,

    /// The version registered before this attempt, absent on first contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<CryptoVersion>,

    /// Short fingerprint of the presented public key material.
    pub key_fingerprint: String,

    /// What the registry did with the attempt.
    pub outcome: RegistrationOutcome,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `upload`.
///
/// One of these exists for every verification outcome, `failed` included —
/// the failure is the log entry, never a reason to skip it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadData {
    /// The media record created for this upload.
    pub media_id: String,

    /// SHA-256 hex digest recomputed from the received bytes.
    pub content_hash: String,

    /// MIME-style media type string.
    pub media_type: String,

    /// Whether the content came from a live capture or an import.
    pub source: MediaSource,

    /// The verification outcome for this upload.
    pub outcome: VerificationStatus,

    /// Capture timestamp claimed by the device, microseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at_us: Option<i64>,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `annotation_update` and `web_annotation_update`.
///
/// Only fields present in the edit are set; `None` means untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationData {
    /// New category, when changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// New free-text notes, when changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Full replacement tag list, when changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// New location description, when changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_description: Option<String>,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AnnotationData {
    /// True when the edit carries no field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.notes.is_none()
            && self.tags.is_none()
            && self.location_description.is_none()
            && self.extra.is_empty()
    }
}

/// Payload for `video_deleted`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDeletedData {
    /// Operator-supplied reason, when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `user_created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreatedData {
    /// Login name of the new account.
    pub username: String,

    /// Role granted at creation.
    pub role: String,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `user_updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdatedData {
    /// Which account field changed.
    pub field: String,

    /// The new value.
    pub value: Value,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `password_reset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordResetData {
    /// Who initiated the reset, when it was not the account owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `queue_review`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueReviewData {
    /// Review decision: `queued`, `approved`, or `rejected`.
    pub decision: String,

    /// Reviewer notes, when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `tag_deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDeletedData {
    /// The tag removed from the inventory.
    pub tag: String,

    /// Forward-compatibility spillover.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_upload() -> EventData {
        EventData::Upload(UploadData {
            media_id: "md-3fa8c2d91b04".into(),
            content_hash: "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08".into(),
            media_type: "video/mp4".into(),
            source: MediaSource::Live,
            outcome: VerificationStatus::Verified,
            captured_at_us: Some(1_754_000_000_000_000),
            extra: BTreeMap::new(),
        })
    }

    #[test]
    fn event_type_mapping_covers_all_variants() {
        let samples: Vec<EventData> = vec![
            EventData::DeviceRegister(DeviceRegisterData {
                crypto_version: CryptoVersion::SoftwareHmac,
                previous_version: None,
                key_fingerprint: "b3f1c2".into(),
                outcome: RegistrationOutcome::Registered,
                extra: BTreeMap::new(),
            }),
            sample_upload(),
            EventData::AnnotationUpdate(AnnotationData::default()),
            EventData::WebAnnotationUpdate(AnnotationData::default()),
            EventData::VideoDeleted(VideoDeletedData::default()),
            EventData::UserCreated(UserCreatedData {
                username: "ranger1".into(),
                role: "staff".into(),
                extra: BTreeMap::new(),
            }),
            EventData::UserUpdated(UserUpdatedData {
                field: "role".into(),
                value: json!("admin"),
                extra: BTreeMap::new(),
            }),
            EventData::PasswordReset(PasswordResetData::default()),
            EventData::QueueReview(QueueReviewData {
                decision: "queued".into(),
                notes: None,
                extra: BTreeMap::new(),
            }),
            EventData::TagDeleted(TagDeletedData {
                tag: "poaching".into(),
                extra: BTreeMap::new(),
            }),
        ];

        assert_eq!(samples.len(), EventType::ALL.len());
        for (data, expected) in samples.iter().zip(EventType::ALL) {
            assert_eq!(data.event_type(), expected);
        }
    }

    #[test]
    fn deserialize_for_upload_roundtrip() {
        let data = sample_upload();
        let json = serde_json::to_string(&data).expect("serialize");
        let back = EventData::deserialize_for(EventType::Upload, &json).expect("deserialize");
        assert_eq!(back, data);
    }

    #[test]
    fn deserialize_for_wrong_shape_fails_with_type_in_message() {
        let err = EventData::deserialize_for(EventType::Upload, "{}").unwrap_err();
        assert_eq!(err.event_type, EventType::Upload);
        assert!(err.to_string().contains("upload"));
    }

    #[test]
    fn annotation_variants_share_schema() {
        let json = r#"{"category":"wildlife","tags":["night","gate-3"]}"#;
        let device =
            EventData::deserialize_for(EventType::AnnotationUpdate, json).expect("device edit");
        let web =
            EventData::deserialize_for(EventType::WebAnnotationUpdate, json).expect("web edit");
        assert_eq!(device.event_type(), EventType::AnnotationUpdate);
        assert_eq!(web.event_type(), EventType::WebAnnotationUpdate);
        match (device, web) {
            (EventData::AnnotationUpdate(a), EventData::WebAnnotationUpdate(b)) => {
                assert_eq!(a, b);
            }
            other => panic!("unexpected variants: {other:?}"),
        }
    }

    #[test]
    fn annotation_is_empty() {
        assert!(AnnotationData::default().is_empty());
        let edit = AnnotationData {
            notes: Some("second camera angle".into()),
            ..AnnotationData::default()
        };
        assert!(!edit.is_empty());
    }

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let json = r#"{"tag":"duplicate","deleted_from":"autocomplete-index"}"#;
        let data = EventData::deserialize_for(EventType::TagDeleted, json).expect("deserialize");
        let value = data.to_json_value().expect("to value");
        assert_eq!(value["deleted_from"], json!("autocomplete-index"));
    }

    #[test]
    fn optional_fields_omitted_when_absent() {
        let data = EventData::VideoDeleted(VideoDeletedData::default());
        let value = data.to_json_value().expect("to value");
        assert_eq!(value, json!({}));
    }

    #[test]
    fn all_types_roundtrip_through_their_discriminant() {
        let payloads: Vec<(EventType, &str)> = vec![
            (
                EventType::DeviceRegister,
                r#"{"crypto_version":"software-hmac","key_fingerprint":"ab12","outcome":"registered"}"#,
            ),
            (
                EventType::Upload,
                r#"{"media_id":"md-1","content_hash":"aa","media_type":"image/jpeg","source":"upload","outcome":"signed-upload"}"#,
            ),
            (EventType::AnnotationUpdate, r#"{"notes":"n"}"#),
            (EventType::WebAnnotationUpdate, r#"{"category":"c"}"#),
            (EventType::VideoDeleted, r#"{"reason":"expired"}"#),
            (
                EventType::UserCreated,
                r#"{"username":"u","role":"viewer"}"#,
            ),
            (
                EventType::UserUpdated,
                r#"{"field":"email","value":"u@example.org"}"#,
            ),
            (EventType::PasswordReset, "{}"),
            (EventType::QueueReview, r#"{"decision":"approved"}"#),
            (EventType::TagDeleted, r#"{"tag":"t"}"#),
        ];

        assert_eq!(payloads.len(), EventType::ALL.len());
        for (et, json) in payloads {
            let data = EventData::deserialize_for(et, json)
                .unwrap_or_else(|e| panic!("deserialize {et} failed: {e}"));
            assert_eq!(data.event_type(), et);
            let value = data.to_json_value().expect("to value");
            let reparsed = EventData::deserialize_for(et, &value.to_string())
                .unwrap_or_else(|e| panic!("reparse {et} failed: {e}"));
            assert_eq!(reparsed, data, "roundtrip failed for {et}");
        }
    }
}
