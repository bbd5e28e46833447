//! The closed set of event types the ledger records.
//!
//! Every trust-relevant action maps to exactly one of these variants. The
//! string representation is the persisted form in the `ledger_entries`
//! table and in serialized entries, so it is fixed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The ten event types in the custody ledger catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A device registered or re-registered its key material.
    DeviceRegister,
    /// Media content arrived and was run through verification.
    Upload,
    /// The owning device edited a media record's annotations.
    AnnotationUpdate,
    /// Staff or admin edited a media record's annotations via the web.
    WebAnnotationUpdate,
    /// A media record was soft-deleted.
    VideoDeleted,
    /// A user account was created.
    UserCreated,
    /// A user account was updated.
    UserUpdated,
    /// A user's password was reset.
    PasswordReset,
    /// A media record was queued for (or cleared) manual review.
    QueueReview,
    /// A tag was removed from the tag inventory.
    TagDeleted,
}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event type '{}': expected one of device_register, upload, \
             annotation_update, web_annotation_update, video_deleted, user_created, \
             user_updated, password_reset, queue_review, tag_deleted",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventType {}

impl EventType {
    /// All known event types in catalog order.
    pub const ALL: [Self; 10] = [
        Self::DeviceRegister,
        Self::Upload,
        Self::AnnotationUpdate,
        Self::WebAnnotationUpdate,
        Self::VideoDeleted,
        Self::UserCreated,
        Self::UserUpdated,
        Self::PasswordReset,
        Self::QueueReview,
        Self::TagDeleted,
    ];

    /// Return the persisted string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeviceRegister => "device_register",
            Self::Upload => "upload",
            Self::AnnotationUpdate => "annotation_update",
            Self::WebAnnotationUpdate => "web_annotation_update",
            Self::VideoDeleted => "video_deleted",
            Self::UserCreated => "user_created",
            Self::UserUpdated => "user_updated",
            Self::PasswordReset => "password_reset",
            Self::QueueReview => "queue_review",
            Self::TagDeleted => "tag_deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device_register" => Ok(Self::DeviceRegister),
            "upload" => Ok(Self::Upload),
            "annotation_update" => Ok(Self::AnnotationUpdate),
            "web_annotation_update" => Ok(Self::WebAnnotationUpdate),
            "video_deleted" => Ok(Self::VideoDeleted),
            "user_created" => Ok(Self::UserCreated),
            "user_updated" => Ok(Self::UserUpdated),
            "password_reset" => Ok(Self::PasswordReset),
            "queue_review" => Ok(Self::QueueReview),
            "tag_deleted" => Ok(Self::TagDeleted),
            _ => Err(UnknownEventType { raw: s.to_string() }),
        }
    }
}

// Serde uses the persisted string form in both directions.
impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_persisted_form() {
        let expected = [
            (EventType::DeviceRegister, "device_register"),
            (EventType::Upload, "upload"),
            (EventType::AnnotationUpdate, "annotation_update"),
            (EventType::WebAnnotationUpdate, "web_annotation_update"),
            (EventType::VideoDeleted, "video_deleted"),
            (EventType::UserCreated, "user_created"),
            (EventType::UserUpdated, "user_updated"),
            (EventType::PasswordReset, "password_reset"),
            (EventType::QueueReview, "queue_review"),
            (EventType::TagDeleted, "tag_deleted"),
        ];
        for (et, s) in expected {
            assert_eq!(et.as_str(), s);
            assert_eq!(et.to_string(), s);
        }
    }

    #[test]
    fn fromstr_roundtrip_all() {
        for et in EventType::ALL {
            let parsed: EventType = et.as_str().parse().expect("should parse");
            assert_eq!(parsed, et);
        }
    }

    #[test]
    fn fromstr_rejects_unknown() {
        let err = "media_upload".parse::<EventType>().unwrap_err();
        assert_eq!(err.raw, "media_upload");
        assert!(err.to_string().contains("expected one of"));
    }

    #[test]
    fn fromstr_rejects_empty() {
        assert!("".parse::<EventType>().is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        for et in EventType::ALL {
            let json = serde_json::to_string(&et).expect("serialize");
            assert_eq!(json, format!("\"{}\"", et.as_str()));
            let back: EventType = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, et);
        }
    }

    #[test]
    fn serde_rejects_unknown_type() {
        assert!(serde_json::from_str::<EventType>("\"upload_v2\"").is_err());
    }

    #[test]
    fn catalog_has_ten_types() {
        assert_eq!(EventType::ALL.len(), 10);
    }

    #[test]
    fn error_display_lists_all_valid_options() {
        let msg = UnknownEventType { raw: "nope".into() }.to_string();
        for et in EventType::ALL {
            assert!(msg.contains(et.as_str()), "missing {}", et.as_str());
        }
    }
}
