//! Transport-agnostic service facade.
//!
//! [`CustodyService`] wires the registry, content verifier, media store,
//! and ledger into the operations an API layer consumes. Every
//! trust-relevant action ends in exactly one ledger append; nothing here
//! writes `ledger_entries` rows except through [`crate::ledger::append`].

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::Value;

use crate::config::CustodyConfig;
use crate::db;
use crate::error::ErrorCode;
use crate::event::data::{
    AnnotationData, DeviceRegisterData, PasswordResetData, QueueReviewData, TagDeletedData,
    UploadData, UserCreatedData, UserUpdatedData, VideoDeletedData,
};
use crate::event::{DataParseError, EventData, EventType, LedgerEntry};
use crate::ledger::query::{EventFilter, EventPage};
use crate::ledger::verify::ChainReport;
use crate::ledger::{self, AppendError, AppendRequest};
use crate::media::{self, MediaError, MediaRecord, MediaSource, VerificationStatus};
use crate::registry::{self, CryptoVersion, Registration, RegistryError, key_fingerprint};
use crate::verifier;

/// Whether an annotation edit arrived from the owning device or from a
/// staff/admin web session. Picks the event type the edit is logged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationChannel {
    /// Edit by the owning device.
    Device,
    /// Edit by staff or admin through the web surface.
    Web,
}

/// Everything an upload request carries into verification.
#[derive(Debug)]
pub struct UploadRequest<'a, R: Read> {
    /// The claimed originating device.
    pub device_id: &'a str,
    /// Raw content bytes, streamed — never fully buffered here.
    pub content: R,
    /// The content hash the device claims.
    pub claimed_hash: &'a str,
    /// The exact byte string the device signed.
    pub signed_payload: &'a [u8],
    /// The signature over `signed_payload`.
    pub signature: &'a [u8],
    /// MIME-style media type string.
    pub media_type: &'a str,
    /// Live capture or import.
    pub source: MediaSource,
    /// Capture timestamp claimed by the device.
    pub captured_at_us: Option<i64>,
    /// Capture latitude, when reported.
    pub lat: Option<f64>,
    /// Capture longitude, when reported.
    pub lon: Option<f64>,
}

/// What an upload produced: the terminal status, the ledger entry that
/// recorded it, and the media record when one was created. Unknown devices
/// fail at the trust boundary before a record exists, but the failure is
/// still logged.
#[derive(Debug)]
pub struct UploadOutcome {
    /// Terminal verification status.
    pub status: VerificationStatus,
    /// The `upload` ledger entry; present for every outcome.
    pub entry: LedgerEntry,
    /// The stored media record, absent only for unknown devices.
    pub record: Option<MediaRecord>,
}

/// Receipt for a generic append, per the external interface contract.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AppendReceipt {
    /// Position of the new entry.
    pub sequence_number: i64,
    /// Its chain hash.
    pub entry_hash: String,
}

/// Service-level error.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The append path failed; retryable when contention.
    #[error(transparent)]
    Append(#[from] AppendError),

    /// Registry storage failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Media store failure.
    #[error(transparent)]
    Media(#[from] MediaError),

    /// A raw event payload did not match its event type's schema.
    #[error(transparent)]
    Data(#[from] DataParseError),

    /// The content stream failed while hashing.
    #[error("content stream error: {0}")]
    Content(#[from] std::io::Error),
}

impl ServiceError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Append(e) => e.code(),
            Self::Registry(e) => e.code(),
            Self::Media(e) => e.code(),
            Self::Data(_) => ErrorCode::InternalUnexpected,
            Self::Content(_) => ErrorCode::EntryWriteFailed,
        }
    }

    /// True when the caller should retry the whole operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Append(e) if e.is_retryable())
    }
}

/// The assembled custody core: one connection, one tail lock, one config.
pub struct CustodyService {
    conn: Connection,
    lock_path: PathBuf,
    lock_timeout: Duration,
    verify_batch_size: usize,
}

impl CustodyService {
    /// Open the service against a project root using its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(root: &Path, config: &CustodyConfig) -> Result<Self> {
        let conn = db::open_ledger(&root.join(&config.ledger.db_path))?;
        Ok(Self {
            conn,
            lock_path: root.join(&config.ledger.lock_path),
            lock_timeout: config.ledger.lock_timeout(),
            verify_batch_size: config.verify.batch_size,
        })
    }

    /// Assemble a service from explicit parts. Test and tooling entry point.
    #[must_use]
    pub fn from_parts(conn: Connection, lock_path: PathBuf, lock_timeout: Duration) -> Self {
        Self {
            conn,
            lock_path,
            lock_timeout,
            verify_batch_size: crate::ledger::verify::DEFAULT_BATCH_SIZE,
        }
    }

    fn now_us() -> i64 {
        Utc::now().timestamp_micros()
    }

    fn append(&mut self, request: AppendRequest) -> Result<LedgerEntry, ServiceError> {
        Ok(ledger::append(
            &mut self.conn,
            &self.lock_path,
            self.lock_timeout,
            request,
        )?)
    }

    // -----------------------------------------------------------------
    // External interface: ledger surface
    // -----------------------------------------------------------------

    /// Append a generic event from a transport-shaped payload.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Data`] when the payload does not match the event
    /// type's schema; append-path errors otherwise.
    pub fn append_event(
        &mut self,
        event_type: EventType,
        subject_id: &str,
        event_data: &Value,
        actor_id: Option<String>,
    ) -> Result<AppendReceipt, ServiceError> {
        let data = EventData::deserialize_for(event_type, &event_data.to_string())?;
        let entry = self.append(AppendRequest {
            subject_id: subject_id.to_string(),
            data,
            actor_id,
        })?;
        Ok(AppendReceipt {
            sequence_number: entry.sequence_number,
            entry_hash: entry.entry_hash,
        })
    }

    /// List ledger entries with optional filters and paging.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    pub fn list_events(
        &self,
        filter: &EventFilter,
        offset: u64,
        limit: u64,
    ) -> Result<EventPage> {
        ledger::query::list_events(&self.conn, filter, offset, limit)
    }

    /// The full audit trail for one subject.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    pub fn trail(&self, subject_id: &str) -> Result<Vec<LedgerEntry>> {
        ledger::query::trail(&self.conn, subject_id)
    }

    /// Verify the whole chain in bounded batches.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure; findings are data in the report.
    pub fn verify_chain(&self, batch_size: Option<usize>) -> Result<ChainReport> {
        Ok(ledger::verify::verify_chain(
            &self.conn,
            batch_size.unwrap_or(self.verify_batch_size),
        )?)
    }

    // -----------------------------------------------------------------
    // External interface: device trust
    // -----------------------------------------------------------------

    /// Register a device or re-register it at an equal-or-higher tier.
    ///
    /// Every outcome — including a refused downgrade — appends a
    /// `device_register` entry noting the version transition.
    ///
    /// # Errors
    ///
    /// Registry or append-path errors.
    pub fn register_device(
        &mut self,
        device_id: &str,
        public_key: &[u8],
        crypto_version: CryptoVersion,
    ) -> Result<Registration, ServiceError> {
        let registration =
            registry::register_device(&self.conn, device_id, public_key, crypto_version, Self::now_us())?;

        self.append(AppendRequest {
            subject_id: device_id.to_string(),
            data: EventData::DeviceRegister(DeviceRegisterData {
                crypto_version,
                previous_version: registration.previous_version,
                key_fingerprint: key_fingerprint(public_key),
                outcome: registration.outcome,
                extra: BTreeMap::new(),
            }),
            actor_id: Some(format!("device:{device_id}")),
        })?;

        Ok(registration)
    }

    // -----------------------------------------------------------------
    // External interface: upload verification
    // -----------------------------------------------------------------

    /// Run the full upload pipeline: trust lookup, streaming integrity
    /// check, signature check, outcome mapping, media insert, ledger
    /// append. The append happens for every outcome; a `failed`
    /// verification is recorded, never suppressed.
    ///
    /// # Errors
    ///
    /// Structural failures only (stream I/O, storage, append contention).
    /// Verification failures are data: they come back as the status.
    pub fn verify_upload<R: Read>(
        &mut self,
        request: UploadRequest<'_, R>,
    ) -> Result<UploadOutcome, ServiceError> {
        let UploadRequest {
            device_id,
            content,
            claimed_hash,
            signed_payload,
            signature,
            media_type,
            source,
            captured_at_us,
            lat,
            lon,
        } = request;

        let now_us = Self::now_us();
        let content_hash = verifier::hash_reader(content)?;
        let media_id = derive_media_id(device_id, &content_hash, now_us);

        let Some(device) = registry::get_device(&self.conn, device_id)? else {
            // Unknown device: reject at the trust boundary. No media row is
            // created, but the failed upload still becomes a ledger entry.
            tracing::warn!(device_id, "upload from unknown device");
            let entry = self.append(upload_append_request(
                &media_id,
                &content_hash,
                device_id,
                media_type,
                source,
                captured_at_us,
                VerificationStatus::Failed,
            ))?;
            return Ok(UploadOutcome {
                status: VerificationStatus::Failed,
                entry,
                record: None,
            });
        };

        let integrity_ok = verifier::integrity_matches(&content_hash, claimed_hash);
        let signature_ok = verifier::verify_signature(&device, signed_payload, signature);
        let status =
            verifier::resolve_outcome(integrity_ok, signature_ok, device.crypto_version, source);

        let record = MediaRecord {
            media_id: media_id.clone(),
            device_id: device_id.to_string(),
            content_hash: content_hash.clone(),
            captured_at_us,
            lat,
            lon,
            media_type: media_type.to_string(),
            source,
            signature: signature.to_vec(),
            signed_payload: signed_payload.to_vec(),
            verification_status: status,
            category: None,
            notes: None,
            tags: Vec::new(),
            location_description: None,
            created_at_us: now_us,
            deleted_at_us: None,
        };
        media::insert_media(&self.conn, &record)?;

        let entry = self.append(upload_append_request(
            &media_id,
            &content_hash,
            device_id,
            media_type,
            source,
            captured_at_us,
            status,
        ))?;

        tracing::info!(%media_id, device_id, %status, "upload verified");

        Ok(UploadOutcome {
            status,
            entry,
            record: Some(record),
        })
    }

    // -----------------------------------------------------------------
    // Media lifecycle events
    // -----------------------------------------------------------------

    /// Apply an annotation edit and log it under the channel's event type.
    ///
    /// # Errors
    ///
    /// Media or append-path errors.
    pub fn annotate_media(
        &mut self,
        media_id: &str,
        edit: AnnotationData,
        channel: AnnotationChannel,
        actor_id: Option<String>,
    ) -> Result<(MediaRecord, LedgerEntry), ServiceError> {
        let record = media::apply_annotations(&self.conn, media_id, &edit)?;

        let data = match channel {
            AnnotationChannel::Device => EventData::AnnotationUpdate(edit),
            AnnotationChannel::Web => EventData::WebAnnotationUpdate(edit),
        };
        let entry = self.append(AppendRequest {
            subject_id: media_id.to_string(),
            data,
            actor_id,
        })?;

        Ok((record, entry))
    }

    /// Soft-delete a media record and log the deletion.
    ///
    /// # Errors
    ///
    /// Media or append-path errors.
    pub fn delete_media(
        &mut self,
        media_id: &str,
        reason: Option<String>,
        actor_id: Option<String>,
    ) -> Result<(MediaRecord, LedgerEntry), ServiceError> {
        let record = media::soft_delete_media(&self.conn, media_id, Self::now_us())?;
        let entry = self.append(AppendRequest {
            subject_id: media_id.to_string(),
            data: EventData::VideoDeleted(VideoDeletedData {
                reason,
                extra: BTreeMap::new(),
            }),
            actor_id,
        })?;
        Ok((record, entry))
    }

    /// Fetch a media record by id.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    pub fn get_media(&self, media_id: &str) -> Result<Option<MediaRecord>, MediaError> {
        media::get_media(&self.conn, media_id)
    }

    // -----------------------------------------------------------------
    // Remaining taxonomy: user, review, and tag events
    // -----------------------------------------------------------------

    /// Log a user account creation.
    ///
    /// # Errors
    ///
    /// Append-path errors.
    pub fn record_user_created(
        &mut self,
        user_id: &str,
        username: &str,
        role: &str,
        actor_id: Option<String>,
    ) -> Result<LedgerEntry, ServiceError> {
        self.append(AppendRequest {
            subject_id: user_id.to_string(),
            data: EventData::UserCreated(UserCreatedData {
                username: username.to_string(),
                role: role.to_string(),
                extra: BTreeMap::new(),
            }),
            actor_id,
        })
    }

    /// Log a user account field change.
    ///
    /// # Errors
    ///
    /// Append-path errors.
    pub fn record_user_updated(
        &mut self,
        user_id: &str,
        field: &str,
        value: Value,
        actor_id: Option<String>,
    ) -> Result<LedgerEntry, ServiceError> {
        self.append(AppendRequest {
            subject_id: user_id.to_string(),
            data: EventData::UserUpdated(UserUpdatedData {
                field: field.to_string(),
                value,
                extra: BTreeMap::new(),
            }),
            actor_id,
        })
    }

    /// Log a password reset.
    ///
    /// # Errors
    ///
    /// Append-path errors.
    pub fn record_password_reset(
        &mut self,
        user_id: &str,
        requested_by: Option<String>,
        actor_id: Option<String>,
    ) -> Result<LedgerEntry, ServiceError> {
        self.append(AppendRequest {
            subject_id: user_id.to_string(),
            data: EventData::PasswordReset(PasswordResetData {
                requested_by,
                extra: BTreeMap::new(),
            }),
            actor_id,
        })
    }

    /// Log a review-queue decision for a media record.
    ///
    /// # Errors
    ///
    /// Append-path errors.
    pub fn record_queue_review(
        &mut self,
        media_id: &str,
        decision: &str,
        notes: Option<String>,
        actor_id: Option<String>,
    ) -> Result<LedgerEntry, ServiceError> {
        self.append(AppendRequest {
            subject_id: media_id.to_string(),
            data: EventData::QueueReview(QueueReviewData {
                decision: decision.to_string(),
                notes,
                extra: BTreeMap::new(),
            }),
            actor_id,
        })
    }

    /// Log a tag removal from the tag inventory.
    ///
    /// # Errors
    ///
    /// Append-path errors.
    pub fn record_tag_deleted(
        &mut self,
        tag: &str,
        actor_id: Option<String>,
    ) -> Result<LedgerEntry, ServiceError> {
        self.append(AppendRequest {
            subject_id: format!("tag:{tag}"),
            data: EventData::TagDeleted(TagDeletedData {
                tag: tag.to_string(),
                extra: BTreeMap::new(),
            }),
            actor_id,
        })
    }
}

/// Build the `upload` append request shared by the known- and
/// unknown-device paths.
fn upload_append_request(
    media_id: &str,
    content_hash: &str,
    device_id: &str,
    media_type: &str,
    source: MediaSource,
    captured_at_us: Option<i64>,
    status: VerificationStatus,
) -> AppendRequest {
    AppendRequest {
        subject_id: media_id.to_string(),
        data: EventData::Upload(UploadData {
            media_id: media_id.to_string(),
            content_hash: content_hash.to_string(),
            media_type: media_type.to_string(),
            source,
            outcome: status,
            captured_at_us,
            extra: BTreeMap::new(),
        }),
        actor_id: Some(format!("device:{device_id}")),
    }
}

/// Derive a media id from what arrived and when. Content-addressed enough
/// to be stable in logs, salted with arrival time so re-uploads of the same
/// bytes get distinct records.
fn derive_media_id(device_id: &str, content_hash: &str, now_us: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(device_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(content_hash.as_bytes());
    hasher.update(&now_us.to_le_bytes());
    format!("md-{}", &hasher.finalize().to_hex().as_str()[..12])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
