//! Canonical SQLite schema for the custody store.
//!
//! Three tables:
//! - `ledger_entries` is the append-only chain; the application never issues
//!   UPDATE or DELETE against it, and the schema backs that up with CHECK
//!   constraints on the closed enum columns.
//! - `devices` is the trust registry, keyed by `device_id`.
//! - `media_records` holds uploaded content metadata, soft-deleted via
//!   `deleted_at_us`.

/// Migration v1: core tables.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    sequence_number INTEGER PRIMARY KEY CHECK (sequence_number >= 1),
    event_type TEXT NOT NULL CHECK (event_type IN (
        'device_register', 'upload', 'annotation_update', 'web_annotation_update',
        'video_deleted', 'user_created', 'user_updated', 'password_reset',
        'queue_review', 'tag_deleted'
    )),
    subject_id TEXT NOT NULL,
    event_data TEXT NOT NULL,
    actor_id TEXT,
    entry_hash TEXT NOT NULL UNIQUE,
    previous_hash TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS devices (
    device_id TEXT PRIMARY KEY,
    public_key BLOB NOT NULL,
    crypto_version TEXT NOT NULL CHECK (crypto_version IN (
        'software-hmac', 'hardware-ecdsa-p256'
    )),
    registered_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS media_records (
    media_id TEXT PRIMARY KEY,
    device_id TEXT NOT NULL REFERENCES devices(device_id),
    content_hash TEXT NOT NULL,
    captured_at_us INTEGER,
    lat REAL,
    lon REAL,
    media_type TEXT NOT NULL,
    source TEXT NOT NULL CHECK (source IN ('live', 'upload')),
    signature BLOB NOT NULL,
    signed_payload BLOB NOT NULL,
    verification_status TEXT NOT NULL CHECK (verification_status IN (
        'verified', 'signed-upload', 'error', 'failed', 'pending'
    )),
    category TEXT,
    notes TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    location_description TEXT,
    created_at_us INTEGER NOT NULL,
    deleted_at_us INTEGER
);
"#;

/// Migration v2: read-path indexes for trails, filtered listings, and
/// per-device media views.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_ledger_subject
    ON ledger_entries(subject_id, sequence_number);

CREATE INDEX IF NOT EXISTS idx_ledger_event_type
    ON ledger_entries(event_type, sequence_number);

CREATE INDEX IF NOT EXISTS idx_media_device
    ON media_records(device_id, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_media_content_hash
    ON media_records(content_hash);
"#;

/// Index names migrations are expected to create, for verification in tests.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_ledger_subject",
    "idx_ledger_event_type",
    "idx_media_device",
    "idx_media_content_hash",
];
