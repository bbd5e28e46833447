//! custody-core: tamper-evident upload ledger and chain-of-custody verifier.
//!
//! An append-only, hash-chained log records every trust-relevant event —
//! device registration, media upload, annotation edit, review, deletion —
//! in strict global order, together with the content-integrity and
//! signature-verification pipeline that decides what gets logged as
//! verified. A third party can later prove that specific content arrived
//! at a specific time, from a specific device, and has not been altered or
//! reordered since, without trusting the operator not to have edited
//! history.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums with machine-readable codes
//!   ([`error::ErrorCode`]) on the write paths; `anyhow::Result` on
//!   plumbing and read paths.
//! - **Logging**: `tracing` macros throughout.
//! - **Time**: `i64` microseconds since epoch in storage; `chrono` at
//!   display edges.

#![forbid(unsafe_code)]

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod ledger;
pub mod lock;
pub mod media;
pub mod registry;
pub mod service;
pub mod verifier;

pub use config::{CustodyConfig, load_config, save_config};
pub use error::ErrorCode;
pub use event::{EventData, EventType, GENESIS_PREVIOUS_HASH, LedgerEntry};
pub use ledger::query::{EventFilter, EventPage};
pub use ledger::verify::ChainReport;
pub use media::{MediaRecord, MediaSource, VerificationStatus};
pub use registry::{CryptoVersion, Device, Registration, RegistrationOutcome};
pub use service::{AnnotationChannel, CustodyService, UploadOutcome, UploadRequest};
