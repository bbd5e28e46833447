//! Command handlers for the `cst` binary.
//!
//! Each handler opens the service against the project root, performs one
//! operation, and renders the result in the selected output mode. All core
//! logic lives in custody-core; this module is presentation plumbing.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::Args;

use custody_core::event::EventType;
use custody_core::{
    CryptoVersion, CustodyConfig, CustodyService, EventFilter, MediaSource, config, load_config,
};

use crate::output::{OutputMode, entry_line};

fn open_service(root: &Path) -> Result<(CustodyService, CustodyConfig)> {
    let cfg = load_config(root)?;
    let svc = CustodyService::open(root, &cfg)?;
    Ok((svc, cfg))
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/// Arguments for `cst init`.
#[derive(Debug, Args)]
pub struct InitArgs {}

pub fn init(_args: &InitArgs, root: &Path, mode: OutputMode) -> Result<()> {
    let cfg = CustodyConfig::default();
    config::save_config(root, &cfg)?;
    let _svc = CustodyService::open(root, &cfg)?;

    mode.emit(
        &serde_json::json!({
            "config": config::CONFIG_FILE,
            "db_path": cfg.ledger.db_path,
        }),
        || {
            println!("initialized custody ledger");
            println!("  config: {}", config::CONFIG_FILE);
            println!("  db:     {}", cfg.ledger.db_path.display());
        },
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// register-device
// ---------------------------------------------------------------------------

/// Arguments for `cst register-device`.
#[derive(Debug, Args)]
pub struct RegisterDeviceArgs {
    /// Stable device identifier.
    pub device_id: String,

    /// Key material as hex: SEC1 point for ECDSA, shared secret for HMAC.
    #[arg(long)]
    pub public_key: String,

    /// Signing scheme: software-hmac or hardware-ecdsa-p256.
    #[arg(long, value_parser = parse_crypto_version)]
    pub crypto_version: CryptoVersion,
}

fn parse_crypto_version(s: &str) -> Result<CryptoVersion, String> {
    CryptoVersion::from_str(s).map_err(|e| e.to_string())
}

pub fn register_device(args: &RegisterDeviceArgs, root: &Path, mode: OutputMode) -> Result<()> {
    let key = hex::decode(&args.public_key).context("public key must be hex")?;
    let (mut svc, _) = open_service(root)?;
    let registration = svc.register_device(&args.device_id, &key, args.crypto_version)?;

    mode.emit(
        &serde_json::json!({
            "device_id": registration.device.device_id,
            "crypto_version": registration.device.crypto_version,
            "outcome": registration.outcome,
        }),
        || {
            println!(
                "{}: {} ({})",
                registration.device.device_id, registration.outcome, registration.device.crypto_version
            );
        },
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

/// Arguments for `cst ingest`.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Content file path, or `-` for stdin.
    pub content: PathBuf,

    /// Originating device id.
    #[arg(long)]
    pub device: String,

    /// Content hash the device claims (SHA-256 hex).
    #[arg(long)]
    pub claimed_hash: String,

    /// The exact signed byte string, hex-encoded.
    #[arg(long)]
    pub signed_payload: String,

    /// Signature over the signed payload, hex-encoded.
    #[arg(long)]
    pub signature: String,

    /// MIME-style media type.
    #[arg(long, default_value = "video/mp4")]
    pub media_type: String,

    /// Content source: live or upload.
    #[arg(long, default_value = "upload", value_parser = parse_source)]
    pub source: MediaSource,
}

fn parse_source(s: &str) -> Result<MediaSource, String> {
    MediaSource::from_str(s).map_err(|e| e.to_string())
}

pub fn ingest(args: &IngestArgs, root: &Path, mode: OutputMode) -> Result<()> {
    let signed_payload = hex::decode(&args.signed_payload).context("signed payload must be hex")?;
    let signature = hex::decode(&args.signature).context("signature must be hex")?;
    let (mut svc, _) = open_service(root)?;

    let content: Box<dyn Read> = if args.content.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(
            File::open(&args.content)
                .with_context(|| format!("open content file {}", args.content.display()))?,
        )
    };

    let outcome = svc.verify_upload(custody_core::UploadRequest {
        device_id: &args.device,
        content,
        claimed_hash: &args.claimed_hash,
        signed_payload: &signed_payload,
        signature: &signature,
        media_type: &args.media_type,
        source: args.source,
        captured_at_us: None,
        lat: None,
        lon: None,
    })?;

    mode.emit(
        &serde_json::json!({
            "status": outcome.status,
            "media_id": outcome.record.as_ref().map(|r| r.media_id.clone()),
            "sequence_number": outcome.entry.sequence_number,
            "entry_hash": outcome.entry.entry_hash,
        }),
        || {
            println!("verification: {}", outcome.status);
            if let Some(record) = &outcome.record {
                println!("media id:     {}", record.media_id);
            }
            println!("ledger entry: #{}", outcome.entry.sequence_number);
        },
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// append
// ---------------------------------------------------------------------------

/// Arguments for `cst append`.
#[derive(Debug, Args)]
pub struct AppendArgs {
    /// Event type from the catalog.
    #[arg(value_parser = parse_event_type)]
    pub event_type: EventType,

    /// Subject the event concerns.
    pub subject_id: String,

    /// JSON payload matching the event type's schema.
    #[arg(long)]
    pub data: String,

    /// Attribution (user or device).
    #[arg(long)]
    pub actor: Option<String>,
}

fn parse_event_type(s: &str) -> Result<EventType, String> {
    EventType::from_str(s).map_err(|e| e.to_string())
}

pub fn append(args: &AppendArgs, root: &Path, mode: OutputMode) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(&args.data).context("event data must be valid JSON")?;
    let (mut svc, _) = open_service(root)?;
    let receipt = svc.append_event(
        args.event_type,
        &args.subject_id,
        &payload,
        args.actor.clone(),
    )?;

    mode.emit(&receipt, || {
        println!("#{} {}", receipt.sequence_number, receipt.entry_hash);
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

/// Arguments for `cst list`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Filter by event type.
    #[arg(long, value_parser = parse_event_type)]
    pub event_type: Option<EventType>,

    /// Filter by subject.
    #[arg(long)]
    pub subject: Option<String>,

    /// Skip this many entries.
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Page size.
    #[arg(long, default_value_t = 50)]
    pub limit: u64,
}

pub fn list(args: &ListArgs, root: &Path, mode: OutputMode) -> Result<()> {
    let (svc, _) = open_service(root)?;
    let filter = EventFilter {
        event_type: args.event_type,
        subject_id: args.subject.clone(),
    };
    let page = svc.list_events(&filter, args.offset, args.limit)?;

    mode.emit(
        &serde_json::json!({
            "total": page.total,
            "entries": page.entries,
        }),
        || {
            for entry in &page.entries {
                println!("{}", entry_line(entry));
            }
            println!("{} of {} entries", page.entries.len(), page.total);
        },
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// trail
// ---------------------------------------------------------------------------

/// Arguments for `cst trail`.
#[derive(Debug, Args)]
pub struct TrailArgs {
    /// Subject to audit.
    pub subject_id: String,
}

pub fn trail(args: &TrailArgs, root: &Path, mode: OutputMode) -> Result<()> {
    let (svc, _) = open_service(root)?;
    let entries = svc.trail(&args.subject_id)?;

    mode.emit(&entries, || {
        if entries.is_empty() {
            println!("no entries for {}", args.subject_id);
            return;
        }
        for entry in &entries {
            println!("{}", entry_line(entry));
        }
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

/// Arguments for `cst verify`.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Entries per batch; defaults to the configured batch size.
    #[arg(long)]
    pub batch_size: Option<usize>,
}

pub fn verify(args: &VerifyArgs, root: &Path, mode: OutputMode) -> Result<()> {
    let (svc, _) = open_service(root)?;
    let report = svc.verify_chain(args.batch_size)?;

    mode.emit(&report, || {
        if report.valid {
            println!("chain valid ({} entries checked)", report.entries_checked);
        } else {
            println!(
                "chain INVALID ({} entries checked, {} findings)",
                report.entries_checked,
                report.errors.len()
            );
            for finding in &report.errors {
                println!("  {finding}");
            }
        }
    });

    if !report.valid {
        bail!("chain verification failed with {} findings", report.errors.len());
    }
    Ok(())
}
