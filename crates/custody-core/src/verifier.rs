//! Content verifier: integrity and authenticity checks for uploads.
//!
//! Two independent checks combine into one [`VerificationStatus`]:
//!
//! - **Integrity** — the SHA-256 digest recomputed over the received bytes
//!   equals the claimed `content_hash`. The hasher is incremental; content
//!   streams through fixed-size buffers and is never fully resident.
//! - **Authenticity** — the signature verifies against the device's
//!   registered key under its current [`CryptoVersion`]. Verification runs
//!   over the exact bytes that were signed; the payload is never pre-hashed
//!   on this side, which would silently double-hash and always fail.
//!
//! Every outcome, `failed` included, becomes an `upload` ledger entry. The
//! failure *is* the log entry.

use hmac::{Hmac, Mac};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use subtle::ConstantTimeEq;

use crate::media::{MediaSource, VerificationStatus};
use crate::registry::{CryptoVersion, Device};

type HmacSha256 = Hmac<Sha256>;

/// Read buffer size for streamed hashing.
const HASH_CHUNK: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Streaming content hash
// ---------------------------------------------------------------------------

/// Incremental SHA-256 over uploaded content.
#[derive(Debug, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Start a fresh digest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Finish and return the lowercase hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Hash an entire byte stream in bounded-size chunks.
///
/// # Errors
///
/// Returns any I/O error from the reader.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0_u8; HASH_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Compare a recomputed digest against the claimed one in constant time.
///
/// Hex case differences are not treated as mismatches.
#[must_use]
pub fn integrity_matches(computed_hex: &str, claimed_hex: &str) -> bool {
    let computed = computed_hex.to_ascii_lowercase();
    let claimed = claimed_hex.to_ascii_lowercase();
    computed.len() == claimed.len()
        && computed.as_bytes().ct_eq(claimed.as_bytes()).into()
}

// ---------------------------------------------------------------------------
// Signature verification
// ---------------------------------------------------------------------------

/// Verify `signature` over the exact `signed_payload` bytes under the
/// device's registered key, dispatching on its stored crypto version.
///
/// Malformed key material or signature encoding counts as an invalid
/// signature; the trust decision is the same either way.
#[must_use]
pub fn verify_signature(device: &Device, signed_payload: &[u8], signature: &[u8]) -> bool {
    match device.crypto_version {
        CryptoVersion::SoftwareHmac => verify_hmac(&device.public_key, signed_payload, signature),
        CryptoVersion::HardwareEcdsaP256 => {
            verify_ecdsa_p256(&device.public_key, signed_payload, signature)
        }
    }
}

fn verify_hmac(key: &[u8], payload: &[u8], tag: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(tag).is_ok()
}

fn verify_ecdsa_p256(sec1_key: &[u8], payload: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(sec1_key) else {
        tracing::warn!("registered ECDSA key material failed to parse as SEC1");
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(payload, &sig).is_ok()
}

// ---------------------------------------------------------------------------
// Outcome mapping
// ---------------------------------------------------------------------------

/// Map the two check results onto the terminal verification outcome.
///
/// | Integrity | Authenticity        | Source      | Outcome         |
/// |-----------|---------------------|-------------|-----------------|
/// | match     | valid, hardware key | live        | `verified`      |
/// | match     | valid, otherwise    | live/upload | `signed-upload` |
/// | match     | invalid             | any         | `error`         |
/// | mismatch  | —                   | any         | `failed`        |
///
/// The unknown-device row of the outcome table never reaches this function;
/// the caller fails at the trust boundary before any check runs.
#[must_use]
pub const fn resolve_outcome(
    integrity_ok: bool,
    signature_ok: bool,
    crypto_version: CryptoVersion,
    source: MediaSource,
) -> VerificationStatus {
    if !integrity_ok {
        return VerificationStatus::Failed;
    }
    if !signature_ok {
        return VerificationStatus::Error;
    }
    match (crypto_version, source) {
        (CryptoVersion::HardwareEcdsaP256, MediaSource::Live) => VerificationStatus::Verified,
        _ => VerificationStatus::SignedUpload,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
