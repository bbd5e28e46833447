//! Device trust registry.
//!
//! Stores device identities with their current key material and signing
//! scheme. Devices are created on first registration and changed only by
//! re-registration at an equal-or-higher trust tier; there is no deletion
//! path. Every verification consults the registry, so lookup is a single
//! primary-key read.
//!
//! Progressive upgrade is modeled as a versioned capability on the device
//! row — verification dispatches on the stored [`CryptoVersion`] tag, not
//! on a signer type hierarchy.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// CryptoVersion
// ---------------------------------------------------------------------------

/// The signing scheme a device is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CryptoVersion {
    /// Shared-secret HMAC-SHA256; the software fallback tier.
    #[serde(rename = "software-hmac")]
    SoftwareHmac,
    /// Hardware-backed ECDSA over P-256.
    #[serde(rename = "hardware-ecdsa-p256")]
    HardwareEcdsaP256,
}

impl CryptoVersion {
    /// Persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SoftwareHmac => "software-hmac",
            Self::HardwareEcdsaP256 => "hardware-ecdsa-p256",
        }
    }

    /// Ordering for upgrade decisions: higher is more trusted.
    #[must_use]
    pub const fn trust_tier(self) -> u8 {
        match self {
            Self::SoftwareHmac => 0,
            Self::HardwareEcdsaP256 => 1,
        }
    }

    /// True for hardware-backed schemes.
    #[must_use]
    pub const fn is_hardware(self) -> bool {
        matches!(self, Self::HardwareEcdsaP256)
    }
}

impl fmt::Display for CryptoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown crypto version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCryptoVersion(pub String);

impl fmt::Display for UnknownCryptoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown crypto version '{}': expected 'software-hmac' or 'hardware-ecdsa-p256'",
            self.0
        )
    }
}

impl std::error::Error for UnknownCryptoVersion {}

impl FromStr for CryptoVersion {
    type Err = UnknownCryptoVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "software-hmac" => Ok(Self::SoftwareHmac),
            "hardware-ecdsa-p256" => Ok(Self::HardwareEcdsaP256),
            _ => Err(UnknownCryptoVersion(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RegistrationOutcome
// ---------------------------------------------------------------------------

/// What the registry did with a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationOutcome {
    /// First contact: the device row was created.
    #[serde(rename = "registered")]
    Registered,
    /// Same tier: key material replaced.
    #[serde(rename = "refreshed")]
    Refreshed,
    /// Higher tier: key material and version replaced.
    #[serde(rename = "upgraded")]
    Upgraded,
    /// Lower tier requested: nothing applied, attempt logged.
    #[serde(rename = "downgrade-refused")]
    DowngradeRefused,
}

impl RegistrationOutcome {
    /// Persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Refreshed => "refreshed",
            Self::Upgraded => "upgraded",
            Self::DowngradeRefused => "downgrade-refused",
        }
    }

    /// True when the attempt changed the stored registration.
    #[must_use]
    pub const fn applied(self) -> bool {
        !matches!(self, Self::DowngradeRefused)
    }
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A registered capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Stable external identifier.
    pub device_id: String,
    /// Opaque verification key material. SEC1 point bytes for ECDSA,
    /// shared-secret bytes for HMAC.
    pub public_key: Vec<u8>,
    /// The signing scheme the key belongs to.
    pub crypto_version: CryptoVersion,
    /// When the current registration was written, microseconds since epoch.
    pub registered_at_us: i64,
}

/// Result of a registration attempt: the device row as it stands after the
/// attempt, plus what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Current registry state for the device.
    pub device: Device,
    /// The version registered before this attempt, absent on first contact.
    pub previous_version: Option<CryptoVersion>,
    /// What the registry did.
    pub outcome: RegistrationOutcome,
}

/// Registry storage error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Underlying store failure.
    #[error("registry storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl RegistryError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Storage(_) => ErrorCode::EntryWriteFailed,
        }
    }
}

/// Short fingerprint of key material for event payloads and logs. Never
/// used for verification, only identification.
#[must_use]
pub fn key_fingerprint(public_key: &[u8]) -> String {
    let digest = blake3::hash(public_key);
    digest.to_hex()[..12].to_string()
}

/// Fetch a device by its primary key.
///
/// # Errors
///
/// Returns [`RegistryError::Storage`] on store failure.
pub fn get_device(conn: &Connection, device_id: &str) -> Result<Option<Device>, RegistryError> {
    let device = conn
        .query_row(
            "SELECT device_id, public_key, crypto_version, registered_at_us
             FROM devices WHERE device_id = ?1",
            params![device_id],
            row_to_device,
        )
        .optional()?;
    Ok(device)
}

/// Register a device, or re-register it at an equal-or-higher trust tier.
///
/// A lower-tier attempt is refused: the stored key and version stay as they
/// were and the outcome reports [`RegistrationOutcome::DowngradeRefused`].
/// The caller appends a `device_register` ledger entry for every outcome,
/// refused downgrades included, so the attempted transition is always on
/// the record.
///
/// # Errors
///
/// Returns [`RegistryError::Storage`] on store failure.
pub fn register_device(
    conn: &Connection,
    device_id: &str,
    public_key: &[u8],
    crypto_version: CryptoVersion,
    now_us: i64,
) -> Result<Registration, RegistryError> {
    let existing = get_device(conn, device_id)?;

    let Some(current) = existing else {
        conn.execute(
            "INSERT INTO devices (device_id, public_key, crypto_version, registered_at_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![device_id, public_key, crypto_version.as_str(), now_us],
        )?;
        tracing::info!(device_id, version = %crypto_version, "device registered");
        return Ok(Registration {
            device: Device {
                device_id: device_id.to_string(),
                public_key: public_key.to_vec(),
                crypto_version,
                registered_at_us: now_us,
            },
            previous_version: None,
            outcome: RegistrationOutcome::Registered,
        });
    };

    let previous = current.crypto_version;
    if crypto_version.trust_tier() < previous.trust_tier() {
        tracing::warn!(
            device_id,
            from = %previous,
            to = %crypto_version,
            "downgrade refused; keeping existing registration"
        );
        return Ok(Registration {
            device: current,
            previous_version: Some(previous),
            outcome: RegistrationOutcome::DowngradeRefused,
        });
    }

    conn.execute(
        "UPDATE devices
         SET public_key = ?2, crypto_version = ?3, registered_at_us = ?4
         WHERE device_id = ?1",
        params![device_id, public_key, crypto_version.as_str(), now_us],
    )?;

    let outcome = if crypto_version.trust_tier() > previous.trust_tier() {
        RegistrationOutcome::Upgraded
    } else {
        RegistrationOutcome::Refreshed
    };
    tracing::info!(device_id, from = %previous, to = %crypto_version, %outcome, "device re-registered");

    Ok(Registration {
        device: Device {
            device_id: device_id.to_string(),
            public_key: public_key.to_vec(),
            crypto_version,
            registered_at_us: now_us,
        },
        previous_version: Some(previous),
        outcome,
    })
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    let version: String = row.get(2)?;
    let crypto_version = CryptoVersion::from_str(&version).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Device {
        device_id: row.get(0)?,
        public_key: row.get(1)?,
        crypto_version,
        registered_at_us: row.get(3)?,
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
        db::open_in_memory().expect("open in-memory ledger")
    }

    #[test]
    fn crypto_version_string_forms() {
        assert_eq!(CryptoVersion::SoftwareHmac.as_str(), "software-hmac");
        assert_eq!(
            CryptoVersion::HardwareEcdsaP256.as_str(),
            "hardware-ecdsa-p256"
        );
        for v in [CryptoVersion::SoftwareHmac, CryptoVersion::HardwareEcdsaP256] {
            assert_eq!(v.as_str().parse::<CryptoVersion>().expect("parse"), v);
        }
        assert!("rsa-2048".parse::<CryptoVersion>().is_err());
    }

    #[test]
    fn trust_tier_ordering() {
        assert!(
            CryptoVersion::HardwareEcdsaP256.trust_tier() > CryptoVersion::SoftwareHmac.trust_tier()
        );
        assert!(CryptoVersion::HardwareEcdsaP256.is_hardware());
        assert!(!CryptoVersion::SoftwareHmac.is_hardware());
    }

    #[test]
    fn serde_uses_kebab_names() {
        let json = serde_json::to_string(&CryptoVersion::HardwareEcdsaP256).expect("serialize");
        assert_eq!(json, "\"hardware-ecdsa-p256\"");
        let json = serde_json::to_string(&RegistrationOutcome::DowngradeRefused).expect("serialize");
        assert_eq!(json, "\"downgrade-refused\"");
    }

    #[test]
    fn first_registration_creates_device() {
        let conn = test_conn();
        let reg = register_device(&conn, "cam-01", b"secret-key", CryptoVersion::SoftwareHmac, 100)
            .expect("register");
        assert_eq!(reg.outcome, RegistrationOutcome::Registered);
        assert_eq!(reg.previous_version, None);

        let device = get_device(&conn, "cam-01").expect("get").expect("exists");
        assert_eq!(device.public_key, b"secret-key");
        assert_eq!(device.crypto_version, CryptoVersion::SoftwareHmac);
        assert_eq!(device.registered_at_us, 100);
    }

    #[test]
    fn unknown_device_lookup_is_none() {
        let conn = test_conn();
        assert!(get_device(&conn, "ghost").expect("get").is_none());
    }

    #[test]
    fn upgrade_replaces_key_and_version() {
        let conn = test_conn();
        register_device(&conn, "cam-01", b"old-secret", CryptoVersion::SoftwareHmac, 100)
            .expect("register");
        let reg = register_device(
            &conn,
            "cam-01",
            b"sec1-point-bytes",
            CryptoVersion::HardwareEcdsaP256,
            200,
        )
        .expect("upgrade");
        assert_eq!(reg.outcome, RegistrationOutcome::Upgraded);
        assert_eq!(reg.previous_version, Some(CryptoVersion::SoftwareHmac));

        let device = get_device(&conn, "cam-01").expect("get").expect("exists");
        assert_eq!(device.crypto_version, CryptoVersion::HardwareEcdsaP256);
        assert_eq!(device.public_key, b"sec1-point-bytes");
        assert_eq!(device.registered_at_us, 200);
    }

    #[test]
    fn same_tier_reregistration_refreshes_key() {
        let conn = test_conn();
        register_device(&conn, "cam-01", b"key-a", CryptoVersion::SoftwareHmac, 100)
            .expect("register");
        let reg = register_device(&conn, "cam-01", b"key-b", CryptoVersion::SoftwareHmac, 150)
            .expect("refresh");
        assert_eq!(reg.outcome, RegistrationOutcome::Refreshed);

        let device = get_device(&conn, "cam-01").expect("get").expect("exists");
        assert_eq!(device.public_key, b"key-b");
    }

    #[test]
    fn downgrade_is_refused_and_keeps_old_registration() {
        let conn = test_conn();
        register_device(
            &conn,
            "cam-01",
            b"hardware-key",
            CryptoVersion::HardwareEcdsaP256,
            100,
        )
        .expect("register");

        let reg = register_device(&conn, "cam-01", b"soft-key", CryptoVersion::SoftwareHmac, 200)
            .expect("attempt");
        assert_eq!(reg.outcome, RegistrationOutcome::DowngradeRefused);
        assert!(!reg.outcome.applied());
        assert_eq!(reg.previous_version, Some(CryptoVersion::HardwareEcdsaP256));
        // The registration handed back is the surviving one.
        assert_eq!(reg.device.crypto_version, CryptoVersion::HardwareEcdsaP256);

        let device = get_device(&conn, "cam-01").expect("get").expect("exists");
        assert_eq!(device.crypto_version, CryptoVersion::HardwareEcdsaP256);
        assert_eq!(device.public_key, b"hardware-key");
        assert_eq!(device.registered_at_us, 100);
    }

    #[test]
    fn fingerprint_is_short_stable_hex() {
        let a = key_fingerprint(b"some-key");
        let b = key_fingerprint(b"some-key");
        let c = key_fingerprint(b"other-key");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
