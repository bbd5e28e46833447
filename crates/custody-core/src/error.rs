use std::fmt;

/// Machine-readable error codes for operator and API-layer decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UnknownDevice,
    DowngradeRefused,
    MediaNotFound,
    HashMismatch,
    SignatureInvalid,
    SequenceGap,
    ChainBroken,
    EntryWriteFailed,
    AppendContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UnknownDevice => "E2001",
            Self::DowngradeRefused => "E2002",
            Self::MediaNotFound => "E2003",
            Self::HashMismatch => "E3001",
            Self::SignatureInvalid => "E3002",
            Self::SequenceGap => "E4001",
            Self::ChainBroken => "E4002",
            Self::EntryWriteFailed => "E5001",
            Self::AppendContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Ledger not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UnknownDevice => "Device not registered",
            Self::DowngradeRefused => "Crypto version downgrade refused",
            Self::MediaNotFound => "Media record not found",
            Self::HashMismatch => "Content hash mismatch",
            Self::SignatureInvalid => "Signature verification failed",
            Self::SequenceGap => "Sequence gap in ledger",
            Self::ChainBroken => "Broken chain link",
            Self::EntryWriteFailed => "Ledger entry write failed",
            Self::AppendContention => "Append lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `cst init` to create the ledger database."),
            Self::ConfigParseError => Some("Fix syntax in custody.toml and retry."),
            Self::UnknownDevice => {
                Some("Register the device with `cst register-device` before uploading.")
            }
            Self::DowngradeRefused => {
                Some("Re-register at an equal or higher trust tier; downgrades are not applied.")
            }
            Self::MediaNotFound => None,
            Self::HashMismatch | Self::SignatureInvalid => None,
            Self::SequenceGap | Self::ChainBroken => {
                Some("The ledger storage has been altered; preserve it and escalate.")
            }
            Self::EntryWriteFailed => Some("Check disk space and write permissions."),
            Self::AppendContention => Some("Retry the append; another writer held the tail lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
