//! Output mode handling: human-readable lines or machine-readable JSON.

use custody_core::LedgerEntry;

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Terse lines for terminals.
    Human,
    /// One JSON document on stdout.
    Json,
}

impl OutputMode {
    /// Print a serializable result in the selected mode, using `human` to
    /// render the terminal form.
    pub fn emit<T, F>(self, value: &T, human: F)
    where
        T: serde::Serialize,
        F: FnOnce(),
    {
        match self {
            Self::Json => match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{json}"),
                Err(err) => eprintln!("failed to render JSON output: {err}"),
            },
            Self::Human => human(),
        }
    }
}

/// One-line rendering of a ledger entry for listings and trails.
pub fn entry_line(entry: &LedgerEntry) -> String {
    let when = entry
        .created_at()
        .map_or_else(|| entry.created_at_us.to_string(), |dt| dt.to_rfc3339());
    format!(
        "{:>6}  {:<22}  {:<20}  {}  {}",
        entry.sequence_number,
        entry.event_type.to_string(),
        entry.subject_id,
        when,
        entry.actor_id.as_deref().unwrap_or("-"),
    )
}
