//! Error types for the distance-sensing subsystem.
//!
//! Nothing here is fatal to the owning process: every error degrades to
//! "no reading this tick" plus an updated `last_error` string on the reader.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Distance subsystem error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A candidate backend failed to initialize; the probe moves on to the
    /// next candidate.
    #[error("{backend} probe failed: {reason}")]
    Probe {
        /// Candidate backend name
        backend: &'static str,
        /// Initialization failure detail
        reason: String,
    },

    /// A bus read or write failed mid-transaction.
    #[error("bus transaction failed: {0}")]
    Transaction(String),

    /// Ranging did not complete within the timing budget.
    #[error("ranging timed out after {budget_ms} ms")]
    Timeout {
        /// Budget that elapsed, in milliseconds
        budget_ms: u64,
    },

    /// The hardware reported a reserved "no target" code instead of a
    /// distance.
    #[error("no valid target (sentinel {0:#04x})")]
    InvalidReading(u16),

    /// Every candidate backend failed to initialize.
    #[error("no ranging backend detected")]
    NoBackend,
}
