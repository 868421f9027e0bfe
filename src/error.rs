//! Custom error types for the application.
//!
//! `DaqError` consolidates every failure class the crate surfaces, following
//! the propagation policy of the transport layer:
//!
//! - **`Connection`**: a bus-level open failure. Logged and re-raised; no
//!   instrument operation is possible without a session.
//! - **`Communication`**: a send/query round-trip failure after a session is
//!   open. These are logged and swallowed at the [`Session`] boundary (the
//!   caller sees a sentinel instead), so the variant mostly shows up in logs
//!   and in transport implementations.
//! - **`ModeAssertion`**: read-back after a mode-change command did not match
//!   the requested mode. Fatal and never retried: proceeding with an
//!   unconfirmed mode risks acquiring nonsensical measurements.
//! - **`AllocationExhausted`**: no unallocated candidate address remains for
//!   a requested driver kind. Surfaced to the calling script.
//! - **`AddressBusy`**: a second session was requested for an address whose
//!   previous session is still live. Double-open is refused by design.
//!
//! [`Session`]: crate::session::Session

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection to instrument at {address} failed: {reason}")]
    Connection { address: String, reason: String },

    #[error("Communication with instrument at {address} failed on '{command}': {reason}")]
    Communication {
        address: String,
        command: String,
        reason: String,
    },

    #[error("Mode assertion failed: requested '{requested}', instrument reported '{reported}'")]
    ModeAssertion { requested: String, reported: String },

    #[error("Allocation ran out of the address pool for {kind}")]
    AllocationExhausted { kind: &'static str },

    #[error("Address {0} already has an open session")]
    AddressBusy(String),

    #[error("Storage error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}
