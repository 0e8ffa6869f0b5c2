// This module defines the checker's error types using thiserror. SetupError covers the
// one-time registrations performed on activation and undone on teardown: reserving the
// marker note range, obtaining a thread-local storage slot, and (un)registering the
// pipeline client. These are never retried; the activation controller maps them onto the
// host-facing Status::Error. StateMismatch is the integrity-violation diagnostic produced
// by the state comparison; it names the first register field that differs between the
// instrumented execution and the uninstrumented re-execution, with both values rendered.

//! Error types for the state comparison checker.

use thiserror::Error;

/// Failure of a one-time registration during activation or teardown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("failed to reserve {requested} marker notes: note space exhausted")]
    NoteSpaceExhausted { requested: usize },

    #[error("no thread-local storage slot available")]
    TlsSlotUnavailable,

    #[error("failed to register pipeline client '{name}'")]
    ClientRegistration { name: &'static str },

    #[error("failed to unregister {what}")]
    Unregistration { what: &'static str },
}

/// Register field that differs between the instrumented run and the re-execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("state mismatch: {field} (instrumented {instrumented}, re-executed {reexecuted})")]
pub struct StateMismatch {
    /// Schema name of the field, e.g. `rax` or `zmm3`.
    pub field: &'static str,
    pub instrumented: String,
    pub reexecuted: String,
}

/// Result type alias for setup operations.
pub type SetupResult<T> = Result<T, SetupError>;
