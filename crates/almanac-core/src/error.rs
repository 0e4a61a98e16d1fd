//! Error types for the almanac crates.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Error, Debug)]
pub enum AlmanacError {
    /// Malformed record, missing required field, or an invalid recurrence
    /// rule (rate of zero, empty day mask).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A one-time event whose target already passed, or another request
    /// the engine cannot schedule.
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Failure inside a timer tick. Logged by the timer loop; the event is
    /// re-armed for the next minute.
    #[error("Timer error: {0}")]
    Timer(String),

    /// Solar position could not be resolved for the requested phenomenon.
    #[error("Solar calculation error: {0}")]
    Solar(String),

    /// Reading or writing a profile file failed. The in-memory state stays
    /// authoritative and the profile remains dirty.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for almanac operations.
pub type Result<T> = std::result::Result<T, AlmanacError>;
