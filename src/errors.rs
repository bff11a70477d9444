//! Structured error types for notify-bridge
//!
//! Uses thiserror for ergonomic error definitions with automatic Display
//! and Error trait implementations.

use thiserror::Error;

/// All possible errors in notify-bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Call argument or hint value has an unrecognized shape
    #[error("Bad argument: {0}")]
    BadArgument(&'static str),

    /// Copying a string argument into native memory failed
    #[error("Out of memory while copying a string argument")]
    NoMemory,

    /// Application name rejected at initialization
    #[error("Invalid application name: {0}")]
    InvalidAppName(&'static str),

    /// Notification server could not be reached at initialization
    #[error("Notification service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The notification server refused to display a notification
    #[error("Display request failed: {0}")]
    Display(String),

    /// The call dispatcher has shut down
    #[error("Dispatcher stopped")]
    DispatcherStopped,

    /// Port or socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
