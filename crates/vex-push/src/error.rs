//! # Push Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Push Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Provider            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Credentials    │  │  Transport      │  │  Rejected { status,     │ │
//! │  │                 │  │  TimedOut       │  │             reason }    │ │
//! │  │                 │  │  Cancelled      │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `PushError` describes one notification. It is collected into the
//! outcome map returned by the dispatcher and never aborts a fan-out.

use thiserror::Error;

/// Result type alias for push operations.
pub type PushResult<T> = Result<T, PushError>;

/// Failure to deliver a single wake-up notification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PushError {
    /// The push provider answered with a non-success status.
    #[error("Push rejected (status {status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The request could not be sent or the response could not be read.
    #[error("Push transport error: {0}")]
    Transport(String),

    /// The per-request timeout elapsed.
    #[error("Push timed out")]
    TimedOut,

    /// The fan-out was cancelled before this notification completed.
    #[error("Push cancelled")]
    Cancelled,

    /// The client certificate or key could not be loaded.
    #[error("Push credentials error: {0}")]
    Credentials(String),
}

impl From<reqwest::Error> for PushError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PushError::TimedOut
        } else {
            PushError::Transport(err.to_string())
        }
    }
}
