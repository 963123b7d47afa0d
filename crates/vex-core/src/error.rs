//! # Error Types
//!
//! Domain-specific error types for vex-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vex-core errors (this file)                                           │
//! │  ├── CoreError        - Protocol vocabulary violations                 │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  vex-db errors (separate crate)                                        │
//! │  └── DbError          - Persistence and queue consistency failures     │
//! │                                                                         │
//! │  vex-push errors (separate crate)                                      │
//! │  └── PushError        - Per-token delivery failures                    │
//! │                                                                         │
//! │  vex-server errors (in app)                                            │
//! │  └── ServerError      - What the device / admin client sees            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServerError → HTTP status         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while interpreting protocol vocabulary.
///
/// Every variant here is a protocol violation from the point of view of the
/// caller: the request is rejected and no state is touched.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The `MessageType` tag of a check-in message is not one we handle.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// A command report carried a `Status` outside the protocol vocabulary.
    ///
    /// ## When This Occurs
    /// ```text
    /// Device reports: Status = "Exploded"
    ///      │
    ///      ▼
    /// UnknownCommandStatus("Exploded")
    ///      │
    ///      ▼
    /// Request rejected, queue untouched
    /// ```
    #[error("Unexpected command status: {0}")]
    UnknownCommandStatus(String),

    /// A terminal command report did not name the command it reports on.
    #[error("Command report with status {status} is missing CommandUUID")]
    MissingCommandUuid { status: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value inside a single request.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
