//! # Validation Module
//!
//! Input validation for identifiers and command batches.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Wire decoding (vex-server)                                   │
//! │  ├── plist well-formedness                                             │
//! │  └── Required keys present                                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Identifier shape (non-empty, bounded, printable)                  │
//! │  └── Batch shape (non-empty, no repeated command UUID)                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── PRIMARY KEY / UNIQUE constraints                                  │
//! │  └── NOT NULL constraints                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use vex_core::validation::{validate_udid, validate_command_uuid};
//!
//! validate_udid("00008030-001A2B3C4D5E6F70").unwrap();
//! assert!(validate_command_uuid("").is_err());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::Command;
use crate::MAX_IDENTIFIER_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace or control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a device UDID.
///
/// ## Rules
/// - Must not be empty
/// - At most [`MAX_IDENTIFIER_LEN`] bytes
/// - No whitespace or control characters
pub fn validate_udid(udid: &str) -> ValidationResult<()> {
    validate_identifier("udid", udid)
}

/// Validates a command UUID. Same rules as [`validate_udid`].
///
/// Command UUIDs are chosen by the issuer, so no particular UUID format is
/// enforced.
pub fn validate_command_uuid(uuid: &str) -> ValidationResult<()> {
    validate_identifier("command_uuid", uuid)
}

// =============================================================================
// Batch Validators
// =============================================================================

/// Validates an enqueue batch.
///
/// An empty command list is allowed (the enqueue is then a no-op), but every
/// command must carry a valid, unique UUID and a non-empty payload.
pub fn validate_command_batch(commands: &[Command]) -> ValidationResult<()> {
    let mut seen = HashSet::with_capacity(commands.len());

    for command in commands {
        validate_command_uuid(&command.uuid)?;

        if command.payload.is_empty() {
            return Err(ValidationError::Required {
                field: format!("payload of command {}", command.uuid),
            });
        }

        if !seen.insert(command.uuid.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "command_uuid".to_string(),
                value: command.uuid.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_udid() {
        assert!(validate_udid("UDID-1").is_ok());
        assert!(validate_udid("00008030-001A2B3C4D5E6F70").is_ok());

        assert!(matches!(
            validate_udid(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_udid("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_udid("UDID 1"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_udid(&"A".repeat(MAX_IDENTIFIER_LEN + 1)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_validate_command_uuid() {
        assert!(validate_command_uuid("cmd-1").is_ok());
        assert!(validate_command_uuid("").is_err());
        assert!(validate_command_uuid("cmd\n1").is_err());
    }

    #[test]
    fn test_validate_command_batch() {
        let batch = vec![
            Command::new("a", "DeviceLock", b"<plist/>".to_vec()),
            Command::new("b", "DeviceLock", b"<plist/>".to_vec()),
        ];
        assert!(validate_command_batch(&batch).is_ok());
        assert!(validate_command_batch(&[]).is_ok());
    }

    #[test]
    fn test_validate_command_batch_rejects_repeats() {
        let batch = vec![
            Command::new("a", "DeviceLock", b"<plist/>".to_vec()),
            Command::new("a", "EraseDevice", b"<plist/>".to_vec()),
        ];
        let err = validate_command_batch(&batch).unwrap_err();
        assert!(matches!(err, ValidationError::Duplicate { value, .. } if value == "a"));
    }

    #[test]
    fn test_validate_command_batch_rejects_empty_payload() {
        let batch = vec![Command::new("a", "DeviceLock", Vec::new())];
        assert!(matches!(
            validate_command_batch(&batch),
            Err(ValidationError::Required { .. })
        ));
    }
}
