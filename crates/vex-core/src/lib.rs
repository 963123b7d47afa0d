//! # vex-core: Domain Model for Vex MDM
//!
//! This crate holds the types every other crate agrees on: the stored
//! records (devices, commands, queue entries, results) and the protocol
//! vocabulary a device speaks on check-in. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vex MDM Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/vex-server                              │   │
//! │  │   check-in endpoint ──► protocol dispatcher ──► commander       │   │
//! │  └──────────────┬───────────────────────────────────┬──────────────┘   │
//! │                 │                                   │                   │
//! │  ┌──────────────▼──────────────┐     ┌──────────────▼──────────────┐   │
//! │  │   vex-db                    │     │   vex-push                  │   │
//! │  │   device registry           │     │   APNs fan-out              │   │
//! │  │   command store             │     │                             │   │
//! │  └──────────────┬──────────────┘     └──────────────┬──────────────┘   │
//! │                 │                                   │                   │
//! │  ┌──────────────▼───────────────────────────────────▼──────────────┐   │
//! │  │               ★ vex-core (THIS CRATE) ★                         │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                   │   │
//! │  │   │   types   │  │ protocol  │  │ validation│                   │   │
//! │  │   │  Device   │  │ Message   │  │   udid    │                   │   │
//! │  │   │  Command  │  │ Status    │  │   batch   │                   │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                   │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Stored records and queue policies
//! - [`protocol`] - Check-in messages, command reports, statuses
//! - [`error`] - Domain error types
//! - [`validation`] - Identifier and batch validation
//!
//! ## Example Usage
//!
//! ```rust
//! use vex_core::{CommandStatus, Device};
//!
//! let mut device = Device::new("UDID-1");
//! assert!(!device.is_push_addressable());
//!
//! device.token = Some(vec![0xab, 0xcd]);
//! assert_eq!(device.token_hex().as_deref(), Some("abcd"));
//!
//! let status: CommandStatus = "Acknowledged".parse().unwrap();
//! assert!(status.is_terminal());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod protocol;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use protocol::*;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a UDID or command UUID.
pub const MAX_IDENTIFIER_LEN: usize = 255;
