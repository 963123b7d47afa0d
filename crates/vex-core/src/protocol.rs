//! # Protocol Vocabulary
//!
//! Decoded shapes of the messages a device sends on check-in, and the
//! vocabulary the protocol dispatcher switches on.
//!
//! ## Message Flow
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │  Device ──► plist body ──► (server decodes) ──► InboundMessage            │
//! │                                                     │                    │
//! │                  ┌──────────────────────────────────┤                    │
//! │                  ▼                                  ▼                    │
//! │        Checkin(CheckinMessage)              Report(CommandReport)        │
//! │        ├── Authenticate                     status: Idle                 │
//! │        ├── TokenUpdate                              Acknowledged         │
//! │        ├── SetBootstrapToken                        Error                │
//! │        ├── CheckOut                                 NotNow               │
//! │        └── DeclarativeManagement                                         │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decoding the wire format lives in the server. This module only fixes the
//! vocabulary and the typed payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// `RequestType` of the declarative-management wrapper command.
pub const DECLARATIVE_MANAGEMENT_REQUEST_TYPE: &str = "DeclarativeManagement";

// =============================================================================
// Message Type
// =============================================================================

/// The `MessageType` tag of a check-in message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Authenticate,
    TokenUpdate,
    SetBootstrapToken,
    CheckOut,
    DeclarativeManagement,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Authenticate => "Authenticate",
            MessageType::TokenUpdate => "TokenUpdate",
            MessageType::SetBootstrapToken => "SetBootstrapToken",
            MessageType::CheckOut => "CheckOut",
            MessageType::DeclarativeManagement => "DeclarativeManagement",
        }
    }
}

impl FromStr for MessageType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Authenticate" => Ok(MessageType::Authenticate),
            "TokenUpdate" => Ok(MessageType::TokenUpdate),
            "SetBootstrapToken" => Ok(MessageType::SetBootstrapToken),
            "CheckOut" => Ok(MessageType::CheckOut),
            "DeclarativeManagement" => Ok(MessageType::DeclarativeManagement),
            other => Err(CoreError::UnknownMessageType(other.to_string())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Command Status
// =============================================================================

/// The `Status` a device reports on a command-report check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandStatus {
    /// Device is ready for the next command.
    Idle,
    /// Device executed the command.
    Acknowledged,
    /// Device failed to execute the command.
    Error,
    /// Device cannot run the command right now and will check in later.
    NotNow,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Idle => "Idle",
            CommandStatus::Acknowledged => "Acknowledged",
            CommandStatus::Error => "Error",
            CommandStatus::NotNow => "NotNow",
        }
    }

    /// Terminal statuses close out a command and produce a stored result.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Acknowledged | CommandStatus::Error)
    }
}

impl FromStr for CommandStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(CommandStatus::Idle),
            "Acknowledged" => Ok(CommandStatus::Acknowledged),
            "Error" => Ok(CommandStatus::Error),
            "NotNow" => Ok(CommandStatus::NotNow),
            other => Err(CoreError::UnknownCommandStatus(other.to_string())),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Check-in Payloads
// =============================================================================

/// Descriptors sent on first contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authenticate {
    pub build_version: Option<String>,
    pub device_name: Option<String>,
    pub imei: Option<String>,
    pub meid: Option<String>,
    pub model: Option<String>,
    pub model_name: Option<String>,
    pub os_version: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
}

/// Push registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub awaiting_configuration: bool,
    pub not_on_console: bool,
    pub push_magic: Option<String>,
    pub token: Option<Vec<u8>>,
    pub unlock_token: Option<Vec<u8>>,
}

/// Bootstrap token escrow. A missing or empty token clears the stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetBootstrapToken {
    pub awaiting_configuration: bool,
    pub bootstrap_token: Option<Vec<u8>>,
}

/// Declarative-management check-in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarativeManagementRequest {
    pub endpoint: Option<String>,
    pub data: Option<Vec<u8>>,
}

/// A decoded check-in message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinMessage {
    Authenticate(Authenticate),
    TokenUpdate(TokenUpdate),
    SetBootstrapToken(SetBootstrapToken),
    CheckOut,
    DeclarativeManagement(DeclarativeManagementRequest),
}

impl CheckinMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            CheckinMessage::Authenticate(_) => MessageType::Authenticate,
            CheckinMessage::TokenUpdate(_) => MessageType::TokenUpdate,
            CheckinMessage::SetBootstrapToken(_) => MessageType::SetBootstrapToken,
            CheckinMessage::CheckOut => MessageType::CheckOut,
            CheckinMessage::DeclarativeManagement(_) => MessageType::DeclarativeManagement,
        }
    }
}

// =============================================================================
// Command Report
// =============================================================================

/// One entry of the error chain a device attaches to an `Error` report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorChainEntry {
    pub error_code: i64,
    pub error_domain: Option<String>,
    pub localized_description: Option<String>,
    pub us_english_description: Option<String>,
}

/// A command-report check-in.
///
/// `status` is kept as received. It is only interpreted by the dispatcher,
/// so an unknown value is rejected before any state is read or written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub command_uuid: Option<String>,
    pub status: String,
    pub request_type: Option<String>,
    pub error_chain: Vec<ErrorChainEntry>,
    /// The undecoded report body. Stored as the command result.
    pub raw: Vec<u8>,
}

impl CommandReport {
    /// Parses `status` into the protocol vocabulary.
    pub fn parsed_status(&self) -> Result<CommandStatus, CoreError> {
        self.status.parse()
    }

    /// The command UUID, required for terminal statuses.
    pub fn required_command_uuid(&self) -> Result<&str, CoreError> {
        match self.command_uuid.as_deref() {
            Some(uuid) if !uuid.is_empty() => Ok(uuid),
            _ => Err(CoreError::MissingCommandUuid {
                status: self.status.clone(),
            }),
        }
    }
}

/// Any inbound device message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Checkin(CheckinMessage),
    Report(CommandReport),
}

// =============================================================================
// Declarative Management Data
// =============================================================================

/// One declarations synchronization token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncToken {
    pub timestamp: DateTime<Utc>,
    pub declarations_token: String,
}

/// JSON body embedded in a `DeclarativeManagement` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeclarativeManagementData {
    pub sync_tokens: Vec<SyncToken>,
}

impl DeclarativeManagementData {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
