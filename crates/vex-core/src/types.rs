//! # Domain Types
//!
//! Stored records of the Vex MDM server.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Device      │   │     Command     │   │  CommandResult  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  udid (key)     │   │  uuid (key)     │   │  device_udid    │       │
//! │  │  descriptors    │   │  request_type   │   │  command_uuid   │       │
//! │  │  push_magic     │   │  payload (raw)  │   │  status         │       │
//! │  │  token          │   └────────┬────────┘   │  raw report     │       │
//! │  │  unlock_token   │            │            └─────────────────┘       │
//! │  │  bootstrap_token│            ▼                                       │
//! │  └─────────────────┘   ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │   QueueEntry    │   │   Enrollment    │       │
//! │                        │  ─────────────  │   │  ─────────────  │       │
//! │                        │  device_udid    │   │  udid           │       │
//! │                        │  command_uuid   │   │  enrollment_id  │       │
//! │                        │  sequence       │   │  user ids/names │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! A device is keyed by its UDID. A command is keyed by its command UUID and
//! its body is stored once, no matter how many devices it is queued for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::CommandStatus;

// =============================================================================
// Enrollment
// =============================================================================

/// Identity block carried by every inbound device message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub udid: String,
    pub enrollment_user_id: Option<String>,
    pub user_id: Option<String>,
    pub user_short_name: Option<String>,
    pub user_long_name: Option<String>,
    pub enrollment_id: Option<String>,
    pub topic: Option<String>,
}

impl Enrollment {
    /// Creates an enrollment with only the device identifier set.
    pub fn for_device(udid: impl Into<String>) -> Self {
        Self {
            udid: udid.into(),
            ..Self::default()
        }
    }

    /// Key under which the enrollment record is stored.
    ///
    /// User-channel enrollments carry their own EnrollmentID; device-channel
    /// enrollments fall back to the UDID.
    pub fn storage_key(&self) -> &str {
        match self.enrollment_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.udid,
        }
    }
}

// =============================================================================
// Device
// =============================================================================

/// A managed device as held by the device registry.
///
/// Descriptors come from `Authenticate`; push addressing from `TokenUpdate`.
/// A device that has authenticated but not yet sent a token update has no
/// `token` and is not push-addressable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Device {
    /// Unique device identifier (primary key).
    pub udid: String,

    pub build_version: Option<String>,
    pub name: Option<String>,
    pub imei: Option<String>,
    pub meid: Option<String>,
    pub model: Option<String>,
    pub model_name: Option<String>,
    pub os_version: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,

    /// Opaque string that must be echoed in every push to this device.
    pub push_magic: Option<String>,

    /// APNs device token, rendered as hex in JSON.
    #[serde(serialize_with = "hex_bytes::serialize")]
    pub token: Option<Vec<u8>>,

    /// Secrets are never rendered into admin output.
    #[serde(skip_serializing)]
    pub unlock_token: Option<Vec<u8>>,

    #[serde(skip_serializing)]
    pub bootstrap_token: Option<Vec<u8>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Creates a device record with no descriptors and no push addressing.
    pub fn new(udid: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            udid: udid.into(),
            build_version: None,
            name: None,
            imei: None,
            meid: None,
            model: None,
            model_name: None,
            os_version: None,
            product_name: None,
            serial_number: None,
            push_magic: None,
            token: None,
            unlock_token: None,
            bootstrap_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a wake-up notification can be addressed to this device.
    pub fn is_push_addressable(&self) -> bool {
        matches!(&self.token, Some(token) if !token.is_empty())
    }

    /// The push token as lowercase hex, if any.
    pub fn token_hex(&self) -> Option<String> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(hex::encode)
    }
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// An administrator-issued command body.
///
/// `payload` is the exact byte sequence delivered to the device. The server
/// never re-serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Command {
    /// Command UUID (primary key, chosen by the issuer).
    pub uuid: String,
    /// `RequestType` tag, kept for listing and logging.
    pub request_type: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(
        uuid: impl Into<String>,
        request_type: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            request_type: request_type.into(),
            payload: payload.into(),
        }
    }
}

// =============================================================================
// Queue Entry
// =============================================================================

/// Association "command X is pending for device Y".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QueueEntry {
    /// Monotonic enqueue sequence, used for FIFO ordering.
    pub id: i64,
    pub device_udid: String,
    pub command_uuid: String,
    pub enqueued_at: DateTime<Utc>,
}

// =============================================================================
// Command Result
// =============================================================================

/// The device's report for a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub device_udid: String,
    pub command_uuid: String,
    pub status: CommandStatus,
    /// The full raw report as received.
    #[serde(skip)]
    pub raw: Vec<u8>,
    pub recorded_at: DateTime<Utc>,
}

/// What recording a result did to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOutcome {
    /// A matching queue entry existed and has been removed.
    Resolved,
    /// No matching queue entry existed. The result is kept only if none was
    /// recorded for the pair before.
    Unsolicited,
}

// =============================================================================
// Queue Policies
// =============================================================================

/// Which pending command is handed out next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOrder {
    /// Lowest command UUID first (lexicographic).
    #[default]
    CommandId,
    /// Earliest enqueued first.
    Enqueued,
}

/// How an enqueue treats a command UUID that is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Reject the whole batch.
    #[default]
    Reject,
    /// Replace the stored body and keep going.
    Overwrite,
}

// =============================================================================
// Unit Tests
// =============================================================================
