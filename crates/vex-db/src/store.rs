//! # Store Traits
//!
//! The two seams the protocol dispatcher and commander depend on. The
//! SQLite [`Database`] implements both; [`crate::memory::MemoryStore`] is a
//! drop-in for tests.
//!
//! ```text
//! CheckinService / Commander
//!        │
//!        ├── Arc<dyn DeviceRegistry>  save / get / list devices, enrollments
//!        └── Arc<dyn CommandStore>    enqueue / next / save result
//! ```

use async_trait::async_trait;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use vex_core::{Command, CommandResult, CommandStatus, Device, Enrollment, ResultOutcome};

/// Device registry: authoritative record of known devices.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Inserts or fully replaces the record keyed by `device.udid`.
    async fn save_device(&self, device: &Device) -> DbResult<()>;

    /// Returns the device, or `NotFound` if it never authenticated.
    async fn get_device(&self, udid: &str) -> DbResult<Device>;

    /// All devices, ordered by UDID.
    async fn list_devices(&self) -> DbResult<Vec<Device>>;

    /// Stores the enrollment envelope under its storage key.
    async fn save_enrollment(&self, enrollment: &Enrollment) -> DbResult<()>;
}

/// Command store: command bodies, per-device queues and results.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Atomically stores every command and queues each for every device.
    async fn enqueue_commands(&self, commands: &[Command], devices: &[Device]) -> DbResult<()>;

    /// The next pending command for the device, not removed.
    async fn next_command(&self, udid: &str) -> DbResult<Option<Command>>;

    /// Atomically removes the queue entry and records the raw result.
    async fn save_command_result(
        &self,
        udid: &str,
        command_uuid: &str,
        status: CommandStatus,
        raw: &[u8],
    ) -> DbResult<ResultOutcome>;

    /// The recorded result for (device, command), if any.
    async fn get_command_result(&self, udid: &str, command_uuid: &str) -> DbResult<Option<CommandResult>>;

    /// Number of pending commands for the device.
    async fn pending_count(&self, udid: &str) -> DbResult<i64>;
}

#[async_trait]
impl DeviceRegistry for Database {
    async fn save_device(&self, device: &Device) -> DbResult<()> {
        self.devices().save(device).await
    }

    async fn get_device(&self, udid: &str) -> DbResult<Device> {
        self.devices()
            .get_by_udid(udid)
            .await?
            .ok_or_else(|| DbError::not_found("Device", udid))
    }

    async fn list_devices(&self) -> DbResult<Vec<Device>> {
        self.devices().list().await
    }

    async fn save_enrollment(&self, enrollment: &Enrollment) -> DbResult<()> {
        self.enrollments().save(enrollment).await
    }
}

#[async_trait]
impl CommandStore for Database {
    async fn enqueue_commands(&self, commands: &[Command], devices: &[Device]) -> DbResult<()> {
        let udids: Vec<String> = devices.iter().map(|d| d.udid.clone()).collect();
        self.commands().enqueue(commands, &udids).await
    }

    async fn next_command(&self, udid: &str) -> DbResult<Option<Command>> {
        self.commands().next_for_device(udid).await
    }

    async fn save_command_result(
        &self,
        udid: &str,
        command_uuid: &str,
        status: CommandStatus,
        raw: &[u8],
    ) -> DbResult<ResultOutcome> {
        self.commands()
            .save_result(udid, command_uuid, status, raw)
            .await
    }

    async fn get_command_result(&self, udid: &str, command_uuid: &str) -> DbResult<Option<CommandResult>> {
        self.commands().get_result(udid, command_uuid).await
    }

    async fn pending_count(&self, udid: &str) -> DbResult<i64> {
        self.commands().count_pending(udid).await
    }
}
