//! # In-Memory Store
//!
//! A [`DeviceRegistry`] + [`CommandStore`] held entirely in process memory.
//! Semantics match the SQLite implementation: the same validation, queue
//! policies, duplicate handling and result outcomes. One mutex guards all
//! state, so each operation is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::store::{CommandStore, DeviceRegistry};
use vex_core::validation::{validate_command_batch, validate_command_uuid, validate_udid};
use vex_core::{
    Command, CommandResult, CommandStatus, Device, DuplicatePolicy, Enrollment, QueueEntry,
    QueueOrder, ResultOutcome,
};

#[derive(Debug, Default)]
struct State {
    devices: BTreeMap<String, Device>,
    enrollments: HashMap<String, Enrollment>,
    commands: HashMap<String, Command>,
    queues: HashMap<String, Vec<QueueEntry>>,
    results: HashMap<(String, String), CommandResult>,
    next_sequence: i64,
}

/// In-memory registry and command store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    queue_order: QueueOrder,
    duplicate_policy: DuplicatePolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(queue_order: QueueOrder, duplicate_policy: DuplicatePolicy) -> Self {
        Self {
            state: Mutex::new(State::default()),
            queue_order,
            duplicate_policy,
        }
    }

    /// Drops a stored command body while leaving its queue entries behind.
    pub async fn remove_command_body(&self, command_uuid: &str) {
        self.state.lock().await.commands.remove(command_uuid);
    }

    /// Stored enrollment envelope by storage key.
    pub async fn enrollment(&self, key: &str) -> Option<Enrollment> {
        self.state.lock().await.enrollments.get(key).cloned()
    }

    fn first_entry<'a>(&self, entries: &'a [QueueEntry]) -> Option<&'a QueueEntry> {
        match self.queue_order {
            QueueOrder::CommandId => entries
                .iter()
                .min_by(|a, b| a.command_uuid.as_bytes().cmp(b.command_uuid.as_bytes())),
            QueueOrder::Enqueued => entries.iter().min_by_key(|e| e.id),
        }
    }
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn save_device(&self, device: &Device) -> DbResult<()> {
        let mut state = self.state.lock().await;

        let mut record = device.clone();
        record.updated_at = Utc::now();
        if let Some(existing) = state.devices.get(&device.udid) {
            record.created_at = existing.created_at;
        }
        state.devices.insert(record.udid.clone(), record);
        Ok(())
    }

    async fn get_device(&self, udid: &str) -> DbResult<Device> {
        self.state
            .lock()
            .await
            .devices
            .get(udid)
            .cloned()
            .ok_or_else(|| DbError::not_found("Device", udid))
    }

    async fn list_devices(&self) -> DbResult<Vec<Device>> {
        Ok(self.state.lock().await.devices.values().cloned().collect())
    }

    async fn save_enrollment(&self, enrollment: &Enrollment) -> DbResult<()> {
        let mut state = self.state.lock().await;
        state
            .enrollments
            .insert(enrollment.storage_key().to_string(), enrollment.clone());
        Ok(())
    }
}

#[async_trait]
impl CommandStore for MemoryStore {
    async fn enqueue_commands(&self, commands: &[Command], devices: &[Device]) -> DbResult<()> {
        validate_command_batch(commands)?;
        for device in devices {
            validate_udid(&device.udid)?;
        }

        let mut state = self.state.lock().await;

        // Check before mutating: a rejected batch leaves nothing behind.
        if self.duplicate_policy == DuplicatePolicy::Reject {
            if let Some(existing) = commands.iter().find(|c| state.commands.contains_key(&c.uuid)) {
                warn!(command_uuid = %existing.uuid, "Rejecting duplicate command");
                return Err(DbError::DuplicateCommand {
                    command_uuid: existing.uuid.clone(),
                });
            }
        }

        let now = Utc::now();
        for command in commands {
            state.commands.insert(command.uuid.clone(), command.clone());

            for device in devices {
                let already_queued = state
                    .queues
                    .get(&device.udid)
                    .is_some_and(|q| q.iter().any(|e| e.command_uuid == command.uuid));
                if already_queued {
                    continue;
                }

                state.next_sequence += 1;
                let entry = QueueEntry {
                    id: state.next_sequence,
                    device_udid: device.udid.clone(),
                    command_uuid: command.uuid.clone(),
                    enqueued_at: now,
                };
                state.queues.entry(device.udid.clone()).or_default().push(entry);
            }
        }

        debug!(commands = commands.len(), devices = devices.len(), "Commands enqueued");
        Ok(())
    }

    async fn next_command(&self, udid: &str) -> DbResult<Option<Command>> {
        let state = self.state.lock().await;

        let Some(entry) = state
            .queues
            .get(udid)
            .and_then(|entries| self.first_entry(entries))
        else {
            return Ok(None);
        };

        match state.commands.get(&entry.command_uuid) {
            Some(command) => Ok(Some(command.clone())),
            None => Err(DbError::InconsistentState(format!(
                "couldn't find enqueued command {} for device {udid}",
                entry.command_uuid
            ))),
        }
    }

    async fn save_command_result(
        &self,
        udid: &str,
        command_uuid: &str,
        status: CommandStatus,
        raw: &[u8],
    ) -> DbResult<ResultOutcome> {
        validate_udid(udid)?;
        validate_command_uuid(command_uuid)?;

        let mut state = self.state.lock().await;

        let removed = match state.queues.get_mut(udid) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|e| e.command_uuid != command_uuid);
                entries.len() < before
            }
            None => false,
        };

        let key = (udid.to_string(), command_uuid.to_string());
        let result = CommandResult {
            device_udid: udid.to_string(),
            command_uuid: command_uuid.to_string(),
            status,
            raw: raw.to_vec(),
            recorded_at: Utc::now(),
        };

        if removed {
            state.results.insert(key, result);
            Ok(ResultOutcome::Resolved)
        } else {
            state.results.entry(key).or_insert(result);
            Ok(ResultOutcome::Unsolicited)
        }
    }

    async fn get_command_result(&self, udid: &str, command_uuid: &str) -> DbResult<Option<CommandResult>> {
        let key = (udid.to_string(), command_uuid.to_string());
        Ok(self.state.lock().await.results.get(&key).cloned())
    }

    async fn pending_count(&self, udid: &str) -> DbResult<i64> {
        let state = self.state.lock().await;
        Ok(state.queues.get(udid).map_or(0, |q| q.len() as i64))
    }
}
