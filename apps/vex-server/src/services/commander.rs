//! # Commander
//!
//! Queues commands for devices and wakes the devices up.
//!
//! ```text
//! enqueue(commands, devices)
//!    │
//!    ├── 1. CommandStore::enqueue_commands   durable, all or nothing
//!    │
//!    └── 2. PushDispatcher::push             one notification per device
//!              │                             with a push token
//!              ▼
//!         EnqueueReport { pushed, push_failed, no_push_token }
//! ```
//!
//! Push is best effort. Once step 1 succeeds the enqueue succeeds; failed
//! notifications are logged and listed in the report, never retried. A
//! device that misses its push still receives the command on its next
//! check-in.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use vex_core::{Command, DeclarativeManagementData, Device, DECLARATIVE_MANAGEMENT_REQUEST_TYPE};
use vex_db::CommandStore;
use vex_push::{Notification, PushDispatcher};

use crate::error::{ServerError, ServerResult};
use crate::wire;

/// What an enqueue did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueReport {
    pub command_uuids: Vec<String>,
    /// UDIDs the commands were queued for.
    pub queued_for: Vec<String>,
    /// Number of devices whose notification the push provider accepted.
    /// Devices sharing a token count once each.
    pub pushed: usize,
    /// UDIDs whose notification failed.
    pub push_failed: Vec<String>,
    /// UDIDs that have not sent a TokenUpdate yet.
    pub no_push_token: Vec<String>,
}

/// Enqueues commands and sends the wake-up pushes.
///
/// Without a dispatcher, commands are queued and no push is attempted.
#[derive(Clone)]
pub struct Commander {
    store: Arc<dyn CommandStore>,
    push: Option<PushDispatcher>,
}

impl Commander {
    pub fn new(store: Arc<dyn CommandStore>, push: Option<PushDispatcher>) -> Self {
        Commander { store, push }
    }

    pub fn push_enabled(&self) -> bool {
        self.push.is_some()
    }

    /// Cancels in-flight and future pushes.
    pub fn shutdown(&self) {
        if let Some(push) = &self.push {
            push.shutdown();
        }
    }

    /// Queues every command for every device, then pushes each device once.
    pub async fn enqueue(&self, commands: &[Command], devices: &[Device]) -> ServerResult<EnqueueReport> {
        self.store.enqueue_commands(commands, devices).await?;

        let mut report = EnqueueReport {
            command_uuids: commands.iter().map(|c| c.uuid.clone()).collect(),
            queued_for: devices.iter().map(|d| d.udid.clone()).collect(),
            ..Default::default()
        };
        info!(
            commands = commands.len(),
            devices = devices.len(),
            "Commands enqueued"
        );

        if commands.is_empty() || devices.is_empty() {
            return Ok(report);
        }

        let mut by_token: HashMap<String, Vec<String>> = HashMap::new();
        let mut notifications = Vec::with_capacity(devices.len());
        for device in devices {
            match Notification::for_device(device) {
                Some(notification) => {
                    by_token
                        .entry(notification.token.clone())
                        .or_default()
                        .push(device.udid.clone());
                    notifications.push(notification);
                }
                None => {
                    debug!(udid = %device.udid, "No push token, skipping push");
                    report.no_push_token.push(device.udid.clone());
                }
            }
        }

        let Some(push) = &self.push else {
            debug!(devices = notifications.len(), "Push disabled, devices will pick up commands on next check-in");
            return Ok(report);
        };
        if notifications.is_empty() {
            return Ok(report);
        }

        let outcomes = push.push(notifications).await;
        for (token, outcome) in outcomes {
            let udids = by_token.remove(&token).unwrap_or_default();
            match outcome {
                Ok(()) => report.pushed += udids.len(),
                Err(e) => {
                    for udid in udids {
                        warn!(udid = %udid, error = %e, "Wake-up push failed");
                        report.push_failed.push(udid);
                    }
                }
            }
        }
        report.push_failed.sort();

        info!(
            pushed = report.pushed,
            failed = report.push_failed.len(),
            without_token = report.no_push_token.len(),
            "Wake-up pushes sent"
        );
        Ok(report)
    }

    /// Wraps the sync tokens in a `DeclarativeManagement` command under a
    /// fresh UUID and enqueues it.
    pub async fn declarative_management(
        &self,
        data: &DeclarativeManagementData,
        devices: &[Device],
    ) -> ServerResult<EnqueueReport> {
        let json = data
            .to_json()
            .map_err(|e| ServerError::Internal(format!("Failed to encode declarative data: {e}")))?;
        let command_uuid = uuid::Uuid::new_v4().to_string();
        let command = wire::encode_command(&command_uuid, DECLARATIVE_MANAGEMENT_REQUEST_TYPE, Some(json))?;

        debug!(command_uuid = %command_uuid, devices = devices.len(), "Declarative management command built");
        self.enqueue(&[command], devices).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use vex_core::SyncToken;
    use vex_db::MemoryStore;
    use vex_push::{DispatcherConfig, PushError, PushResult, PushTransport};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Notification>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn send(&self, notification: &Notification) -> PushResult<()> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.reject.as_deref() == Some(notification.token.as_str()) {
                return Err(PushError::Rejected {
                    status: 410,
                    reason: "Unregistered".to_string(),
                });
            }
            Ok(())
        }
    }

    fn device(udid: &str, token: Option<&[u8]>) -> Device {
        let mut device = Device::new(udid);
        device.token = token.map(<[u8]>::to_vec);
        device.push_magic = Some(format!("magic-{udid}"));
        device
    }

    fn commander(transport: Arc<RecordingTransport>) -> (Commander, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = PushDispatcher::new(transport, DispatcherConfig::default());
        (Commander::new(store.clone(), Some(dispatcher)), store)
    }

    #[tokio::test]
    async fn test_enqueue_pushes_each_device_once() {
        let transport = Arc::new(RecordingTransport {
            reject: Some("04".to_string()),
            ..Default::default()
        });
        let (commander, store) = commander(transport.clone());
        let devices = vec![
            device("UDID-1", Some(&[0x01])),
            device("UDID-2", Some(&[0x02])),
            device("UDID-3", Some(&[0x03])),
            device("UDID-4", Some(&[0x04])),
            device("UDID-5", None),
        ];
        let commands = vec![
            Command::new("a", "DeviceInformation", b"<a>".to_vec()),
            Command::new("b", "ProfileList", b"<b>".to_vec()),
        ];

        let report = commander.enqueue(&commands, &devices).await.unwrap();

        assert_eq!(report.queued_for.len(), 5);
        assert_eq!(report.pushed, 3);
        assert_eq!(report.push_failed, vec!["UDID-4".to_string()]);
        assert_eq!(report.no_push_token, vec!["UDID-5".to_string()]);

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().any(|n| n.token == "01" && n.push_magic == "magic-UDID-1"));

        for d in &devices {
            assert_eq!(store.pending_count(&d.udid).await.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn test_shared_token_counts_every_device() {
        let transport = Arc::new(RecordingTransport::default());
        let (commander, _) = commander(transport.clone());
        let devices = vec![
            device("UDID-1", Some(&[0x0a])),
            device("UDID-2", Some(&[0x0a])),
            device("UDID-3", None),
        ];

        let report = commander
            .enqueue(&[Command::new("cmd-1", "InstallProfile", b"<x>".to_vec())], &devices)
            .await
            .unwrap();

        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert_eq!(report.pushed, 2);
        assert!(report.push_failed.is_empty());
        assert_eq!(
            report.pushed + report.push_failed.len() + report.no_push_token.len(),
            report.queued_for.len()
        );
    }

    #[tokio::test]
    async fn test_failed_enqueue_sends_no_push() {
        let transport = Arc::new(RecordingTransport::default());
        let (commander, _) = commander(transport.clone());
        let devices = vec![device("UDID-1", Some(&[0x01]))];
        let first = vec![Command::new("cmd-1", "InstallProfile", b"<x>".to_vec())];

        commander.enqueue(&first, &devices).await.unwrap();
        let err = commander.enqueue(&first, &devices).await.unwrap_err();

        assert!(matches!(err, ServerError::Conflict(_)));
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_push_disabled_still_queues() {
        let store = Arc::new(MemoryStore::new());
        let commander = Commander::new(store.clone(), None);
        assert!(!commander.push_enabled());

        let report = commander
            .enqueue(
                &[Command::new("cmd-1", "InstallProfile", b"<x>".to_vec())],
                &[device("UDID-1", Some(&[0x01]))],
            )
            .await
            .unwrap();

        assert_eq!(report.pushed, 0);
        assert!(report.push_failed.is_empty());
        assert_eq!(store.pending_count("UDID-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_declarative_management_wraps_sync_tokens() {
        let transport = Arc::new(RecordingTransport::default());
        let (commander, store) = commander(transport);
        let data = DeclarativeManagementData {
            sync_tokens: vec![SyncToken {
                timestamp: Utc::now(),
                declarations_token: "tok-1".to_string(),
            }],
        };

        let report = commander
            .declarative_management(&data, &[device("UDID-1", Some(&[0x01]))])
            .await
            .unwrap();

        assert_eq!(report.command_uuids.len(), 1);
        let command = store.next_command("UDID-1").await.unwrap().unwrap();
        assert_eq!(command.uuid, report.command_uuids[0]);
        assert_eq!(command.request_type, DECLARATIVE_MANAGEMENT_REQUEST_TYPE);

        let envelope: wire::CommandEnvelope = plist::from_bytes(&command.payload).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(envelope.command.data.as_deref().unwrap()).unwrap();
        assert_eq!(json["SyncTokens"][0]["DeclarationsToken"], "tok-1");
    }
}
