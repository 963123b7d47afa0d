//! # Check-in Service
//!
//! The protocol state machine. Each call handles one inbound device message;
//! no state is kept between calls, everything lives in the registry and the
//! command store.
//!
//! ## Check-in Messages
//! ```text
//! Authenticate       ──► fresh Device (push fields cleared), save enrollment
//! TokenUpdate        ──► device must exist; replace token and push magic,
//!                        keep unlock token unless a new one is sent
//! SetBootstrapToken  ──► device must exist; set (or clear) bootstrap token
//! CheckOut           ──► acknowledged, nothing stored
//! DeclarativeManagement ► acknowledged, nothing stored
//! ```
//!
//! ## Command Reports
//! ```text
//! Status ─┬─ Idle ──────────────────────────────► next command | empty
//!         ├─ Acknowledged ─┐
//!         ├─ Error ────────┴─► save raw body ───► next command | empty
//!         ├─ NotNow ────────────────────────────► empty (queue untouched)
//!         └─ anything else ─────────────────────► ProtocolViolation
//! ```
//! The status is checked before anything is written, so a rejected report
//! never changes the store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use vex_core::{
    Authenticate, CheckinMessage, CommandReport, CommandStatus, Device, Enrollment, InboundMessage,
    ResultOutcome, SetBootstrapToken, TokenUpdate,
};
use vex_db::{CommandStore, DeviceRegistry};

use crate::error::ServerResult;

/// Body written back to the device: the next command's payload, or nothing.
pub type CheckinResponse = Option<Vec<u8>>;

/// Protocol dispatcher over an injected registry and command store.
#[derive(Clone)]
pub struct CheckinService {
    registry: Arc<dyn DeviceRegistry>,
    store: Arc<dyn CommandStore>,
}

impl CheckinService {
    pub fn new(registry: Arc<dyn DeviceRegistry>, store: Arc<dyn CommandStore>) -> Self {
        CheckinService { registry, store }
    }

    /// Handles one decoded device message.
    pub async fn handle(&self, enrollment: &Enrollment, message: InboundMessage) -> ServerResult<CheckinResponse> {
        match message {
            InboundMessage::Checkin(checkin) => {
                self.handle_checkin(enrollment, checkin).await?;
                Ok(None)
            }
            InboundMessage::Report(report) => self.handle_report(&enrollment.udid, report).await,
        }
    }

    async fn handle_checkin(&self, enrollment: &Enrollment, message: CheckinMessage) -> ServerResult<()> {
        let udid = enrollment.udid.as_str();
        debug!(udid = %udid, message_type = %message.message_type(), "Check-in");

        match message {
            CheckinMessage::Authenticate(auth) => self.authenticate(enrollment, auth).await,
            CheckinMessage::TokenUpdate(update) => self.token_update(udid, update).await,
            CheckinMessage::SetBootstrapToken(msg) => self.set_bootstrap_token(udid, msg).await,
            CheckinMessage::CheckOut => {
                info!(udid = %udid, "Device checked out");
                Ok(())
            }
            CheckinMessage::DeclarativeManagement(request) => {
                debug!(
                    udid = %udid,
                    endpoint = ?request.endpoint,
                    "Declarative management request acknowledged"
                );
                Ok(())
            }
        }
    }

    /// First contact, or re-enrollment: the record is rebuilt from the
    /// message and any push addressing from a previous enrollment is dropped.
    async fn authenticate(&self, enrollment: &Enrollment, auth: Authenticate) -> ServerResult<()> {
        let mut device = Device::new(enrollment.udid.clone());
        device.build_version = auth.build_version;
        device.name = auth.device_name;
        device.imei = auth.imei;
        device.meid = auth.meid;
        device.model = auth.model;
        device.model_name = auth.model_name;
        device.os_version = auth.os_version;
        device.product_name = auth.product_name;
        device.serial_number = auth.serial_number;

        self.registry.save_device(&device).await?;
        self.registry.save_enrollment(enrollment).await?;

        info!(
            udid = %device.udid,
            model = ?device.model,
            os_version = ?device.os_version,
            "Device authenticated"
        );
        Ok(())
    }

    async fn token_update(&self, udid: &str, update: TokenUpdate) -> ServerResult<()> {
        let mut device = self.registry.get_device(udid).await?;

        device.token = update.token;
        device.push_magic = update.push_magic;
        // Only the first TokenUpdate of an enrollment carries the unlock token.
        if update.unlock_token.is_some() {
            device.unlock_token = update.unlock_token;
        }

        self.registry.save_device(&device).await?;

        info!(
            udid = %udid,
            push_addressable = device.is_push_addressable(),
            awaiting_configuration = update.awaiting_configuration,
            "Token updated"
        );
        Ok(())
    }

    async fn set_bootstrap_token(&self, udid: &str, msg: SetBootstrapToken) -> ServerResult<()> {
        let mut device = self.registry.get_device(udid).await?;
        device.bootstrap_token = msg.bootstrap_token.filter(|t| !t.is_empty());
        self.registry.save_device(&device).await?;

        info!(udid = %udid, cleared = device.bootstrap_token.is_none(), "Bootstrap token set");
        Ok(())
    }

    async fn handle_report(&self, udid: &str, report: CommandReport) -> ServerResult<CheckinResponse> {
        let status = report.parsed_status()?;

        if status == CommandStatus::NotNow {
            debug!(udid = %udid, command_uuid = ?report.command_uuid, "Device deferred command");
            return Ok(None);
        }

        if status.is_terminal() {
            let command_uuid = report.required_command_uuid()?;
            let outcome = self
                .store
                .save_command_result(udid, command_uuid, status, &report.raw)
                .await?;

            match outcome {
                ResultOutcome::Resolved => {
                    info!(udid = %udid, command_uuid = %command_uuid, status = %status, "Command result recorded");
                }
                ResultOutcome::Unsolicited => {
                    warn!(
                        udid = %udid,
                        command_uuid = %command_uuid,
                        status = %status,
                        "Result for a command that was not outstanding"
                    );
                }
            }
            if status == CommandStatus::Error {
                for entry in &report.error_chain {
                    warn!(
                        udid = %udid,
                        command_uuid = %command_uuid,
                        error_code = entry.error_code,
                        error_domain = ?entry.error_domain,
                        description = ?entry.us_english_description,
                        "Command failed on device"
                    );
                }
            }
        } else {
            debug!(udid = %udid, "Device idle");
        }

        let next = self.store.next_command(udid).await?;
        if let Some(command) = &next {
            info!(udid = %udid, command_uuid = %command.uuid, request_type = %command.request_type, "Delivering command");
        }
        Ok(next.map(|command| command.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_core::{Command, ErrorChainEntry};
    use vex_db::MemoryStore;

    use crate::error::ServerError;

    fn service() -> (CheckinService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (CheckinService::new(store.clone(), store.clone()), store)
    }

    fn report(status: &str, uuid: Option<&str>) -> InboundMessage {
        InboundMessage::Report(CommandReport {
            command_uuid: uuid.map(str::to_string),
            status: status.to_string(),
            ..Default::default()
        })
    }

    async fn authenticate(service: &CheckinService, udid: &str) {
        let message = InboundMessage::Checkin(CheckinMessage::Authenticate(Authenticate {
            model: Some("iPhone15,2".to_string()),
            ..Default::default()
        }));
        service.handle(&Enrollment::for_device(udid), message).await.unwrap();
    }

    async fn token_update(service: &CheckinService, udid: &str) -> ServerResult<CheckinResponse> {
        let message = InboundMessage::Checkin(CheckinMessage::TokenUpdate(TokenUpdate {
            push_magic: Some("MAGIC".to_string()),
            token: Some(vec![0xaa, 0xbb]),
            unlock_token: Some(vec![0x01]),
            ..Default::default()
        }));
        service.handle(&Enrollment::for_device(udid), message).await
    }

    #[tokio::test]
    async fn test_authenticate_then_token_update() {
        let (service, store) = service();
        authenticate(&service, "UDID-1").await;

        let device = store.get_device("UDID-1").await.unwrap();
        assert!(!device.is_push_addressable());
        assert_eq!(device.model.as_deref(), Some("iPhone15,2"));
        assert!(store.enrollment("UDID-1").await.is_some());

        token_update(&service, "UDID-1").await.unwrap();
        let device = store.get_device("UDID-1").await.unwrap();
        assert_eq!(device.token_hex().as_deref(), Some("aabb"));
        assert_eq!(device.push_magic.as_deref(), Some("MAGIC"));
        assert_eq!(device.unlock_token, Some(vec![0x01]));
    }

    #[tokio::test]
    async fn test_token_update_replaces_push_fields() {
        let (service, store) = service();
        authenticate(&service, "UDID-1").await;
        token_update(&service, "UDID-1").await.unwrap();

        let message = InboundMessage::Checkin(CheckinMessage::TokenUpdate(TokenUpdate {
            token: Some(vec![0xcc]),
            ..Default::default()
        }));
        service.handle(&Enrollment::for_device("UDID-1"), message).await.unwrap();

        let device = store.get_device("UDID-1").await.unwrap();
        assert_eq!(device.token_hex().as_deref(), Some("cc"));
        assert!(device.push_magic.is_none());
        assert_eq!(device.unlock_token, Some(vec![0x01]));
    }

    #[tokio::test]
    async fn test_reauthenticate_clears_push_credentials() {
        let (service, store) = service();
        authenticate(&service, "UDID-1").await;
        token_update(&service, "UDID-1").await.unwrap();

        authenticate(&service, "UDID-1").await;

        let device = store.get_device("UDID-1").await.unwrap();
        assert!(device.token.is_none());
        assert!(device.push_magic.is_none());
        assert!(device.unlock_token.is_none());
    }

    #[tokio::test]
    async fn test_token_update_requires_device() {
        let (service, _) = service();
        let err = token_update(&service, "UDID-404").await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_token_set_and_cleared() {
        let (service, store) = service();
        authenticate(&service, "UDID-1").await;
        let enrollment = Enrollment::for_device("UDID-1");

        let set = InboundMessage::Checkin(CheckinMessage::SetBootstrapToken(SetBootstrapToken {
            bootstrap_token: Some(vec![0x42]),
            ..Default::default()
        }));
        service.handle(&enrollment, set).await.unwrap();
        assert_eq!(store.get_device("UDID-1").await.unwrap().bootstrap_token, Some(vec![0x42]));

        let clear = InboundMessage::Checkin(CheckinMessage::SetBootstrapToken(SetBootstrapToken {
            bootstrap_token: Some(Vec::new()),
            ..Default::default()
        }));
        service.handle(&enrollment, clear).await.unwrap();
        assert!(store.get_device("UDID-1").await.unwrap().bootstrap_token.is_none());
    }

    #[tokio::test]
    async fn test_checkout_stores_nothing() {
        let (service, store) = service();
        let response = service
            .handle(&Enrollment::for_device("UDID-1"), InboundMessage::Checkin(CheckinMessage::CheckOut))
            .await
            .unwrap();
        assert!(response.is_none());
        assert!(store.list_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_idle_ack_idle_converges() {
        let (service, store) = service();
        let enrollment = Enrollment::for_device("UDID-1");
        authenticate(&service, "UDID-1").await;
        let device = store.get_device("UDID-1").await.unwrap();
        store
            .enqueue_commands(&[Command::new("cmd-1", "InstallProfile", b"<cmd-1>".to_vec())], &[device])
            .await
            .unwrap();

        let response = service.handle(&enrollment, report("Idle", None)).await.unwrap();
        assert_eq!(response, Some(b"<cmd-1>".to_vec()));

        let response = service
            .handle(&enrollment, report("Acknowledged", Some("cmd-1")))
            .await
            .unwrap();
        assert!(response.is_none());

        assert!(store.next_command("UDID-1").await.unwrap().is_none());
        let result = store.get_command_result("UDID-1", "cmd-1").await.unwrap().unwrap();
        assert_eq!(result.status, CommandStatus::Acknowledged);

        let response = service.handle(&enrollment, report("Idle", None)).await.unwrap();
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_error_report_offers_next_command() {
        let (service, store) = service();
        let enrollment = Enrollment::for_device("UDID-1");
        authenticate(&service, "UDID-1").await;
        let device = store.get_device("UDID-1").await.unwrap();
        store
            .enqueue_commands(
                &[
                    Command::new("a", "DeviceInformation", b"<a>".to_vec()),
                    Command::new("b", "ProfileList", b"<b>".to_vec()),
                ],
                &[device],
            )
            .await
            .unwrap();

        let message = InboundMessage::Report(CommandReport {
            command_uuid: Some("a".to_string()),
            status: "Error".to_string(),
            error_chain: vec![ErrorChainEntry {
                error_code: 12021,
                ..Default::default()
            }],
            raw: b"<report a>".to_vec(),
            ..Default::default()
        });
        let response = service.handle(&enrollment, message).await.unwrap();

        assert_eq!(response, Some(b"<b>".to_vec()));
        let result = store.get_command_result("UDID-1", "a").await.unwrap().unwrap();
        assert_eq!(result.status, CommandStatus::Error);
        assert_eq!(result.raw, b"<report a>".to_vec());
    }

    #[tokio::test]
    async fn test_not_now_leaves_queue_alone() {
        let (service, store) = service();
        let enrollment = Enrollment::for_device("UDID-1");
        authenticate(&service, "UDID-1").await;
        let device = store.get_device("UDID-1").await.unwrap();
        store
            .enqueue_commands(&[Command::new("cmd-1", "InstallProfile", b"<cmd-1>".to_vec())], &[device])
            .await
            .unwrap();

        let response = service
            .handle(&enrollment, report("NotNow", Some("cmd-1")))
            .await
            .unwrap();

        assert!(response.is_none());
        assert_eq!(store.pending_count("UDID-1").await.unwrap(), 1);
        assert!(store.get_command_result("UDID-1", "cmd-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_status_changes_nothing() {
        let (service, store) = service();
        let enrollment = Enrollment::for_device("UDID-1");
        authenticate(&service, "UDID-1").await;
        let device = store.get_device("UDID-1").await.unwrap();
        store
            .enqueue_commands(&[Command::new("cmd-1", "InstallProfile", b"<cmd-1>".to_vec())], &[device])
            .await
            .unwrap();

        let err = service
            .handle(&enrollment, report("Exploded", Some("cmd-1")))
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::ProtocolViolation(_)));
        assert_eq!(store.pending_count("UDID-1").await.unwrap(), 1);
        assert!(store.get_command_result("UDID-1", "cmd-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acknowledged_without_uuid_rejected() {
        let (service, _) = service();
        let err = service
            .handle(&Enrollment::for_device("UDID-1"), report("Acknowledged", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_inconsistent_queue_surfaces() {
        let (service, store) = service();
        let enrollment = Enrollment::for_device("UDID-1");
        authenticate(&service, "UDID-1").await;
        let device = store.get_device("UDID-1").await.unwrap();
        store
            .enqueue_commands(&[Command::new("cmd-1", "InstallProfile", b"<cmd-1>".to_vec())], &[device])
            .await
            .unwrap();
        store.remove_command_body("cmd-1").await;

        let err = service.handle(&enrollment, report("Idle", None)).await.unwrap_err();
        assert!(matches!(err, ServerError::InconsistentState(_)));
    }
}
