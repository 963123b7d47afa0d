//! # Wire Format
//!
//! Devices and administrators both speak XML property lists.
//!
//! ## Check-in Body
//! ```text
//! <dict>
//!   <key>UDID</key>            <string>UDID-1</string>      enrollment
//!   <key>EnrollmentID</key>    <string>..</string>          (optional)
//!   <key>MessageType</key>     <string>TokenUpdate</string> check-in
//!   <key>Token</key>           <data>..</data>
//!   <key>PushMagic</key>       <string>..</string>
//! </dict>
//!
//! <dict>
//!   <key>UDID</key>            <string>UDID-1</string>
//!   <key>Status</key>          <string>Acknowledged</string> report
//!   <key>CommandUUID</key>     <string>cmd-1</string>        (no MessageType)
//! </dict>
//! ```
//!
//! All keys live in one flat dictionary. [`CheckinRequest`] mirrors it with
//! every field optional, and [`CheckinRequest::into_inbound`] decides what
//! kind of message it is. [`decode_inbound`] does both steps and keeps the
//! body on command reports.
//!
//! ## Command Body
//! ```text
//! <dict>
//!   <key>CommandUUID</key> <string>cmd-1</string>
//!   <key>Command</key>
//!   <dict>
//!     <key>RequestType</key> <string>InstallProfile</string>
//!     ...
//!   </dict>
//! </dict>
//! ```

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use vex_core::validation::{validate_command_uuid, validate_udid};
use vex_core::{
    Authenticate, CheckinMessage, Command, CommandReport, DeclarativeManagementRequest, Enrollment,
    ErrorChainEntry, InboundMessage, MessageType, SetBootstrapToken, TokenUpdate,
};

use crate::error::{ServerError, ServerResult};

// =============================================================================
// Check-in
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckinRequest {
    #[serde(rename = "UDID")]
    pub udid: Option<String>,
    #[serde(rename = "EnrollmentUserID")]
    pub enrollment_user_id: Option<String>,
    #[serde(rename = "UserID")]
    pub user_id: Option<String>,
    pub user_short_name: Option<String>,
    pub user_long_name: Option<String>,
    #[serde(rename = "EnrollmentID")]
    pub enrollment_id: Option<String>,
    pub topic: Option<String>,

    pub message_type: Option<String>,

    // Authenticate
    pub build_version: Option<String>,
    pub device_name: Option<String>,
    #[serde(rename = "IMEI")]
    pub imei: Option<String>,
    #[serde(rename = "MEID")]
    pub meid: Option<String>,
    pub model: Option<String>,
    pub model_name: Option<String>,
    #[serde(rename = "OSVersion")]
    pub os_version: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,

    // TokenUpdate / SetBootstrapToken
    #[serde(default)]
    pub awaiting_configuration: bool,
    #[serde(default)]
    pub not_on_console: bool,
    pub push_magic: Option<String>,
    pub token: Option<ByteBuf>,
    pub unlock_token: Option<ByteBuf>,
    pub bootstrap_token: Option<ByteBuf>,

    // DeclarativeManagement
    pub endpoint: Option<String>,
    pub data: Option<ByteBuf>,

    // Command report
    #[serde(rename = "CommandUUID")]
    pub command_uuid: Option<String>,
    pub status: Option<String>,
    pub request_type: Option<String>,
    #[serde(default)]
    pub error_chain: Vec<WireErrorChainEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireErrorChainEntry {
    #[serde(default)]
    pub error_code: i64,
    pub error_domain: Option<String>,
    pub localized_description: Option<String>,
    #[serde(rename = "USEnglishDescription")]
    pub us_english_description: Option<String>,
}

impl From<WireErrorChainEntry> for ErrorChainEntry {
    fn from(entry: WireErrorChainEntry) -> Self {
        ErrorChainEntry {
            error_code: entry.error_code,
            error_domain: entry.error_domain,
            localized_description: entry.localized_description,
            us_english_description: entry.us_english_description,
        }
    }
}

fn bytes(value: Option<ByteBuf>) -> Option<Vec<u8>> {
    value.map(ByteBuf::into_vec)
}

impl CheckinRequest {
    /// Parses an XML (or binary) property list body.
    pub fn decode(body: &[u8]) -> ServerResult<Self> {
        plist::from_bytes(body)
            .map_err(|e| ServerError::ProtocolViolation(format!("Undecodable check-in body: {e}")))
    }

    /// Splits the request into its enrollment envelope and typed message.
    ///
    /// A body carrying `MessageType` is a check-in message; one without is a
    /// command report, which carries `raw` along. User-channel enrollments
    /// without a UDID are keyed by their EnrollmentID.
    pub fn into_inbound(self, raw: &[u8]) -> ServerResult<(Enrollment, InboundMessage)> {
        let udid = match (self.udid.as_deref(), self.enrollment_id.as_deref()) {
            (Some(udid), _) if !udid.is_empty() => udid.to_string(),
            (_, Some(id)) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(ServerError::ProtocolViolation(
                    "Message carries neither UDID nor EnrollmentID".to_string(),
                ))
            }
        };
        validate_udid(&udid).map_err(|e| ServerError::ProtocolViolation(e.to_string()))?;

        let enrollment = Enrollment {
            udid,
            enrollment_user_id: self.enrollment_user_id,
            user_id: self.user_id,
            user_short_name: self.user_short_name,
            user_long_name: self.user_long_name,
            enrollment_id: self.enrollment_id,
            topic: self.topic,
        };

        let Some(tag) = self.message_type else {
            let status = self.status.ok_or_else(|| {
                ServerError::ProtocolViolation("Message has neither MessageType nor Status".to_string())
            })?;
            let report = CommandReport {
                command_uuid: self.command_uuid,
                status,
                request_type: self.request_type,
                error_chain: self.error_chain.into_iter().map(Into::into).collect(),
                raw: raw.to_vec(),
            };
            return Ok((enrollment, InboundMessage::Report(report)));
        };

        let message = match tag.parse::<MessageType>()? {
            MessageType::Authenticate => CheckinMessage::Authenticate(Authenticate {
                build_version: self.build_version,
                device_name: self.device_name,
                imei: self.imei,
                meid: self.meid,
                model: self.model,
                model_name: self.model_name,
                os_version: self.os_version,
                product_name: self.product_name,
                serial_number: self.serial_number,
            }),
            MessageType::TokenUpdate => CheckinMessage::TokenUpdate(TokenUpdate {
                awaiting_configuration: self.awaiting_configuration,
                not_on_console: self.not_on_console,
                push_magic: self.push_magic,
                token: bytes(self.token),
                unlock_token: bytes(self.unlock_token),
            }),
            MessageType::SetBootstrapToken => CheckinMessage::SetBootstrapToken(SetBootstrapToken {
                awaiting_configuration: self.awaiting_configuration,
                bootstrap_token: bytes(self.bootstrap_token),
            }),
            MessageType::CheckOut => CheckinMessage::CheckOut,
            MessageType::DeclarativeManagement => {
                CheckinMessage::DeclarativeManagement(DeclarativeManagementRequest {
                    endpoint: self.endpoint,
                    data: bytes(self.data),
                })
            }
        };

        Ok((enrollment, InboundMessage::Checkin(message)))
    }
}

/// Decodes a check-in body into its enrollment and message.
pub fn decode_inbound(body: &[u8]) -> ServerResult<(Enrollment, InboundMessage)> {
    CheckinRequest::decode(body)?.into_inbound(body)
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandEnvelope {
    #[serde(rename = "CommandUUID")]
    pub command_uuid: String,
    pub command: CommandBody,
}

/// The `Command` dictionary. Only `RequestType` and an optional `Data` blob
/// are modelled; other keys pass through untouched because the stored
/// payload is the original body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandBody {
    pub request_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ByteBuf>,
}

/// Decodes an administrator-submitted command, keeping `body` verbatim as
/// the payload.
pub fn decode_command(body: &[u8]) -> ServerResult<Command> {
    let envelope: CommandEnvelope = plist::from_bytes(body)
        .map_err(|e| ServerError::InvalidRequest(format!("Undecodable command body: {e}")))?;
    validate_command_uuid(&envelope.command_uuid)
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    if envelope.command.request_type.is_empty() {
        return Err(ServerError::InvalidRequest("RequestType is required".to_string()));
    }
    Ok(Command::new(
        envelope.command_uuid,
        envelope.command.request_type,
        body.to_vec(),
    ))
}

/// Encodes a command as an XML property list.
pub fn encode_command(command_uuid: &str, request_type: &str, data: Option<Vec<u8>>) -> ServerResult<Command> {
    let envelope = CommandEnvelope {
        command_uuid: command_uuid.to_string(),
        command: CommandBody {
            request_type: request_type.to_string(),
            data: data.map(ByteBuf::from),
        },
    };
    let mut payload = Vec::new();
    plist::to_writer_xml(&mut payload, &envelope)
        .map_err(|e| ServerError::Internal(format!("Failed to encode command: {e}")))?;
    Ok(Command::new(command_uuid, request_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_core::CommandStatus;

    fn plist_dict(entries: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
{entries}
</dict>
</plist>"#
        )
        .into_bytes()
    }

    #[test]
    fn test_decode_token_update() {
        let body = plist_dict(
            "<key>MessageType</key><string>TokenUpdate</string>
             <key>UDID</key><string>UDID-1</string>
             <key>Topic</key><string>com.apple.mgmt.test</string>
             <key>PushMagic</key><string>MAGIC</string>
             <key>Token</key><data>AAEC</data>
             <key>AwaitingConfiguration</key><true/>",
        );

        let (enrollment, message) = decode_inbound(&body).unwrap();

        assert_eq!(enrollment.udid, "UDID-1");
        assert_eq!(enrollment.topic.as_deref(), Some("com.apple.mgmt.test"));
        match message {
            InboundMessage::Checkin(CheckinMessage::TokenUpdate(update)) => {
                assert_eq!(update.token, Some(vec![0x00, 0x01, 0x02]));
                assert_eq!(update.push_magic.as_deref(), Some("MAGIC"));
                assert!(update.awaiting_configuration);
                assert!(update.unlock_token.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_authenticate() {
        let body = plist_dict(
            "<key>MessageType</key><string>Authenticate</string>
             <key>UDID</key><string>UDID-1</string>
             <key>OSVersion</key><string>17.4</string>
             <key>SerialNumber</key><string>C02XYZ</string>
             <key>IMEI</key><string>35 000000 000000 0</string>",
        );

        let (_, message) = decode_inbound(&body).unwrap();
        let InboundMessage::Checkin(CheckinMessage::Authenticate(auth)) = message else {
            panic!("expected Authenticate");
        };
        assert_eq!(auth.os_version.as_deref(), Some("17.4"));
        assert_eq!(auth.serial_number.as_deref(), Some("C02XYZ"));
        assert!(auth.imei.is_some());
    }

    #[test]
    fn test_body_without_message_type_is_report() {
        let body = plist_dict(
            "<key>UDID</key><string>UDID-1</string>
             <key>Status</key><string>Error</string>
             <key>CommandUUID</key><string>cmd-1</string>
             <key>ErrorChain</key>
             <array><dict>
               <key>ErrorCode</key><integer>12021</integer>
               <key>ErrorDomain</key><string>MCMDMErrorDomain</string>
             </dict></array>",
        );

        let (_, message) = decode_inbound(&body).unwrap();
        let InboundMessage::Report(report) = message else {
            panic!("expected a command report");
        };
        assert_eq!(report.parsed_status().unwrap(), CommandStatus::Error);
        assert_eq!(report.command_uuid.as_deref(), Some("cmd-1"));
        assert_eq!(report.error_chain[0].error_code, 12021);
        assert_eq!(report.raw, body);
    }

    #[test]
    fn test_user_channel_keyed_by_enrollment_id() {
        let body = plist_dict(
            "<key>EnrollmentID</key><string>ENR-7</string>
             <key>Status</key><string>Idle</string>",
        );
        let (enrollment, _) = decode_inbound(&body).unwrap();
        assert_eq!(enrollment.udid, "ENR-7");
        assert_eq!(enrollment.storage_key(), "ENR-7");
    }

    #[test]
    fn test_rejects_malformed_messages() {
        let unknown = plist_dict(
            "<key>MessageType</key><string>UserAuthenticate</string>
             <key>UDID</key><string>UDID-1</string>",
        );
        let err = decode_inbound(&unknown).unwrap_err();
        assert!(matches!(err, ServerError::ProtocolViolation(_)));

        let anonymous = plist_dict("<key>Status</key><string>Idle</string>");
        let err = decode_inbound(&anonymous).unwrap_err();
        assert!(matches!(err, ServerError::ProtocolViolation(_)));

        let empty = plist_dict("<key>UDID</key><string>UDID-1</string>");
        let err = decode_inbound(&empty).unwrap_err();
        assert!(matches!(err, ServerError::ProtocolViolation(_)));

        let err = decode_inbound(b"not a plist").unwrap_err();
        assert!(matches!(err, ServerError::ProtocolViolation(_)));
    }

    #[test]
    fn test_decode_command_keeps_body() {
        let body = plist_dict(
            "<key>CommandUUID</key><string>cmd-1</string>
             <key>Command</key>
             <dict>
               <key>RequestType</key><string>InstallProfile</string>
               <key>Payload</key><data>AAEC</data>
             </dict>",
        );

        let command = decode_command(&body).unwrap();
        assert_eq!(command.uuid, "cmd-1");
        assert_eq!(command.request_type, "InstallProfile");
        assert_eq!(command.payload, body);
    }

    #[test]
    fn test_decode_command_requires_uuid() {
        let body = plist_dict(
            "<key>CommandUUID</key><string></string>
             <key>Command</key>
             <dict><key>RequestType</key><string>DeviceInformation</string></dict>",
        );
        assert!(matches!(decode_command(&body), Err(ServerError::InvalidRequest(_))));
        assert!(matches!(decode_command(b"{}"), Err(ServerError::InvalidRequest(_))));
    }

    #[test]
    fn test_encoded_command_decodes_back() {
        let command = encode_command("dm-1", "DeclarativeManagement", Some(b"{}".to_vec())).unwrap();
        let envelope: CommandEnvelope = plist::from_bytes(&command.payload).unwrap();

        assert_eq!(envelope.command_uuid, "dm-1");
        assert_eq!(envelope.command.request_type, "DeclarativeManagement");
        assert_eq!(envelope.command.data.unwrap().into_vec(), b"{}".to_vec());
        assert!(std::str::from_utf8(&command.payload).unwrap().contains("<key>CommandUUID</key>"));
    }
}
