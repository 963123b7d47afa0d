//! # Notifications
//!
//! A wake-up notification carries no command. It only tells the device to
//! check in; the payload is `{"mdm":"<push magic>"}`.

use serde::Serialize;

use vex_core::Device;

/// One wake-up notification addressed to a device token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Device token as lowercase hex.
    pub token: String,
    /// Push magic the device registered with.
    pub push_magic: String,
}

#[derive(Debug, Serialize)]
struct MdmPayload<'a> {
    mdm: &'a str,
}

impl Notification {
    pub fn new(token: impl Into<String>, push_magic: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            push_magic: push_magic.into(),
        }
    }

    /// Builds the notification for a device, or `None` if the device has not
    /// registered a push token yet.
    ///
    /// A device with a token but no push magic is still addressed; the magic
    /// is then empty.
    pub fn for_device(device: &Device) -> Option<Self> {
        let token = device.token_hex()?;
        let push_magic = device.push_magic.clone().unwrap_or_default();
        Some(Self { token, push_magic })
    }

    /// JSON body sent to the push provider.
    pub fn payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&MdmPayload {
            mdm: &self.push_magic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_embeds_push_magic() {
        let n = Notification::new("abcd", "F00D-MAGIC");
        assert_eq!(n.payload().unwrap(), br#"{"mdm":"F00D-MAGIC"}"#.to_vec());
    }

    #[test]
    fn test_payload_escapes_magic() {
        let n = Notification::new("abcd", "a\"b");
        let json: serde_json::Value = serde_json::from_slice(&n.payload().unwrap()).unwrap();
        assert_eq!(json["mdm"], "a\"b");
    }

    #[test]
    fn test_for_device_requires_token() {
        let mut device = Device::new("UDID-1");
        device.push_magic = Some("magic".to_string());
        assert!(Notification::for_device(&device).is_none());

        device.token = Some(vec![0x0a, 0xff]);
        let n = Notification::for_device(&device).unwrap();
        assert_eq!(n.token, "0aff");
        assert_eq!(n.push_magic, "magic");
    }
}
