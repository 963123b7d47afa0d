//! # APNs Client
//!
//! HTTP/2 client for the Apple Push Notification service, authenticated with
//! the MDM push certificate.
//!
//! ## Request Shape
//! ```text
//! POST {base_url}/3/device/{hex token}
//! content-type: application/json; charset=utf-8
//! apns-topic:   {topic}            (when configured)
//!
//! {"mdm":"<push magic>"}
//!
//! 1xx / 2xx   → Ok(())
//! otherwise   → PushError::Rejected { status, reason }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{PushError, PushResult};
use crate::notification::Notification;
use crate::transport::PushTransport;

/// Production APNs endpoint.
pub const APNS_PRODUCTION_URL: &str = "https://api.push.apple.com";

/// Settings for [`ApnsClient::from_config`].
#[derive(Debug, Clone)]
pub struct ApnsConfig {
    /// Scheme + host of the provider, without a trailing path.
    pub base_url: String,
    /// PEM-encoded client certificate.
    pub cert_path: PathBuf,
    /// PEM-encoded private key for the certificate.
    pub key_path: PathBuf,
    /// `apns-topic` header, normally the push certificate's topic.
    pub topic: Option<String>,
    /// Timeout for one request, connect included.
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ApnsErrorBody {
    reason: String,
}

/// APNs transport.
#[derive(Debug, Clone)]
pub struct ApnsClient {
    http: reqwest::Client,
    base_url: String,
    topic: Option<String>,
}

impl ApnsClient {
    /// Loads the client certificate and key and builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `PushError::Credentials` if either PEM file cannot be read or
    /// does not form a valid identity.
    pub fn from_config(config: &ApnsConfig) -> PushResult<Self> {
        let mut pem = std::fs::read(&config.cert_path).map_err(|e| {
            PushError::Credentials(format!(
                "Failed to read certificate {}: {e}",
                config.cert_path.display()
            ))
        })?;
        let key = std::fs::read(&config.key_path).map_err(|e| {
            PushError::Credentials(format!(
                "Failed to read private key {}: {e}",
                config.key_path.display()
            ))
        })?;
        pem.push(b'\n');
        pem.extend_from_slice(&key);

        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| PushError::Credentials(format!("Invalid push identity: {e}")))?;

        let http = reqwest::Client::builder()
            .identity(identity)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PushError::Credentials(e.to_string()))?;

        info!(
            base_url = %config.base_url,
            topic = ?config.topic,
            "APNs client initialized"
        );

        Ok(Self::with_client(http, &config.base_url, config.topic.clone()))
    }

    /// Wraps a pre-built HTTP client.
    pub fn with_client(http: reqwest::Client, base_url: &str, topic: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            topic,
        }
    }

    /// URL a notification for `token` is posted to.
    pub fn device_url(&self, token: &str) -> String {
        format!("{}/3/device/{}", self.base_url, token)
    }
}

/// Maps a provider response to a delivery outcome.
fn classify(status: StatusCode, body: &[u8]) -> PushResult<()> {
    if status.is_success() || status.is_informational() {
        return Ok(());
    }

    let reason = serde_json::from_slice::<ApnsErrorBody>(body)
        .map(|b| b.reason)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

    Err(PushError::Rejected {
        status: status.as_u16(),
        reason,
    })
}

#[async_trait]
impl PushTransport for ApnsClient {
    async fn send(&self, notification: &Notification) -> PushResult<()> {
        let payload = notification
            .payload()
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let mut request = self
            .http
            .post(self.device_url(&notification.token))
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(payload);
        if let Some(topic) = &self.topic {
            request = request.header("apns-topic", topic);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let outcome = classify(status, &body);
        match &outcome {
            Ok(()) => debug!(token = %notification.token, "Push accepted"),
            Err(e) => warn!(token = %notification.token, error = %e, "Push rejected"),
        }
        outcome
    }
}
