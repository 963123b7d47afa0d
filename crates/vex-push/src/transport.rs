//! # Push Transport
//!
//! The per-notification request/response contract. The dispatcher only knows
//! this trait; [`crate::apns::ApnsClient`] is the production implementation.

use async_trait::async_trait;

use crate::error::PushResult;
use crate::notification::Notification;

/// Sends one notification and reports whether the provider accepted it.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, notification: &Notification) -> PushResult<()>;
}
