//! # Push Dispatcher
//!
//! Concurrent fan-out of wake-up notifications with a bounded number in
//! flight.
//!
//! ## Fan-out
//! ```text
//! push([n1, n2, n3, n4])
//!    │
//!    ├── spawn n1 ─┐
//!    ├── spawn n2 ─┤   Semaphore(max_concurrency) gates transport.send()
//!    ├── spawn n3 ─┤   each send bounded by request_timeout
//!    └── spawn n4 ─┘   CancellationToken aborts waiting and in-flight sends
//!    │
//!    ▼
//! join all ──► { token → Ok(()) | Err(PushError) }   one entry per token
//! ```
//!
//! `push` returns only after every notification has an outcome. A failing
//! notification never prevents the others from being sent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{PushError, PushResult};
use crate::notification::Notification;
use crate::transport::PushTransport;

/// Outcome of a fan-out, keyed by device token.
pub type PushOutcomes = HashMap<String, PushResult<()>>;

/// Default bound on notifications in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 64;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum notifications sent at the same time. Zero is treated as one.
    pub max_concurrency: usize,
    /// Timeout applied to each notification.
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Fans notifications out over a [`PushTransport`].
///
/// Cloning shares the transport, the concurrency bound and the cancellation
/// token.
#[derive(Clone)]
pub struct PushDispatcher {
    transport: Arc<dyn PushTransport>,
    semaphore: Arc<Semaphore>,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PushDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushDispatcher")
            .field("available_permits", &self.semaphore.available_permits())
            .field("request_timeout", &self.request_timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl PushDispatcher {
    pub fn new(transport: Arc<dyn PushTransport>, config: DispatcherConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            transport,
            semaphore: Arc::new(Semaphore::new(permits)),
            request_timeout: config.request_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancels all current and future fan-outs. Pending and in-flight sends
    /// resolve to [`PushError::Cancelled`].
    pub fn shutdown(&self) {
        info!("Cancelling push dispatch");
        self.cancel.cancel();
    }

    /// Sends every notification and collects one outcome per token.
    ///
    /// Repeated tokens are sent once.
    pub async fn push(&self, notifications: Vec<Notification>) -> PushOutcomes {
        let mut outcomes: PushOutcomes = HashMap::with_capacity(notifications.len());
        let mut tasks = JoinSet::new();

        for notification in notifications {
            if outcomes.contains_key(&notification.token) {
                debug!(token = %notification.token, "Skipping repeated push token");
                continue;
            }
            // Placeholder until the task reports back.
            outcomes.insert(
                notification.token.clone(),
                Err(PushError::Transport("push task did not complete".to_string())),
            );

            let transport = Arc::clone(&self.transport);
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = self.cancel.clone();
            let request_timeout = self.request_timeout;

            tasks.spawn(async move {
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(PushError::Cancelled),
                    result = send_one(transport, semaphore, request_timeout, &notification) => result,
                };
                (notification.token, result)
            });
        }

        let total = outcomes.len();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((token, result)) => {
                    if let Err(e) = &result {
                        warn!(token = %token, error = %e, "Push delivery failed");
                    }
                    outcomes.insert(token, result);
                }
                Err(e) => error!(error = %e, "Push task aborted"),
            }
        }

        let failed = outcomes.values().filter(|r| r.is_err()).count();
        info!(total, failed, "Push fan-out complete");

        outcomes
    }
}

async fn send_one(
    transport: Arc<dyn PushTransport>,
    semaphore: Arc<Semaphore>,
    request_timeout: Duration,
    notification: &Notification,
) -> PushResult<()> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| PushError::Cancelled)?;

    match tokio::time::timeout(request_timeout, transport.send(notification)).await {
        Ok(result) => result,
        Err(_) => Err(PushError::TimedOut),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
