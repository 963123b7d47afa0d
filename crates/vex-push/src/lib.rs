//! # vex-push: Push Dispatcher for Vex MDM
//!
//! Wakes devices up so they check in and collect their queued commands.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Push Dispatch                                    │
//! │                                                                         │
//! │  Commander (vex-server)                                                │
//! │       │  Notification::for_device(&device)                             │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  PushDispatcher (dispatcher.rs)                                  │  │
//! │  │  bounded fan-out, per-request timeout, cancellation              │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ Arc<dyn PushTransport>                  │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  ApnsClient (apns.rs)                                            │  │
//! │  │  HTTP/2 + client certificate, POST /3/device/{token}             │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`notification`] - `Notification` and its JSON payload
//! - [`transport`] - `PushTransport` trait
//! - [`apns`] - APNs implementation of the transport
//! - [`dispatcher`] - `PushDispatcher` fan-out
//! - [`error`] - `PushError`

pub mod apns;
pub mod dispatcher;
pub mod error;
pub mod notification;
pub mod transport;

pub use apns::{ApnsClient, ApnsConfig, APNS_PRODUCTION_URL};
pub use dispatcher::{
    DispatcherConfig, PushDispatcher, PushOutcomes, DEFAULT_MAX_CONCURRENCY, DEFAULT_REQUEST_TIMEOUT,
};
pub use error::{PushError, PushResult};
pub use notification::Notification;
pub use transport::PushTransport;
