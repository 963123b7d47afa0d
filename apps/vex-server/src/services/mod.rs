//! Service layer.
//!
//! - [`checkin_service`] - the device check-in state machine
//! - [`commander`] - command enqueue plus wake-up pushes

pub mod checkin_service;
pub mod commander;

pub use checkin_service::{CheckinResponse, CheckinService};
pub use commander::{Commander, EnqueueReport};
