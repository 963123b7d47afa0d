//! # Vex Server
//!
//! HTTP front of Vex MDM: the device check-in endpoint and the admin API
//! that queues commands.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Vex Server                                    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌────────────────────────┐│
//! │  │  routes        │  │  CheckinService    │  │  Commander             ││
//! │  │                │  │                    │  │                        ││
//! │  │ • PUT /mdm     │─►│ • Authenticate     │  │ • enqueue              ││
//! │  │ • /devices/..  │  │ • TokenUpdate      │  │ • declarative_mgmt     ││
//! │  │ • /health      │  │ • command reports  │  │                        ││
//! │  └───────┬────────┘  └─────────┬──────────┘  └───┬────────────┬───────┘│
//! │          │ wire (plist)        │                 │            │        │
//! │          │                     ▼                 ▼            ▼        │
//! │          │          ┌──────────────────────────────┐  ┌──────────────┐ │
//! │          └─────────►│  DeviceRegistry/CommandStore │  │PushDispatcher│ │
//! │                     │  (vex-db)                    │  │ (vex-push)   │ │
//! │                     └──────────────────────────────┘  └──────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config`]. Environment variables use the `VEX_` prefix with `__`
//! between section and key, e.g. `VEX_SERVER__PORT=9000`.

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod wire;

use std::sync::Arc;

use vex_db::{CommandStore, Database, DeviceRegistry};
use vex_push::PushDispatcher;

// Re-exports
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use routes::build_router;
pub use services::{CheckinService, Commander, EnqueueReport};

/// Shared application state.
pub struct AppState {
    pub registry: Arc<dyn DeviceRegistry>,
    pub checkin: CheckinService,
    pub commander: Commander,
    database: Option<Database>,
}

impl AppState {
    /// State backed by one SQLite database for both registry and store.
    pub fn new(database: Database, push: Option<PushDispatcher>) -> Self {
        let shared = Arc::new(database.clone());
        let mut state = Self::with_stores(shared.clone(), shared, push);
        state.database = Some(database);
        state
    }

    /// State over arbitrary registry and store implementations.
    pub fn with_stores(
        registry: Arc<dyn DeviceRegistry>,
        store: Arc<dyn CommandStore>,
        push: Option<PushDispatcher>,
    ) -> Self {
        AppState {
            checkin: CheckinService::new(registry.clone(), store.clone()),
            commander: Commander::new(store, push),
            registry,
            database: None,
        }
    }

    /// Whether the backing database answers. Stores without a database are
    /// always healthy.
    pub async fn is_healthy(&self) -> bool {
        match &self.database {
            Some(db) => db.health_check().await,
            None => true,
        }
    }
}
