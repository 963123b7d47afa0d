//! # vex-db: Persistence for Vex MDM
//!
//! The device registry and the per-device command store, on SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Vex MDM Data Flow                                │
//! │                                                                         │
//! │  Check-in / admin request (vex-server)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     vex-db (THIS CRATE)                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ DeviceRegistry│    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ CommandStore  │───►│ device.rs     │    │  (embedded)  │  │   │
//! │  │   │  (store.rs)   │    │ enrollment.rs │    │ 001_init.sql │  │   │
//! │  │   │ MemoryStore   │    │ command.rs    │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ SqlitePool (pool.rs)          │   │
//! │  └────────────────────────────────┼────────────────────────────────┘   │
//! │                                   ▼                                     │
//! │                          SQLite database (WAL)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - SQL repositories
//! - [`store`] - `DeviceRegistry` / `CommandStore` traits
//! - [`memory`] - In-memory implementation of both traits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vex_db::{CommandStore, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("vex.db")).await?;
//! db.enqueue_commands(&commands, &devices).await?;
//! let next = db.next_command("UDID-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
pub use store::{CommandStore, DeviceRegistry};

pub use repository::command::CommandRepository;
pub use repository::device::DeviceRepository;
pub use repository::enrollment::EnrollmentRepository;
