//! # Repository Module
//!
//! SQLite repositories behind the device registry and the command store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database (pool.rs)                                                     │
//! │   ├── devices()      ──► DeviceRepository                              │
//! │   │                       get_by_udid / save / list / count            │
//! │   ├── enrollments()  ──► EnrollmentRepository                          │
//! │   │                       save / get_by_key                            │
//! │   └── commands()     ──► CommandRepository                             │
//! │                           enqueue / next_for_device / save_result      │
//! │                           get_result / get_command / count_pending     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The repositories speak SQL. The [`crate::store`] traits are what the rest
//! of the workspace programs against.

pub mod command;
pub mod device;
pub mod enrollment;
