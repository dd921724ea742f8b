//! Parqueo core - ticket printing subsystem for the parking system
//!
//! # Architecture overview
//!
//! This crate owns everything between "print a ticket for this visitor" and
//! the bytes leaving for the device:
//!
//! - **Printing** (`printing`): renderer, transport resolution, configuration
//!   store, print-job ledger and the orchestrating [`PrinterService`]
//! - **Configuration** (`config`): environment-driven runtime settings
//! - **Utilities** (`utils`): logging setup, facility-timezone time helpers
//!
//! The web layer, authentication and visitor CRUD live outside this crate;
//! callers hand the service a [`printing::TicketSubject`] and get a boolean
//! plus an auditable job record back.
//!
//! # Module structure
//!
//! ```text
//! parqueo-core/src/
//! ├── config.rs      # env configuration
//! ├── printing/      # renderer, transports, storage, cache, service
//! └── utils/         # logger, time helpers
//! ```

pub mod config;
pub mod printing;
pub mod utils;

pub use config::Config;
pub use printing::PrinterService;
