//! Ticket Printing Module
//!
//! Drives entry-ticket printing for the parking system:
//! - `types`: printer configurations, ticket designs, subjects, print jobs
//! - `storage`: redb-backed configuration store and print-job ledger
//! - `cache`: TTL settings cache (simulation mode, design overrides)
//! - `renderer`: subject + design -> ordered command sequence -> ESC/POS
//! - `transport`: stored configuration -> live device handle
//! - `service`: the orchestrator binding all of the above per print call

pub mod cache;
pub mod renderer;
pub mod service;
pub mod storage;
pub mod transport;
pub mod types;

pub use cache::{DESIGN_OVERRIDE_TTL, SIMULATION_MODE_TTL, SettingsCache};
pub use renderer::{Align, RenderError, TextSize, TicketOp, TicketRenderer, encode_ops};
pub use service::{JOB_RETENTION_DAYS, PreviewRequest, PrinterService};
pub use storage::{PrintStorage, StorageError, StorageResult};
pub use transport::{SystemTransportFactory, TransportFactory, parse_network_descriptor};
pub use types::*;
