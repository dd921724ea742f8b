//! Utility helpers: logging setup and facility-timezone time handling

pub mod logger;
pub mod time;

pub use logger::init_logger;
pub use time::{format_ticket_time, now_millis};
