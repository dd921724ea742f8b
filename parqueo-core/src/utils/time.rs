//! Time helpers - facility-timezone formatting
//!
//! Tickets always show local facility time, never UTC. Storage keeps
//! `i64` Unix millis; formatting happens at the edge.

use chrono_tz::Tz;

/// Current time as Unix millis
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format a Unix-millis timestamp as `DD/MM/YYYY HH:MM` in the given timezone
pub fn format_ticket_time(millis: i64, tz: Tz) -> String {
    if let Some(dt) = chrono::DateTime::from_timestamp_millis(millis) {
        dt.with_timezone(&tz).format("%d/%m/%Y %H:%M").to_string()
    } else {
        "fecha desconocida".to_string()
    }
}
