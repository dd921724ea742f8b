//! Runtime configuration for the printing subsystem
//!
//! # Environment variables
//!
//! All settings can be overridden through environment variables
//! (a `.env` file is honored):
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | PARQUEO_DATA_DIR | ./data | Directory holding the embedded database |
//! | PARQUEO_TIMEZONE | America/Bogota | Facility timezone for ticket timestamps |
//! | PARQUEO_PAPER_WIDTH_MM | 80 | Default paper width for new printers |
//! | PARQUEO_CHARS_PER_LINE | 48 | Default characters per line |
//! | ENVIRONMENT | development | Runtime environment name |

use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the embedded database
    pub data_dir: String,
    /// Facility timezone, used for every timestamp printed on a ticket
    pub timezone: Tz,
    /// Default paper width (mm) for new printer configurations
    pub paper_width_mm: u32,
    /// Default characters per line for new printer configurations
    pub chars_per_line: usize,
    /// Runtime environment: development | staging | production
    pub environment: String,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Unset variables fall back to their defaults; an unparseable
    /// timezone falls back to the facility default with a warning.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let timezone = std::env::var("PARQUEO_TIMEZONE")
            .ok()
            .and_then(|name| match name.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(_) => {
                    tracing::warn!(timezone = %name, "Unknown timezone, using America/Bogota");
                    None
                }
            })
            .unwrap_or(chrono_tz::America::Bogota);

        Self {
            data_dir: std::env::var("PARQUEO_DATA_DIR").unwrap_or_else(|_| "./data".into()),
            timezone,
            paper_width_mm: std::env::var("PARQUEO_PAPER_WIDTH_MM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(80),
            chars_per_line: std::env::var("PARQUEO_CHARS_PER_LINE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(48),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            timezone: chrono_tz::America::Bogota,
            paper_width_mm: 80,
            chars_per_line: 48,
            environment: "development".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timezone, chrono_tz::America::Bogota);
        assert_eq!(config.paper_width_mm, 80);
        assert_eq!(config.chars_per_line, 48);
    }
}
