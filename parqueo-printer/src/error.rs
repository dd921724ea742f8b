//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Printer is offline or unreachable
    #[error("Printer offline: {0}")]
    Offline(String),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Transport route not available on this platform or build
    #[error("Unsupported transport: {0}")]
    Unsupported(String),

    /// Windows-specific printing error
    #[cfg(windows)]
    #[error("Windows printer error: {0}")]
    WindowsPrinter(String),

    /// Direct USB error
    #[cfg(feature = "usb")]
    #[error("USB error: {0}")]
    Usb(String),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
