//! # parqueo-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building
//! - CP1252 encoding for Spanish receipt text
//! - Network printing (raw TCP, conventionally port 9100)
//! - Serial printing (9600 8N1)
//! - Windows spooler printing
//! - Direct USB printing (optional `usb` feature)
//! - QR/logo raster conversion
//!
//! Business logic (WHAT to print) stays in application code: ticket
//! rendering, job records and printer configuration live in `parqueo-core`.
//!
//! ## Example
//!
//! ```ignore
//! use parqueo_printer::{EscPosBuilder, NetworkPrinter, Printer};
//!
//! // Build ESC/POS content
//! let mut builder = EscPosBuilder::new(48);
//! builder.center();
//! builder.double_size();
//! builder.line("SISTEMA DE PARKING");
//! builder.reset_size();
//! builder.sep_double();
//! builder.left();
//! builder.line("Matrícula: ABC-123");
//! builder.cut();
//!
//! // Send to a network printer
//! let printer = NetworkPrinter::new("192.168.1.100", 9100);
//! printer.print(&builder.build()).await?;
//! ```

mod encoding;
mod error;
mod escpos;
mod transport;

// Re-exports
pub use encoding::{convert_to_cp1252, cp1252_width, pad_cp1252, truncate_cp1252};
pub use error::{PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use transport::{NetworkPrinter, Printer, SerialPrinter, is_thermal_name};

#[cfg(windows)]
pub use transport::WindowsPrinter;

#[cfg(feature = "usb")]
pub use transport::UsbPrinter;
