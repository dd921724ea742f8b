//! Device transport resolution
//!
//! Resolves a stored [`PrinterConfiguration`] into a live transport handle.
//! The factory is a trait so tests and previews can substitute a recording
//! transport for the physical ones.

use super::types::{ConnectionKind, PrinterConfiguration, UsbRoute};
use async_trait::async_trait;
use parqueo_printer::{NetworkPrinter, PrintError, Printer, SerialPrinter};
use tracing::info;

/// Raw-print TCP port nearly every thermal printer listens on
const DEFAULT_NETWORK_PORT: u16 = 9100;

/// Resolves printer configurations into transport handles
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, config: &PrinterConfiguration) -> Result<Box<dyn Printer>, PrintError>;
}

/// Default factory backed by the physical transports
#[derive(Debug, Clone, Default)]
pub struct SystemTransportFactory;

/// Parse a `host[:port]` descriptor, defaulting to the raw-print port
///
/// A trailing component that does not parse as a port is treated as part
/// of the host.
pub fn parse_network_descriptor(descriptor: &str) -> (String, u16) {
    match descriptor.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (descriptor.to_string(), DEFAULT_NETWORK_PORT),
        },
        _ => (descriptor.to_string(), DEFAULT_NETWORK_PORT),
    }
}

#[async_trait]
impl TransportFactory for SystemTransportFactory {
    async fn open(&self, config: &PrinterConfiguration) -> Result<Box<dyn Printer>, PrintError> {
        match config.kind {
            ConnectionKind::Network => {
                let (host, port) = parse_network_descriptor(&config.connection);
                info!(host = %host, port, "Opening network transport");
                Ok(Box::new(NetworkPrinter::new(&host, port)))
            }
            ConnectionKind::Serial => {
                info!(port = %config.connection, "Opening serial transport");
                Ok(Box::new(SerialPrinter::new(&config.connection)))
            }
            ConnectionKind::Usb => match config.usb_route {
                UsbRoute::Spooler => open_spooler(&config.connection),
                UsbRoute::Direct => open_direct_usb(config).await,
            },
        }
    }
}

#[cfg(windows)]
fn open_spooler(name: &str) -> Result<Box<dyn Printer>, PrintError> {
    info!(printer = %name, "Opening spooler transport");
    Ok(Box::new(parqueo_printer::WindowsPrinter::new(name)))
}

#[cfg(not(windows))]
fn open_spooler(name: &str) -> Result<Box<dyn Printer>, PrintError> {
    Err(PrintError::Unsupported(format!(
        "spooler printing for '{}' is only available on Windows",
        name
    )))
}

/// Try the configured vendor/product fallback list in priority order
#[cfg(feature = "usb")]
async fn open_direct_usb(config: &PrinterConfiguration) -> Result<Box<dyn Printer>, PrintError> {
    use parqueo_printer::UsbPrinter;

    for id in &config.usb_fallback_ids {
        let printer = UsbPrinter::new(id.vendor_id, id.product_id);
        if printer.is_online().await {
            info!(
                vid = id.vendor_id,
                pid = id.product_id,
                "Direct USB printer found"
            );
            return Ok(Box::new(printer));
        }
    }

    Err(PrintError::Connection(format!(
        "no USB printer matched {} known ids",
        config.usb_fallback_ids.len()
    )))
}

#[cfg(not(feature = "usb"))]
async fn open_direct_usb(_config: &PrinterConfiguration) -> Result<Box<dyn Printer>, PrintError> {
    Err(PrintError::Unsupported(
        "direct USB support not compiled in (enable the `usb` feature)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printing::types::PrinterConfigurationCreate;
    use crate::printing::storage::PrintStorage;

    #[test]
    fn test_parse_descriptor_with_port() {
        assert_eq!(
            parse_network_descriptor("192.168.1.50:9101"),
            ("192.168.1.50".to_string(), 9101)
        );
    }

    #[test]
    fn test_parse_descriptor_defaults_to_9100() {
        assert_eq!(
            parse_network_descriptor("10.0.0.5"),
            ("10.0.0.5".to_string(), 9100)
        );
    }

    #[test]
    fn test_parse_descriptor_hostname() {
        assert_eq!(
            parse_network_descriptor("impresora-entrada"),
            ("impresora-entrada".to_string(), 9100)
        );
    }

    #[test]
    fn test_parse_descriptor_bad_port_kept_as_host() {
        assert_eq!(
            parse_network_descriptor("10.0.0.5:abc"),
            ("10.0.0.5:abc".to_string(), 9100)
        );
    }

    #[tokio::test]
    async fn test_network_config_resolves() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let config = storage
            .insert_printer(
                PrinterConfigurationCreate::new(
                    "Entrada",
                    ConnectionKind::Network,
                    "10.0.0.5",
                )
                .active(),
            )
            .unwrap();

        let factory = SystemTransportFactory;
        assert!(factory.open(&config).await.is_ok());
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_spooler_unsupported_off_windows() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let config = storage
            .insert_printer(PrinterConfigurationCreate::new(
                "Recibo",
                ConnectionKind::Usb,
                "EPSON TM-T20 Receipt",
            ))
            .unwrap();

        let factory = SystemTransportFactory;
        let err = factory.open(&config).await.unwrap_err();
        assert!(matches!(err, PrintError::Unsupported(_)));
    }
}
