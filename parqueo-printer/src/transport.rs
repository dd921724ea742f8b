//! Printer transports for sending ESC/POS data
//!
//! Supports:
//! - Network printers (raw TCP, conventionally port 9100)
//! - Serial printers (COM/tty paths, 9600 8N1)
//! - Windows spooler printers (via Win32 API)
//! - Direct USB printers (optional `usb` feature)

use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

/// Trait for printer transports
///
/// Object-safe so callers can hold `Box<dyn Printer>` resolved from a stored
/// connection descriptor.
#[async_trait]
pub trait Printer: Send + Sync {
    /// Send raw ESC/POS data to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Keywords that identify a receipt/thermal printer by its driver name
const THERMAL_KEYWORDS: [&str; 11] = [
    "thermal", "receipt", "tm-", "epson", "star", "citizen", "pos", "ticket", "tmu", "tsp",
    "térmica",
];

/// Heuristic check for thermal printers by name
///
/// Used to filter spooler printer listings down to receipt hardware.
pub fn is_thermal_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    THERMAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

// ============================================================================
// Network
// ============================================================================

/// Network printer (raw TCP)
///
/// Most thermal printers accept raw ESC/POS on TCP port 9100.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    host: String,
    port: u16,
    timeout: Duration,
}

impl NetworkPrinter {
    /// Create a new network printer
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: Duration::from_secs(5),
        }
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the printer address as `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl Printer for NetworkPrinter {
    #[instrument(skip(self, data), fields(addr = %self.addr(), data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let addr = self.addr();
        info!("Connecting to printer");

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", addr, e)))?;

        stream.write_all(data).await.map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;

        stream.flush().await?;

        info!("Print job sent successfully");
        Ok(())
    }

    #[instrument(skip(self), fields(addr = %self.addr()))]
    async fn is_online(&self) -> bool {
        let check_timeout = Duration::from_millis(500);

        match tokio::time::timeout(check_timeout, TcpStream::connect(self.addr())).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Printer offline");
                false
            }
            Err(_) => {
                warn!("Printer check timeout");
                false
            }
        }
    }
}

// ============================================================================
// Serial
// ============================================================================

/// Serial printer (COM port or tty device path)
///
/// Opens the port per job at 9600 8N1 with a short read timeout, which is
/// what Epson receipt models ship configured for.
#[derive(Debug, Clone)]
pub struct SerialPrinter {
    path: String,
    baud_rate: u32,
    timeout: Duration,
}

impl SerialPrinter {
    /// Create a serial printer for the given port path (e.g. `COM3`)
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            baud_rate: 9600,
            timeout: Duration::from_secs(1),
        }
    }

    /// Override the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Get the port path
    pub fn path(&self) -> &str {
        &self.path
    }

    fn open_port(
        path: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> PrintResult<Box<dyn serialport::SerialPort>> {
        serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| PrintError::Serial(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl Printer for SerialPrinter {
    #[instrument(skip(self, data), fields(path = %self.path, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        // serialport is synchronous, run in a blocking task
        let path = self.path.clone();
        let baud_rate = self.baud_rate;
        let timeout = self.timeout;
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || {
            use std::io::Write;

            let mut port = Self::open_port(&path, baud_rate, timeout)?;
            port.write_all(&data)?;
            port.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| PrintError::Serial(format!("Task join failed: {}", e)))?
    }

    #[instrument(skip(self), fields(path = %self.path))]
    async fn is_online(&self) -> bool {
        let path = self.path.clone();
        let baud_rate = self.baud_rate;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || Self::open_port(&path, baud_rate, timeout).is_ok())
            .await
            .unwrap_or(false)
    }
}

// ============================================================================
// Windows spooler
// ============================================================================

/// Windows spooler printer
///
/// Writes RAW documents through an installed printer driver.
#[cfg(windows)]
pub struct WindowsPrinter {
    name: String,
}

#[cfg(windows)]
impl WindowsPrinter {
    /// Create a printer with a specific spooler name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Get the printer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// List available printers (filters out virtual printers)
    pub fn list() -> PrintResult<Vec<String>> {
        use windows::Win32::Graphics::Printing::{
            EnumPrintersW, PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_INFO_5W,
        };
        use windows::core::PWSTR;

        unsafe {
            let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
            let mut needed: u32 = 0;
            let mut returned: u32 = 0;

            let _ = EnumPrintersW(flags, None, 5, None, &mut needed, &mut returned);

            if needed == 0 {
                return Ok(Vec::new());
            }

            let mut buf: Vec<u8> = vec![0; needed as usize];
            EnumPrintersW(
                flags,
                None,
                5,
                Some(buf.as_mut_slice()),
                &mut needed,
                &mut returned,
            )
            .map_err(|_| PrintError::WindowsPrinter("EnumPrintersW failed".to_string()))?;

            let ptr = buf.as_ptr() as *const PRINTER_INFO_5W;
            let slice = std::slice::from_raw_parts(ptr, returned as usize);

            let mut result: Vec<String> = Vec::new();
            for info in slice.iter() {
                if info.pPrinterName.is_null() {
                    continue;
                }
                let name = PWSTR(info.pPrinterName.0).to_string().unwrap_or_default();

                let port = if info.pPortName.is_null() {
                    String::new()
                } else {
                    PWSTR(info.pPortName.0).to_string().unwrap_or_default()
                };

                if !Self::is_virtual_port(&port) {
                    result.push(name);
                }
            }

            Ok(result)
        }
    }

    /// List printers whose driver name looks like receipt hardware
    pub fn list_thermal() -> PrintResult<Vec<String>> {
        Ok(Self::list()?
            .into_iter()
            .filter(|name| is_thermal_name(name))
            .collect())
    }

    /// Check if a port is a virtual printer port
    fn is_virtual_port(port: &str) -> bool {
        let p = port.to_lowercase();
        p == "file:"
            || p == "portprompt:"
            || p == "xpsport:"
            || p.starts_with("onenote")
            || p == "nul:"
            || p.starts_with("wfsport:")
    }

    /// Check if the named printer exists and is not flagged offline
    pub fn check_online(name: &str) -> PrintResult<bool> {
        use windows::Win32::Graphics::Printing::{
            ClosePrinter, GetPrinterW, OpenPrinterW, PRINTER_HANDLE, PRINTER_INFO_6,
            PRINTER_STATUS_OFFLINE,
        };
        use windows::core::PCWSTR;

        unsafe {
            let mut handle: PRINTER_HANDLE = PRINTER_HANDLE::default();
            let name_w = to_wide(name);

            OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None)
                .map_err(|_| PrintError::WindowsPrinter("OpenPrinterW failed".to_string()))?;

            let mut needed: u32 = 0;
            let _ = GetPrinterW(handle, 6, None, &mut needed);

            let mut online = true;
            if needed > 0 {
                let mut buf: Vec<u8> = vec![0; needed as usize];
                if GetPrinterW(handle, 6, Some(buf.as_mut_slice()), &mut needed).is_ok() {
                    let info = *(buf.as_ptr() as *const PRINTER_INFO_6);
                    if (info.dwStatus & PRINTER_STATUS_OFFLINE) != 0 {
                        online = false;
                    }
                }
            }

            let _ = ClosePrinter(handle);
            Ok(online)
        }
    }

    fn write_raw(&self, data: &[u8]) -> PrintResult<()> {
        use core::ffi::c_void;
        use windows::Win32::Graphics::Printing::{
            ClosePrinter, DOC_INFO_1W, EndDocPrinter, EndPagePrinter, OpenPrinterW, PRINTER_HANDLE,
            StartDocPrinterW, StartPagePrinter, WritePrinter,
        };
        use windows::core::{PCWSTR, PWSTR};

        unsafe {
            if !Self::check_online(&self.name).unwrap_or(true) {
                return Err(PrintError::Offline(self.name.clone()));
            }

            let mut handle: PRINTER_HANDLE = PRINTER_HANDLE::default();
            let name_w = to_wide(&self.name);

            OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None)
                .map_err(|_| PrintError::WindowsPrinter("OpenPrinterW failed".to_string()))?;

            let doc_name_w = to_wide("Ticket");
            let datatype_w = to_wide("RAW");
            let doc_info = DOC_INFO_1W {
                pDocName: PWSTR(doc_name_w.as_ptr() as *mut _),
                pOutputFile: PWSTR::null(),
                pDatatype: PWSTR(datatype_w.as_ptr() as *mut _),
            };

            if StartDocPrinterW(handle, 1, &doc_info as *const DOC_INFO_1W) == 0 {
                let _ = ClosePrinter(handle);
                return Err(PrintError::WindowsPrinter(
                    "StartDocPrinter failed".to_string(),
                ));
            }

            if !StartPagePrinter(handle).as_bool() {
                let _ = EndDocPrinter(handle);
                let _ = ClosePrinter(handle);
                return Err(PrintError::WindowsPrinter(
                    "StartPagePrinter failed".to_string(),
                ));
            }

            let mut written: u32 = 0;
            let ok = WritePrinter(
                handle,
                data.as_ptr() as *const c_void,
                data.len() as u32,
                &mut written,
            );

            let _ = EndPagePrinter(handle);
            let _ = EndDocPrinter(handle);
            let _ = ClosePrinter(handle);

            if !ok.as_bool() {
                return Err(PrintError::WindowsPrinter("WritePrinter failed".to_string()));
            }

            if written != data.len() as u32 {
                return Err(PrintError::WindowsPrinter("Incomplete write".to_string()));
            }

            Ok(())
        }
    }
}

#[cfg(windows)]
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[cfg(windows)]
#[async_trait]
impl Printer for WindowsPrinter {
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        // Win32 spooler calls are synchronous, run in a blocking task
        let name = self.name.clone();
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || {
            let printer = WindowsPrinter { name };
            printer.write_raw(&data)
        })
        .await
        .map_err(|e| PrintError::WindowsPrinter(format!("Task join failed: {}", e)))?
    }

    async fn is_online(&self) -> bool {
        Self::check_online(&self.name).unwrap_or(false)
    }
}

// ============================================================================
// Direct USB
// ============================================================================

/// Direct USB printer addressed by vendor/product id
///
/// Finds the first matching device, detaches any kernel driver, claims
/// interface 0 and writes to the first bulk-OUT endpoint.
#[cfg(feature = "usb")]
#[derive(Debug, Clone)]
pub struct UsbPrinter {
    vendor_id: u16,
    product_id: u16,
    timeout: Duration,
}

#[cfg(feature = "usb")]
impl UsbPrinter {
    /// Create a USB printer for the given vendor/product id pair
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            timeout: Duration::from_secs(5),
        }
    }

    /// Get the vendor/product id pair
    pub fn ids(&self) -> (u16, u16) {
        (self.vendor_id, self.product_id)
    }

    fn write_raw(vendor_id: u16, product_id: u16, timeout: Duration, data: &[u8]) -> PrintResult<()> {
        let context = libusb::Context::new()
            .map_err(|e| PrintError::Usb(format!("libusb context: {}", e)))?;
        let devices = context
            .devices()
            .map_err(|e| PrintError::Usb(format!("device enumeration: {}", e)))?;

        for device in devices.iter() {
            let descriptor = device
                .device_descriptor()
                .map_err(|e| PrintError::Usb(format!("device descriptor: {}", e)))?;
            if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                continue;
            }

            let config = device
                .active_config_descriptor()
                .map_err(|e| PrintError::Usb(format!("config descriptor: {}", e)))?;

            let mut endpoint: Option<u8> = None;
            for interface in config.interfaces() {
                for descriptor in interface.descriptors() {
                    for ep in descriptor.endpoint_descriptors() {
                        if endpoint.is_none()
                            && matches!(
                                (ep.transfer_type(), ep.direction()),
                                (libusb::TransferType::Bulk, libusb::Direction::Out)
                            )
                        {
                            endpoint = Some(ep.number());
                        }
                    }
                }
            }

            let endpoint = endpoint.ok_or_else(|| {
                PrintError::Usb(format!(
                    "no bulk-OUT endpoint on {:04x}:{:04x}",
                    vendor_id, product_id
                ))
            })?;

            let mut handle = device
                .open()
                .map_err(|e| PrintError::Usb(format!("open device: {}", e)))?;

            if handle.kernel_driver_active(0).unwrap_or(false) {
                handle
                    .detach_kernel_driver(0)
                    .map_err(|e| PrintError::Usb(format!("detach kernel driver: {}", e)))?;
            }
            handle
                .claim_interface(0)
                .map_err(|e| PrintError::Usb(format!("claim interface: {}", e)))?;

            handle
                .write_bulk(endpoint, data, timeout)
                .map_err(|e| PrintError::Usb(format!("bulk write: {}", e)))?;

            return Ok(());
        }

        Err(PrintError::Connection(format!(
            "no USB device {:04x}:{:04x}",
            vendor_id, product_id
        )))
    }

    fn probe(vendor_id: u16, product_id: u16) -> bool {
        let Ok(context) = libusb::Context::new() else {
            return false;
        };
        let Ok(devices) = context.devices() else {
            return false;
        };
        devices.iter().any(|d| {
            d.device_descriptor()
                .map(|desc| desc.vendor_id() == vendor_id && desc.product_id() == product_id)
                .unwrap_or(false)
        })
    }
}

#[cfg(feature = "usb")]
#[async_trait]
impl Printer for UsbPrinter {
    #[instrument(skip(self, data), fields(vid = self.vendor_id, pid = self.product_id))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let (vendor_id, product_id) = (self.vendor_id, self.product_id);
        let timeout = self.timeout;
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || Self::write_raw(vendor_id, product_id, timeout, &data))
            .await
            .map_err(|e| PrintError::Usb(format!("Task join failed: {}", e)))?
    }

    async fn is_online(&self) -> bool {
        let (vendor_id, product_id) = (self.vendor_id, self.product_id);
        tokio::task::spawn_blocking(move || Self::probe(vendor_id, product_id))
            .await
            .unwrap_or(false)
    }
}
