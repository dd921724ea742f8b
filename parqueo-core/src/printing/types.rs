//! Ticket printing types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Content-type tag for regular entry tickets
pub const CONTENT_QR_CODE: &str = "QR_CODE";
/// Content-type tag for design preview tickets
pub const CONTENT_PREVIEW: &str = "PREVIEW";

/// Physical connection kind for a configured printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionKind {
    Usb,
    Serial,
    Network,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Usb => "USB",
            ConnectionKind::Serial => "SERIAL",
            ConnectionKind::Network => "NETWORK",
        }
    }
}

/// How a USB-kind configuration reaches the device
///
/// Stored explicitly instead of sniffing the connection descriptor for
/// driver-name markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsbRoute {
    /// Descriptor names an installed spooler printer
    #[default]
    Spooler,
    /// Raw USB access through the vendor/product fallback list
    Direct,
}

/// USB vendor/product id pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Default direct-USB fallback list, tried in order: Epson M244A, then the
/// alternate id newer Epson receipt firmware enumerates with.
pub fn default_usb_fallback_ids() -> Vec<UsbDeviceId> {
    vec![
        UsbDeviceId {
            vendor_id: 0x04b8,
            product_id: 0x0202,
        },
        UsbDeviceId {
            vendor_id: 0x04b8,
            product_id: 0x0e15,
        },
    ]
}

pub(crate) fn default_paper_width() -> u32 {
    80
}

pub(crate) fn default_chars_per_line() -> usize {
    48
}

/// One row per known physical printer
///
/// The connection descriptor is free text whose meaning depends on `kind`:
/// spooler printer name for USB, COM/tty path for SERIAL, `host[:port]`
/// for NETWORK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfiguration {
    pub id: String,
    pub name: String,
    pub model: String,
    pub kind: ConnectionKind,
    pub connection: String,
    #[serde(default)]
    pub usb_route: UsbRoute,
    #[serde(default = "default_usb_fallback_ids")]
    pub usb_fallback_ids: Vec<UsbDeviceId>,
    pub is_active: bool,
    #[serde(default = "default_paper_width")]
    pub paper_width_mm: u32,
    #[serde(default = "default_chars_per_line")]
    pub chars_per_line: usize,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Payload for registering a new printer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfigurationCreate {
    pub name: String,
    pub model: Option<String>,
    pub kind: ConnectionKind,
    pub connection: String,
    pub usb_route: Option<UsbRoute>,
    pub usb_fallback_ids: Option<Vec<UsbDeviceId>>,
    pub paper_width_mm: Option<u32>,
    pub chars_per_line: Option<usize>,
    /// Activate on creation, deactivating every other configuration
    pub set_active: bool,
}

impl PrinterConfigurationCreate {
    pub fn new(name: &str, kind: ConnectionKind, connection: &str) -> Self {
        Self {
            name: name.to_string(),
            model: None,
            kind,
            connection: connection.to_string(),
            usb_route: None,
            usb_fallback_ids: None,
            paper_width_mm: None,
            chars_per_line: None,
            set_active: false,
        }
    }

    pub fn active(mut self) -> Self {
        self.set_active = true;
        self
    }
}

/// Ticket fonts the design UI offers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketFont {
    #[default]
    Courier,
    Arial,
    Times,
}

/// What to do when an optional ticket section fails to render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionPolicy {
    /// Omit the section and keep printing (never emit a partial QR)
    #[default]
    Skip,
    /// Fail the whole ticket
    Abort,
}

/// Visual/textual template for tickets
///
/// At most one row is active; saving an active design deactivates the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDesign {
    pub id: String,
    pub name: String,
    pub font: TicketFont,
    pub font_size: u32,
    pub ticket_width_mm: u32,
    pub show_header: bool,
    pub show_date: bool,
    pub show_qr: bool,
    pub show_footer: bool,
    pub header_text: String,
    pub footer_text: String,
    #[serde(default)]
    pub on_qr_error: SectionPolicy,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Default for TicketDesign {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: "Configuración por defecto".to_string(),
            font: TicketFont::Courier,
            font_size: 12,
            ticket_width_mm: 80,
            show_header: true,
            show_date: true,
            show_qr: true,
            show_footer: true,
            header_text: "SISTEMA DE PARKING\nControl de Acceso".to_string(),
            footer_text: "Conserve este ticket\nGracias por su visita".to_string(),
            on_qr_error: SectionPolicy::Skip,
            is_active: false,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Partial design, merged over a base design
///
/// Every absent field falls back to the base. Used for short-lived preview
/// overrides and for design-form submissions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketDesignPatch {
    pub font: Option<TicketFont>,
    pub font_size: Option<u32>,
    pub ticket_width_mm: Option<u32>,
    pub show_header: Option<bool>,
    pub show_date: Option<bool>,
    pub show_qr: Option<bool>,
    pub show_footer: Option<bool>,
    pub header_text: Option<String>,
    pub footer_text: Option<String>,
    pub on_qr_error: Option<SectionPolicy>,
}

impl TicketDesignPatch {
    /// Merge this patch over a base design
    pub fn apply_to(&self, base: &TicketDesign) -> TicketDesign {
        TicketDesign {
            id: base.id.clone(),
            name: base.name.clone(),
            font: self.font.unwrap_or(base.font),
            font_size: self.font_size.unwrap_or(base.font_size),
            ticket_width_mm: self.ticket_width_mm.unwrap_or(base.ticket_width_mm),
            show_header: self.show_header.unwrap_or(base.show_header),
            show_date: self.show_date.unwrap_or(base.show_date),
            show_qr: self.show_qr.unwrap_or(base.show_qr),
            show_footer: self.show_footer.unwrap_or(base.show_footer),
            header_text: self
                .header_text
                .clone()
                .unwrap_or_else(|| base.header_text.clone()),
            footer_text: self
                .footer_text
                .clone()
                .unwrap_or_else(|| base.footer_text.clone()),
            on_qr_error: self.on_qr_error.unwrap_or(base.on_qr_error),
            is_active: base.is_active,
            created_at: base.created_at,
            updated_at: base.updated_at,
        }
    }
}

/// Vehicle categories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    #[default]
    Carro,
    Moto,
    Otro,
}

impl VehicleType {
    /// Display label as printed on tickets
    pub fn label(&self) -> &'static str {
        match self {
            VehicleType::Carro => "Carro",
            VehicleType::Moto => "Moto",
            VehicleType::Otro => "Otro",
        }
    }
}

/// The visitor/vehicle record a ticket is printed for
///
/// Supplied by the registration side; the printing subsystem only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketSubject {
    pub id: i64,
    pub cedula: Option<String>,
    pub nombre: Option<String>,
    pub telefono: Option<String>,
    pub vehicle_type: VehicleType,
    pub matricula: String,
    /// Entry timestamp, Unix millis
    pub entered_at: Option<i64>,
    /// Pre-rendered QR bitmap on disk, if the registration side produced one
    pub qr_image_path: Option<PathBuf>,
    /// Payload for a printer-side QR when no bitmap exists (previews)
    pub qr_payload: Option<String>,
}

/// Print job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Printing,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    /// Transitions are monotonic: PENDING -> PRINTING -> SUCCESS | FAILED
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Printing)
                | (JobStatus::Printing, JobStatus::Success)
                | (JobStatus::Printing, JobStatus::Failed)
        )
    }
}

/// Append-only record of one print attempt
///
/// Retries create a new job; terminal rows are never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: String,
    pub printer_id: String,
    pub subject_id: String,
    pub content_type: String,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
    /// Set exactly once, at the terminal transition
    pub completed_at: Option<i64>,
}

/// Report returned by `PrinterService::status`
#[derive(Debug, Clone, Serialize)]
pub struct PrinterStatusReport {
    pub configured: bool,
    pub connected: bool,
    pub printer_name: Option<String>,
    pub printer_model: Option<String>,
    pub connection_kind: Option<ConnectionKind>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Printing));
        assert!(JobStatus::Printing.can_transition_to(JobStatus::Success));
        assert!(JobStatus::Printing.can_transition_to(JobStatus::Failed));

        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Success));
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Printing));
        assert!(!JobStatus::Printing.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_patch_over_default() {
        let patch = TicketDesignPatch {
            show_qr: Some(false),
            footer_text: Some("Hasta pronto".to_string()),
            ..Default::default()
        };

        let merged = patch.apply_to(&TicketDesign::default());
        assert!(!merged.show_qr);
        assert!(merged.show_header);
        assert_eq!(merged.footer_text, "Hasta pronto");
        assert_eq!(merged.header_text, "SISTEMA DE PARKING\nControl de Acceso");
    }

    #[test]
    fn test_default_usb_fallback_order() {
        let ids = default_usb_fallback_ids();
        assert_eq!(ids[0].product_id, 0x0202);
        assert_eq!(ids[1].product_id, 0x0e15);
    }

    #[test]
    fn test_connection_kind_serde_uppercase() {
        let json = serde_json::to_string(&ConnectionKind::Network).unwrap();
        assert_eq!(json, "\"NETWORK\"");
    }
}
