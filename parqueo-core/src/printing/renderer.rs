//! Ticket renderer
//!
//! Renders a subject + design into an ordered command sequence, then lowers
//! the sequence to ESC/POS bytes for the transports.

use chrono_tz::Tz;
use parqueo_printer::{EscPosBuilder, truncate_cp1252};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use super::types::{PrinterConfiguration, SectionPolicy, TicketDesign, TicketSubject};
use crate::utils::time::{format_ticket_time, now_millis};

/// Printer-side QR module size in dots
const QR_MODULE_SIZE: u8 = 6;

/// Longest client name printed before truncation
const MAX_NAME_WIDTH: usize = 30;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("QR asset error: {0}")]
    QrAsset(String),
}

/// Horizontal alignment for a style op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

/// Character size for a style op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSize {
    Normal,
    Double,
}

/// One renderer output command
///
/// The sequence is the testable contract between rendering and the device:
/// lowering to ESC/POS happens afterwards in [`encode_ops`].
#[derive(Debug, Clone)]
pub enum TicketOp {
    Style {
        align: Align,
        bold: bool,
        size: TextSize,
    },
    Line(String),
    /// Full-width rule of the given character
    Separator(char),
    Blank,
    Image {
        bitmap: image::DynamicImage,
        center: bool,
    },
    /// QR rendered by the printer itself from a payload string
    QrData {
        payload: String,
        module_size: u8,
    },
    Feed(u8),
    Cut,
}

/// Entry-ticket renderer
///
/// Pure with respect to its inputs: neither subject nor design is mutated.
pub struct TicketRenderer {
    chars_per_line: usize,
    paper_width_mm: u32,
    timezone: Tz,
}

impl TicketRenderer {
    pub fn new(chars_per_line: usize, paper_width_mm: u32, timezone: Tz) -> Self {
        Self {
            chars_per_line,
            paper_width_mm,
            timezone,
        }
    }

    /// Renderer sized for a stored printer configuration
    pub fn for_printer(config: &PrinterConfiguration, timezone: Tz) -> Self {
        Self::new(config.chars_per_line, config.paper_width_mm, timezone)
    }

    /// Render a ticket to an ordered command sequence
    pub fn render(
        &self,
        subject: &TicketSubject,
        design: &TicketDesign,
    ) -> Result<Vec<TicketOp>, RenderError> {
        let mut ops = Vec::new();

        if design.show_header {
            ops.push(TicketOp::Style {
                align: Align::Center,
                bold: true,
                size: TextSize::Double,
            });
            for line in design.header_text.lines() {
                ops.push(TicketOp::Line(line.to_string()));
            }
            ops.push(TicketOp::Style {
                align: Align::Center,
                bold: false,
                size: TextSize::Normal,
            });
            ops.push(TicketOp::Separator('='));
            ops.push(TicketOp::Blank);
        }

        ops.push(TicketOp::Style {
            align: Align::Left,
            bold: false,
            size: TextSize::Normal,
        });

        if design.show_date {
            ops.push(TicketOp::Line(format!(
                "Fecha: {}",
                format_ticket_time(now_millis(), self.timezone)
            )));
        }

        // Identification block, fixed order
        ops.push(TicketOp::Line(format!("ID: {}", subject.id)));
        ops.push(TicketOp::Line(format!(
            "Cedula: {}",
            subject.cedula.as_deref().unwrap_or("N/A")
        )));
        let nombre = subject
            .nombre
            .as_deref()
            .map(|n| truncate_cp1252(n, MAX_NAME_WIDTH))
            .unwrap_or_else(|| "N/A".to_string());
        ops.push(TicketOp::Line(format!("Cliente: {}", nombre)));
        ops.push(TicketOp::Line(format!(
            "Vehiculo: {}",
            subject.vehicle_type.label()
        )));
        ops.push(TicketOp::Line(format!("Matricula: {}", subject.matricula)));
        if let Some(entered) = subject.entered_at {
            ops.push(TicketOp::Line(format!(
                "Entrada: {}",
                format_ticket_time(entered, self.timezone)
            )));
        }
        ops.push(TicketOp::Separator('-'));

        if design.show_qr
            && let Some(op) = self.qr_op(subject, design)?
        {
            ops.push(op);
        }

        if design.show_footer {
            ops.push(TicketOp::Separator('='));
            ops.push(TicketOp::Style {
                align: Align::Center,
                bold: false,
                size: TextSize::Normal,
            });
            for line in design.footer_text.lines() {
                ops.push(TicketOp::Line(line.to_string()));
            }
        }

        ops.push(TicketOp::Feed(3));
        ops.push(TicketOp::Cut);

        Ok(ops)
    }

    /// Build the QR op for a subject
    ///
    /// A broken bitmap never produces partial raster data: under the `Skip`
    /// policy the block is omitted, under `Abort` the whole render fails.
    fn qr_op(
        &self,
        subject: &TicketSubject,
        design: &TicketDesign,
    ) -> Result<Option<TicketOp>, RenderError> {
        if let Some(path) = &subject.qr_image_path {
            match self.load_qr_bitmap(path) {
                Ok(bitmap) => Ok(Some(TicketOp::Image {
                    bitmap,
                    center: true,
                })),
                Err(e) => match design.on_qr_error {
                    SectionPolicy::Skip => {
                        warn!(path = %path.display(), error = %e, "Skipping QR block");
                        Ok(None)
                    }
                    SectionPolicy::Abort => Err(RenderError::QrAsset(e)),
                },
            }
        } else if let Some(payload) = &subject.qr_payload {
            Ok(Some(TicketOp::QrData {
                payload: payload.clone(),
                module_size: QR_MODULE_SIZE,
            }))
        } else {
            Ok(None)
        }
    }

    fn load_qr_bitmap(&self, path: &Path) -> Result<image::DynamicImage, String> {
        let img = image::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        let size = self.qr_pixel_size();
        let resized = img.resize_exact(size, size, image::imageops::FilterType::Lanczos3);
        Ok(image::DynamicImage::ImageLuma8(resized.to_luma8()))
    }

    /// Square pixel size for the QR bitmap; ~200px tops out an 80mm head
    pub fn qr_pixel_size(&self) -> u32 {
        200.min(self.paper_width_mm * 2)
    }
}

/// Lower a command sequence to ESC/POS bytes
pub fn encode_ops(ops: &[TicketOp], chars_per_line: usize) -> Vec<u8> {
    let mut b = EscPosBuilder::new(chars_per_line);

    for op in ops {
        match op {
            TicketOp::Style { align, bold, size } => {
                match align {
                    Align::Left => b.left(),
                    Align::Center => b.center(),
                };
                if *bold {
                    b.bold();
                } else {
                    b.bold_off();
                }
                match size {
                    TextSize::Normal => b.reset_size(),
                    TextSize::Double => b.double_size(),
                };
            }
            TicketOp::Line(text) => {
                b.line(text);
            }
            TicketOp::Separator(c) => {
                b.line(&c.to_string().repeat(chars_per_line));
            }
            TicketOp::Blank => {
                b.newline();
            }
            TicketOp::Image { bitmap, center } => {
                b.image(bitmap, *center);
            }
            TicketOp::QrData {
                payload,
                module_size,
            } => {
                b.center();
                b.qr_code(payload, *module_size);
                b.left();
            }
            TicketOp::Feed(n) => {
                b.feed(*n);
            }
            TicketOp::Cut => {
                b.cut();
            }
        }
    }

    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printing::types::VehicleType;
    use std::path::PathBuf;

    fn renderer() -> TicketRenderer {
        TicketRenderer::new(48, 80, chrono_tz::America::Bogota)
    }

    fn subject() -> TicketSubject {
        TicketSubject {
            id: 42,
            cedula: Some("1102345678".to_string()),
            nombre: Some("María Fernanda López".to_string()),
            telefono: Some("3001234567".to_string()),
            vehicle_type: VehicleType::Carro,
            matricula: "ABC-123".to_string(),
            entered_at: Some(1705912335000),
            qr_image_path: None,
            qr_payload: None,
        }
    }

    fn lines(ops: &[TicketOp]) -> Vec<String> {
        ops.iter()
            .filter_map(|op| match op {
                TicketOp::Line(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_section_order() {
        let design = TicketDesign::default();
        let mut s = subject();
        s.qr_payload = Some("PARKING:42".to_string());
        let ops = renderer().render(&s, &design).unwrap();

        let mut header_at = None;
        let mut date_at = None;
        let mut id_at = None;
        let mut qr_at = None;
        let mut footer_at = None;
        let mut cut_at = None;

        for (i, op) in ops.iter().enumerate() {
            match op {
                TicketOp::Line(text) => {
                    if text == "SISTEMA DE PARKING" {
                        header_at = Some(i);
                    } else if text.starts_with("Fecha:") {
                        date_at = Some(i);
                    } else if text == "ID: 42" {
                        id_at = Some(i);
                    } else if text == "Conserve este ticket" {
                        footer_at = Some(i);
                    }
                }
                TicketOp::QrData { .. } => qr_at = Some(i),
                TicketOp::Cut => cut_at = Some(i),
                _ => {}
            }
        }

        let order = [header_at, date_at, id_at, qr_at, footer_at, cut_at];
        for pair in order.windows(2) {
            assert!(pair[0].unwrap() < pair[1].unwrap(), "section out of order");
        }
    }

    #[test]
    fn test_identification_block_fixed_order() {
        let ops = renderer().render(&subject(), &TicketDesign::default()).unwrap();
        let lines = lines(&ops);

        let prefixes = ["ID:", "Cedula:", "Cliente:", "Vehiculo:", "Matricula:", "Entrada:"];
        let positions: Vec<usize> = prefixes
            .iter()
            .map(|p| lines.iter().position(|l| l.starts_with(p)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_show_flags_disable_sections() {
        let design = TicketDesign {
            show_header: false,
            show_date: false,
            show_qr: false,
            show_footer: false,
            ..TicketDesign::default()
        };
        let ops = renderer().render(&subject(), &design).unwrap();
        let lines = lines(&ops);

        assert!(!lines.iter().any(|l| l == "SISTEMA DE PARKING"));
        assert!(!lines.iter().any(|l| l.starts_with("Fecha:")));
        assert!(!lines.iter().any(|l| l == "Conserve este ticket"));
        assert!(lines.iter().any(|l| l == "Matricula: ABC-123"));
        assert!(matches!(ops.last(), Some(TicketOp::Cut)));
    }

    #[test]
    fn test_missing_fields_print_na() {
        let mut s = subject();
        s.cedula = None;
        s.nombre = None;
        s.entered_at = None;

        let ops = renderer().render(&s, &TicketDesign::default()).unwrap();
        let lines = lines(&ops);

        assert!(lines.iter().any(|l| l == "Cedula: N/A"));
        assert!(lines.iter().any(|l| l == "Cliente: N/A"));
        assert!(!lines.iter().any(|l| l.starts_with("Entrada:")));
    }

    #[test]
    fn test_long_name_truncated() {
        let mut s = subject();
        s.nombre = Some("Nombre Larguísimo De Verdad Que No Cabe En Un Ticket".to_string());

        let ops = renderer().render(&s, &TicketDesign::default()).unwrap();
        let line = lines(&ops)
            .into_iter()
            .find(|l| l.starts_with("Cliente:"))
            .unwrap();
        assert!(line.chars().count() <= "Cliente: ".len() + MAX_NAME_WIDTH);
    }

    #[test]
    fn test_missing_qr_asset_skipped_by_default() {
        let mut s = subject();
        s.qr_image_path = Some(PathBuf::from("/no/existe/qr.png"));

        let ops = renderer().render(&s, &TicketDesign::default()).unwrap();
        assert!(!ops.iter().any(|op| matches!(op, TicketOp::Image { .. })));
        assert!(matches!(ops.last(), Some(TicketOp::Cut)));
    }

    #[test]
    fn test_missing_qr_asset_aborts_under_abort_policy() {
        let mut s = subject();
        s.qr_image_path = Some(PathBuf::from("/no/existe/qr.png"));
        let design = TicketDesign {
            on_qr_error: crate::printing::types::SectionPolicy::Abort,
            ..TicketDesign::default()
        };

        let err = renderer().render(&s, &design).unwrap_err();
        assert!(matches!(err, RenderError::QrAsset(_)));
    }

    #[test]
    fn test_qr_bitmap_resized_square() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qr.png");
        image::DynamicImage::new_luma8(400, 400).save(&path).unwrap();

        let mut s = subject();
        s.qr_image_path = Some(path);

        let r = renderer();
        let ops = r.render(&s, &TicketDesign::default()).unwrap();
        let bitmap = ops
            .iter()
            .find_map(|op| match op {
                TicketOp::Image { bitmap, .. } => Some(bitmap),
                _ => None,
            })
            .expect("QR image op");

        assert_eq!(bitmap.width(), r.qr_pixel_size());
        assert_eq!(bitmap.height(), r.qr_pixel_size());
    }

    #[test]
    fn test_qr_pixel_size_narrow_paper() {
        let r = TicketRenderer::new(32, 58, chrono_tz::America::Bogota);
        assert_eq!(r.qr_pixel_size(), 116);
        assert_eq!(renderer().qr_pixel_size(), 160);
    }

    #[test]
    fn test_encode_ops_contains_text_and_cut() {
        let ops = renderer().render(&subject(), &TicketDesign::default()).unwrap();
        let data = encode_ops(&ops, 48);

        let needle = b"Matricula: ABC-123";
        assert!(data.windows(needle.len()).any(|w| w == needle));
        assert!(data.windows(3).any(|w| w == [0x1D, 0x56, 0x00]));
    }
}
