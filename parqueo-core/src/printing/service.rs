//! Printer service - binds configuration lookup, simulation gating,
//! rendering, transport resolution and the job ledger into one
//! operation per print call.
//!
//! This is the single catch-everything boundary: callers always get a
//! boolean (plus a persisted job record), never an error.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono_tz::Tz;
use parqueo_printer::EscPosBuilder;
use tracing::{error, info, warn};

use super::cache::{DESIGN_OVERRIDE_TTL, SIMULATION_MODE_TTL, SettingsCache};
use super::renderer::{TicketRenderer, encode_ops};
use super::storage::{PrintStorage, StorageResult};
use super::transport::{SystemTransportFactory, TransportFactory};
use super::types::{
    CONTENT_PREVIEW, CONTENT_QR_CODE, JobStatus, PrintJob, PrinterConfiguration,
    PrinterStatusReport, TicketDesign, TicketDesignPatch, TicketSubject, VehicleType,
};
use crate::config::Config;
use crate::utils::time::{format_ticket_time, now_millis};

/// Jobs older than this are removed by [`PrinterService::purge_old_jobs`]
pub const JOB_RETENTION_DAYS: i64 = 30;

/// Ad-hoc subject fields for a design preview ticket
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub cedula: String,
    pub nombre: Option<String>,
    pub telefono: Option<String>,
    pub matricula: String,
    pub vehicle_type: VehicleType,
}

/// Ticket print service
#[derive(Clone)]
pub struct PrinterService {
    storage: PrintStorage,
    cache: SettingsCache,
    transports: Arc<dyn TransportFactory>,
    timezone: Tz,
    simulation: Arc<AtomicBool>,
}

impl PrinterService {
    /// Create a service over the physical transports
    pub async fn new(storage: PrintStorage, cache: SettingsCache, timezone: Tz) -> Self {
        Self::with_transports(storage, cache, Arc::new(SystemTransportFactory), timezone).await
    }

    /// Create a service with an injected transport factory
    ///
    /// The simulation flag is read from the cache at construction;
    /// absent or expired entries default to simulation ON.
    pub async fn with_transports(
        storage: PrintStorage,
        cache: SettingsCache,
        transports: Arc<dyn TransportFactory>,
        timezone: Tz,
    ) -> Self {
        let simulation = cache.simulation_mode().await.unwrap_or(true);
        info!(simulation, "Printer service initialized");

        Self {
            storage,
            cache,
            transports,
            timezone,
            simulation: Arc::new(AtomicBool::new(simulation)),
        }
    }

    /// Open the service from runtime configuration
    pub async fn from_config(config: &Config) -> StorageResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let storage = PrintStorage::open(Path::new(&config.data_dir).join("parqueo.redb"))?;
        Ok(Self::new(storage, SettingsCache::new(), config.timezone).await)
    }

    /// Access the configuration store and job ledger
    pub fn storage(&self) -> &PrintStorage {
        &self.storage
    }

    /// Access the shared settings cache
    pub fn cache(&self) -> &SettingsCache {
        &self.cache
    }

    // ========== Printing ==========

    /// Print an entry ticket for a subject
    ///
    /// Re-reads the active configuration on every call. Creates exactly one
    /// PrintJob, left in a terminal state when this returns. Returns false
    /// without a job when no configuration is active (there is nothing to
    /// attribute the job to). Retrying is the caller invoking this again;
    /// it produces a brand-new job.
    pub async fn print_ticket(&self, subject: &TicketSubject) -> bool {
        let Some(config) = self.load_active_printer() else {
            return false;
        };

        let job = match self.storage.create_job(
            &config.id,
            &subject.id.to_string(),
            CONTENT_QR_CODE,
        ) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to create print job");
                return false;
            }
        };

        self.run_job(job, &config, subject, None).await
    }

    /// Print a preview ticket from ad-hoc fields
    ///
    /// A supplied patch is merged over the current design and cached for
    /// five minutes so subsequent previews reuse it.
    pub async fn print_preview(
        &self,
        request: &PreviewRequest,
        patch: Option<&TicketDesignPatch>,
    ) -> bool {
        let Some(config) = self.load_active_printer() else {
            return false;
        };

        let base = self.design_for_print().await;
        let design = match patch {
            Some(patch) => {
                let design = patch.apply_to(&base);
                self.cache
                    .set_design_override(design.clone(), DESIGN_OVERRIDE_TTL)
                    .await;
                design
            }
            None => self.cache.design_override().await.unwrap_or(base),
        };

        let subject = TicketSubject {
            id: 0,
            cedula: Some(request.cedula.clone()),
            nombre: request.nombre.clone(),
            telefono: request.telefono.clone(),
            vehicle_type: request.vehicle_type,
            matricula: request.matricula.clone(),
            entered_at: Some(now_millis()),
            qr_image_path: None,
            qr_payload: Some(format!("PREVIEW:{}", request.cedula)),
        };

        let subject_id = format!("preview-{}", request.cedula);
        let job = match self
            .storage
            .create_job(&config.id, &subject_id, CONTENT_PREVIEW)
        {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to create preview job");
                return false;
            }
        };

        self.run_job(job, &config, &subject, Some(design)).await
    }

    async fn run_job(
        &self,
        job: PrintJob,
        config: &PrinterConfiguration,
        subject: &TicketSubject,
        design: Option<TicketDesign>,
    ) -> bool {
        if let Err(e) = self.storage.mark_printing(&job.id) {
            error!(job_id = %job.id, error = %e, "Failed to persist PRINTING transition");
            let _ = self.storage.complete_job(
                &job.id,
                JobStatus::Failed,
                Some(format!("ledger error: {}", e)),
            );
            return false;
        }

        if self.simulation.load(Ordering::Relaxed) {
            info!(
                job_id = %job.id,
                subject_id = %job.subject_id,
                printer = %config.name,
                "Simulation mode: ticket logged, hardware untouched"
            );
            return self.finalize(&job.id, Ok(()));
        }

        let design = match design {
            Some(design) => design,
            None => self.design_for_print().await,
        };

        let outcome = self.drive_print(config, subject, &design).await;
        self.finalize(&job.id, outcome)
    }

    /// Render, open the transport and stream the ticket
    ///
    /// Every failure is folded into a message that keeps the underlying
    /// cause, which ends up on the FAILED job row.
    async fn drive_print(
        &self,
        config: &PrinterConfiguration,
        subject: &TicketSubject,
        design: &TicketDesign,
    ) -> Result<(), String> {
        let renderer = TicketRenderer::for_printer(config, self.timezone);
        let ops = renderer
            .render(subject, design)
            .map_err(|e| format!("render failed: {}", e))?;
        let data = encode_ops(&ops, config.chars_per_line);

        let printer = self
            .transports
            .open(config)
            .await
            .map_err(|e| format!("transport open failed: {}", e))?;

        printer
            .print(&data)
            .await
            .map_err(|e| format!("stream failed: {}", e))?;

        Ok(())
    }

    fn finalize(&self, job_id: &str, outcome: Result<(), String>) -> bool {
        match outcome {
            Ok(()) => match self.storage.complete_job(job_id, JobStatus::Success, None) {
                Ok(_) => {
                    info!(job_id = %job_id, "Ticket printed");
                    true
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Failed to persist SUCCESS");
                    false
                }
            },
            Err(message) => {
                error!(job_id = %job_id, error = %message, "Print attempt failed");
                if let Err(e) = self
                    .storage
                    .complete_job(job_id, JobStatus::Failed, Some(message))
                {
                    error!(job_id = %job_id, error = %e, "Failed to persist FAILED");
                }
                false
            }
        }
    }

    fn load_active_printer(&self) -> Option<PrinterConfiguration> {
        match self.storage.active_printer() {
            Ok(Some(config)) => Some(config),
            Ok(None) => {
                warn!("No active printer configuration");
                None
            }
            Err(e) => {
                error!(error = %e, "Failed to load active printer");
                None
            }
        }
    }

    /// Design used for printing: active row, then the last known design,
    /// then the hard default
    async fn design_for_print(&self) -> TicketDesign {
        match self.storage.active_design() {
            Ok(Some(design)) => {
                self.cache.remember_design(design.clone()).await;
                design
            }
            Ok(None) => self.cache.last_design().await.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to load active design, falling back");
                self.cache.last_design().await.unwrap_or_default()
            }
        }
    }

    // ========== Diagnostics ==========

    /// Print a fixed diagnostic page
    ///
    /// A connectivity probe, not a billable job: no PrintJob row is created
    /// and simulation mode is not consulted.
    pub async fn test_printer(&self) -> (bool, String) {
        let config = match self.storage.active_printer() {
            Ok(Some(config)) => config,
            Ok(None) => return (false, "No hay impresora configurada".to_string()),
            Err(e) => return (false, format!("Error leyendo configuración: {}", e)),
        };

        let data = self.test_page(&config);
        let outcome = match self.transports.open(&config).await {
            Ok(printer) => printer.print(&data).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(printer = %config.name, "Printer test OK");
                (true, "Impresora funcionando correctamente".to_string())
            }
            Err(e) => {
                error!(printer = %config.name, error = %e, "Printer test failed");
                (false, format!("Error en prueba de impresora: {}", e))
            }
        }
    }

    fn test_page(&self, config: &PrinterConfiguration) -> Vec<u8> {
        let mut b = EscPosBuilder::new(config.chars_per_line);
        b.center().bold().double_size();
        b.line("PRUEBA DE IMPRESORA");
        b.reset_size().bold_off();
        b.sep_double();
        b.left();
        b.line(&format!("Modelo: {}", config.model));
        b.line(&format!("Conexion: {}", config.kind.as_str()));
        b.line(&format!(
            "Fecha: {}",
            format_ticket_time(now_millis(), self.timezone)
        ));
        b.sep_single();
        b.line("Si puede leer este texto,");
        b.line("la impresora funciona correctamente.");
        b.sep_double();
        b.cut_feed(3);
        b.build()
    }

    /// Probe the active configuration and report, never raising
    pub async fn status(&self) -> PrinterStatusReport {
        let config = match self.storage.active_printer() {
            Ok(Some(config)) => config,
            Ok(None) => {
                return PrinterStatusReport {
                    configured: false,
                    connected: false,
                    printer_name: None,
                    printer_model: None,
                    connection_kind: None,
                    message: "No hay impresora configurada".to_string(),
                };
            }
            Err(e) => {
                return PrinterStatusReport {
                    configured: false,
                    connected: false,
                    printer_name: None,
                    printer_model: None,
                    connection_kind: None,
                    message: format!("Error leyendo configuración: {}", e),
                };
            }
        };

        let (connected, message) = match self.transports.open(&config).await {
            Ok(printer) => {
                if printer.is_online().await {
                    (true, "Impresora conectada y lista".to_string())
                } else {
                    (false, "La impresora no responde".to_string())
                }
            }
            Err(e) => (false, format!("Error de conexión: {}", e)),
        };

        PrinterStatusReport {
            configured: true,
            connected,
            printer_name: Some(config.name),
            printer_model: Some(config.model),
            connection_kind: Some(config.kind),
            message,
        }
    }

    // ========== Simulation mode ==========

    /// Set the simulation flag, both in the shared cache (24 h expiry)
    /// and on this service instance
    pub async fn set_simulation_mode(&self, enabled: bool) {
        self.cache
            .set_simulation_mode(enabled, SIMULATION_MODE_TTL)
            .await;
        self.simulation.store(enabled, Ordering::Relaxed);
        if enabled {
            info!("Simulation mode ENABLED - tickets will be logged, not printed");
        } else {
            info!("Simulation mode DISABLED - tickets go to hardware");
        }
    }

    /// Re-read the simulation flag from the shared cache
    ///
    /// Used after out-of-process changes; absent entries default to ON.
    pub async fn reload_simulation_mode(&self) -> bool {
        let enabled = self.cache.simulation_mode().await.unwrap_or(true);
        self.simulation.store(enabled, Ordering::Relaxed);
        info!(enabled, "Simulation mode reloaded");
        enabled
    }

    /// Current in-memory simulation flag
    pub fn simulation_mode(&self) -> bool {
        self.simulation.load(Ordering::Relaxed)
    }

    /// Re-read the active configuration; nothing is retained between calls
    pub fn reload_printer_config(&self) -> Option<PrinterConfiguration> {
        self.storage.active_printer().ok().flatten()
    }

    // ========== Maintenance ==========

    /// Purge ledger rows older than the retention window
    pub async fn purge_old_jobs(&self) -> usize {
        let cutoff = now_millis() - JOB_RETENTION_DAYS * 24 * 60 * 60 * 1000;
        match self.storage.purge_jobs_older_than(cutoff) {
            Ok(purged) => {
                if purged > 0 {
                    info!(purged, "Old print jobs purged");
                }
                purged
            }
            Err(e) => {
                error!(error = %e, "Failed to purge old jobs");
                0
            }
        }
    }
}

impl std::fmt::Debug for PrinterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterService")
            .field("timezone", &self.timezone)
            .field("simulation", &self.simulation.load(Ordering::Relaxed))
            .finish()
    }
}
