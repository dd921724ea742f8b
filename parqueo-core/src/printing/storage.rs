//! redb-based storage for printer configurations, ticket designs and the
//! print-job ledger

use super::types::{
    JobStatus, PrintJob, PrinterConfiguration, PrinterConfigurationCreate, TicketDesign,
    default_chars_per_line, default_paper_width, default_usb_fallback_ids,
};
use crate::utils::time::now_millis;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Printer configurations table: key = printer_id, value = JSON
const PRINTERS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("printer_configurations");

/// Ticket designs table: key = design_id, value = JSON
const DESIGNS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("ticket_designs");

/// Print jobs table: key = job_id, value = JSON
const JOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("print_jobs");

/// Index: (printer_id, job_id) -> ()
const JOBS_BY_PRINTER_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("print_jobs_by_printer");

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Printer configuration not found: {0}")]
    PrinterNotFound(String),

    #[error("Print job not found: {0}")]
    JobNotFound(String),

    #[error("Cannot remove the only active printer configuration")]
    SoleActivePrinter,

    #[error("{count} print jobs reference this configuration")]
    JobsAttached { count: usize },

    #[error("Invalid job transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Printing subsystem storage
#[derive(Clone)]
pub struct PrintStorage {
    db: Arc<Database>,
}

impl PrintStorage {
    /// Open or create the database file
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init_tables(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init_tables(db)
    }

    fn init_tables(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRINTERS_TABLE)?;
            let _ = write_txn.open_table(DESIGNS_TABLE)?;
            let _ = write_txn.open_table(JOBS_TABLE)?;
            let _ = write_txn.open_table(JOBS_BY_PRINTER_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ========== Printer configurations ==========

    /// Register a new printer
    ///
    /// With `set_active`, every other configuration is deactivated in the
    /// same transaction, so the one-active invariant never has a window
    /// where two rows are flagged.
    pub fn insert_printer(
        &self,
        data: PrinterConfigurationCreate,
    ) -> StorageResult<PrinterConfiguration> {
        let now = now_millis();
        let config = PrinterConfiguration {
            id: uuid::Uuid::new_v4().to_string(),
            name: data.name,
            model: data.model.unwrap_or_else(|| "Epson M244A".to_string()),
            kind: data.kind,
            connection: data.connection,
            usb_route: data.usb_route.unwrap_or_default(),
            usb_fallback_ids: data.usb_fallback_ids.unwrap_or_else(default_usb_fallback_ids),
            is_active: data.set_active,
            paper_width_mm: data.paper_width_mm.unwrap_or_else(default_paper_width),
            chars_per_line: data.chars_per_line.unwrap_or_else(default_chars_per_line),
            created_at: now,
            updated_at: now,
        };

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PRINTERS_TABLE)?;
            if config.is_active {
                Self::clear_active_printers(&mut table)?;
            }
            let value = serde_json::to_vec(&config)?;
            table.insert(config.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;

        Ok(config)
    }

    /// Get a printer configuration by id
    pub fn get_printer(&self, id: &str) -> StorageResult<Option<PrinterConfiguration>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINTERS_TABLE)?;

        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all printer configurations, newest first
    pub fn list_printers(&self) -> StorageResult<Vec<PrinterConfiguration>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINTERS_TABLE)?;

        let mut printers: Vec<PrinterConfiguration> = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            printers.push(serde_json::from_slice(guard.value())?);
        }

        printers.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        Ok(printers)
    }

    /// Get the active printer configuration, if any
    pub fn active_printer(&self) -> StorageResult<Option<PrinterConfiguration>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINTERS_TABLE)?;

        for result in table.iter()? {
            let (_, guard) = result?;
            let config: PrinterConfiguration = serde_json::from_slice(guard.value())?;
            if config.is_active {
                return Ok(Some(config));
            }
        }
        Ok(None)
    }

    /// Activate a printer, deactivating every other configuration
    ///
    /// Clear-then-set runs inside one write transaction.
    pub fn activate_printer(&self, id: &str) -> StorageResult<PrinterConfiguration> {
        let txn = self.db.begin_write()?;
        let activated = {
            let mut table = txn.open_table(PRINTERS_TABLE)?;

            let bytes = {
                let guard = table
                    .get(id)?
                    .ok_or_else(|| StorageError::PrinterNotFound(id.to_string()))?;
                guard.value().to_vec()
            };
            let mut config: PrinterConfiguration = serde_json::from_slice(&bytes)?;

            Self::clear_active_printers(&mut table)?;

            config.is_active = true;
            config.updated_at = now_millis();
            let value = serde_json::to_vec(&config)?;
            table.insert(id, value.as_slice())?;
            config
        };
        txn.commit()?;

        Ok(activated)
    }

    /// Deactivate a printer
    ///
    /// Refused for the sole active configuration, so the facility is never
    /// silently left without a printer.
    pub fn deactivate_printer(&self, id: &str) -> StorageResult<PrinterConfiguration> {
        let txn = self.db.begin_write()?;
        let deactivated = {
            let mut table = txn.open_table(PRINTERS_TABLE)?;

            let bytes = {
                let guard = table
                    .get(id)?
                    .ok_or_else(|| StorageError::PrinterNotFound(id.to_string()))?;
                guard.value().to_vec()
            };
            let mut config: PrinterConfiguration = serde_json::from_slice(&bytes)?;

            if config.is_active && Self::count_active(&table)? == 1 {
                return Err(StorageError::SoleActivePrinter);
            }

            config.is_active = false;
            config.updated_at = now_millis();
            let value = serde_json::to_vec(&config)?;
            table.insert(id, value.as_slice())?;
            config
        };
        txn.commit()?;

        Ok(deactivated)
    }

    /// Delete a printer configuration
    ///
    /// Refused for the sole active configuration. Refused when print jobs
    /// reference it unless `force` is set, in which case the jobs are
    /// deleted in the same transaction. Returns the number of jobs removed.
    pub fn delete_printer(&self, id: &str, force: bool) -> StorageResult<usize> {
        let txn = self.db.begin_write()?;
        let deleted_jobs = {
            let mut printers = txn.open_table(PRINTERS_TABLE)?;

            let bytes = {
                let guard = printers
                    .get(id)?
                    .ok_or_else(|| StorageError::PrinterNotFound(id.to_string()))?;
                guard.value().to_vec()
            };
            let config: PrinterConfiguration = serde_json::from_slice(&bytes)?;

            if config.is_active && Self::count_active(&printers)? == 1 {
                return Err(StorageError::SoleActivePrinter);
            }

            let mut idx_table = txn.open_table(JOBS_BY_PRINTER_TABLE)?;
            let mut jobs_table = txn.open_table(JOBS_TABLE)?;

            let range_start: (&str, &str) = (id, "");
            let range_end: (&str, &str) = (id, "\u{ffff}");
            let mut job_ids = Vec::new();
            for result in idx_table.range(range_start..=range_end)? {
                let (key, _) = result?;
                let (_, job_id) = key.value();
                job_ids.push(job_id.to_string());
            }

            if !job_ids.is_empty() && !force {
                return Err(StorageError::JobsAttached {
                    count: job_ids.len(),
                });
            }

            for job_id in &job_ids {
                jobs_table.remove(job_id.as_str())?;
                idx_table.remove((id, job_id.as_str()))?;
            }

            printers.remove(id)?;
            job_ids.len()
        };
        txn.commit()?;

        Ok(deleted_jobs)
    }

    fn clear_active_printers(
        table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    ) -> StorageResult<()> {
        let mut active: Vec<PrinterConfiguration> = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            let config: PrinterConfiguration = serde_json::from_slice(guard.value())?;
            if config.is_active {
                active.push(config);
            }
        }

        for mut config in active {
            config.is_active = false;
            config.updated_at = now_millis();
            let value = serde_json::to_vec(&config)?;
            table.insert(config.id.as_str(), value.as_slice())?;
        }
        Ok(())
    }

    fn count_active(table: &redb::Table<'_, &'static str, &'static [u8]>) -> StorageResult<usize> {
        let mut count = 0;
        for result in table.iter()? {
            let (_, guard) = result?;
            let config: PrinterConfiguration = serde_json::from_slice(guard.value())?;
            if config.is_active {
                count += 1;
            }
        }
        Ok(count)
    }

    // ========== Ticket designs ==========

    /// Persist a ticket design
    ///
    /// A design saved with `is_active` deactivates all others in the same
    /// transaction. Assigns an id on first save.
    pub fn save_design(&self, design: &TicketDesign) -> StorageResult<TicketDesign> {
        let mut design = design.clone();
        if design.id.is_empty() {
            design.id = uuid::Uuid::new_v4().to_string();
            design.created_at = now_millis();
        }
        design.updated_at = now_millis();

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DESIGNS_TABLE)?;

            if design.is_active {
                let mut active: Vec<TicketDesign> = Vec::new();
                for result in table.iter()? {
                    let (_, guard) = result?;
                    let other: TicketDesign = serde_json::from_slice(guard.value())?;
                    if other.is_active && other.id != design.id {
                        active.push(other);
                    }
                }
                for mut other in active {
                    other.is_active = false;
                    other.updated_at = now_millis();
                    let value = serde_json::to_vec(&other)?;
                    table.insert(other.id.as_str(), value.as_slice())?;
                }
            }

            let value = serde_json::to_vec(&design)?;
            table.insert(design.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;

        Ok(design)
    }

    /// Get a design by id
    pub fn get_design(&self, id: &str) -> StorageResult<Option<TicketDesign>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DESIGNS_TABLE)?;

        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all designs, newest first
    pub fn list_designs(&self) -> StorageResult<Vec<TicketDesign>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DESIGNS_TABLE)?;

        let mut designs: Vec<TicketDesign> = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            designs.push(serde_json::from_slice(guard.value())?);
        }

        designs.sort_by_key(|d| std::cmp::Reverse(d.created_at));
        Ok(designs)
    }

    /// Get the active design, if any
    pub fn active_design(&self) -> StorageResult<Option<TicketDesign>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DESIGNS_TABLE)?;

        for result in table.iter()? {
            let (_, guard) = result?;
            let design: TicketDesign = serde_json::from_slice(guard.value())?;
            if design.is_active {
                return Ok(Some(design));
            }
        }
        Ok(None)
    }

    /// Get the active design, materializing the default on first access
    pub fn ensure_active_design(&self) -> StorageResult<TicketDesign> {
        if let Some(design) = self.active_design()? {
            return Ok(design);
        }

        let design = TicketDesign {
            is_active: true,
            ..TicketDesign::default()
        };
        self.save_design(&design)
    }

    // ========== Print jobs ==========

    /// Create a PENDING job for a print attempt
    ///
    /// Persisted before any device I/O, so a crash mid-print still leaves
    /// an auditable trail.
    pub fn create_job(
        &self,
        printer_id: &str,
        subject_id: &str,
        content_type: &str,
    ) -> StorageResult<PrintJob> {
        if self.get_printer(printer_id)?.is_none() {
            return Err(StorageError::PrinterNotFound(printer_id.to_string()));
        }

        let job = PrintJob {
            id: uuid::Uuid::new_v4().to_string(),
            printer_id: printer_id.to_string(),
            subject_id: subject_id.to_string(),
            content_type: content_type.to_string(),
            status: JobStatus::Pending,
            error_message: None,
            created_at: now_millis(),
            completed_at: None,
        };

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(JOBS_TABLE)?;
            let value = serde_json::to_vec(&job)?;
            table.insert(job.id.as_str(), value.as_slice())?;

            let mut idx_table = txn.open_table(JOBS_BY_PRINTER_TABLE)?;
            idx_table.insert((job.printer_id.as_str(), job.id.as_str()), ())?;
        }
        txn.commit()?;

        Ok(job)
    }

    /// Transition a job PENDING -> PRINTING
    pub fn mark_printing(&self, id: &str) -> StorageResult<PrintJob> {
        self.transition_job(id, JobStatus::Printing, None)
    }

    /// Transition a job to a terminal status, stamping `completed_at` once
    pub fn complete_job(
        &self,
        id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> StorageResult<PrintJob> {
        debug_assert!(status.is_terminal());
        self.transition_job(id, status, error_message)
    }

    fn transition_job(
        &self,
        id: &str,
        next: JobStatus,
        error_message: Option<String>,
    ) -> StorageResult<PrintJob> {
        let txn = self.db.begin_write()?;
        let job = {
            let mut table = txn.open_table(JOBS_TABLE)?;

            let bytes = {
                let guard = table
                    .get(id)?
                    .ok_or_else(|| StorageError::JobNotFound(id.to_string()))?;
                guard.value().to_vec()
            };
            let mut job: PrintJob = serde_json::from_slice(&bytes)?;

            if !job.status.can_transition_to(next) {
                return Err(StorageError::InvalidTransition {
                    from: job.status,
                    to: next,
                });
            }

            job.status = next;
            if next.is_terminal() {
                job.completed_at = Some(now_millis());
                job.error_message = error_message;
            }

            let value = serde_json::to_vec(&job)?;
            table.insert(id, value.as_slice())?;
            job
        };
        txn.commit()?;

        Ok(job)
    }

    /// Get a job by id
    pub fn get_job(&self, id: &str) -> StorageResult<Option<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All jobs for a subject, oldest first
    pub fn jobs_for_subject(&self, subject_id: &str) -> StorageResult<Vec<PrintJob>> {
        let mut jobs = self.filter_jobs(|job| job.subject_id == subject_id)?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    /// All jobs in a given status, oldest first
    pub fn jobs_with_status(&self, status: JobStatus) -> StorageResult<Vec<PrintJob>> {
        let mut jobs = self.filter_jobs(|job| job.status == status)?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    /// Most recent jobs, newest first
    pub fn recent_jobs(&self, limit: usize) -> StorageResult<Vec<PrintJob>> {
        let mut jobs = self.filter_jobs(|_| true)?;
        jobs.sort_by_key(|j| std::cmp::Reverse(j.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Number of jobs recorded against a printer
    pub fn count_jobs_for_printer(&self, printer_id: &str) -> StorageResult<usize> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(JOBS_BY_PRINTER_TABLE)?;

        let range_start: (&str, &str) = (printer_id, "");
        let range_end: (&str, &str) = (printer_id, "\u{ffff}");
        let mut count = 0;
        for result in idx_table.range(range_start..=range_end)? {
            result?;
            count += 1;
        }
        Ok(count)
    }

    fn filter_jobs(&self, keep: impl Fn(&PrintJob) -> bool) -> StorageResult<Vec<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        let mut jobs = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            let job: PrintJob = serde_json::from_slice(guard.value())?;
            if keep(&job) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    // ========== Cleanup ==========

    /// Delete jobs created before the cutoff (Unix millis)
    ///
    /// Bounds ledger growth; returns the number of jobs removed.
    pub fn purge_jobs_older_than(&self, cutoff_millis: i64) -> StorageResult<usize> {
        let txn = self.db.begin_write()?;
        let deleted = {
            let mut table = txn.open_table(JOBS_TABLE)?;
            let mut idx_table = txn.open_table(JOBS_BY_PRINTER_TABLE)?;

            let mut to_delete = Vec::new();
            for result in table.iter()? {
                let (key, guard) = result?;
                let job: PrintJob = serde_json::from_slice(guard.value())?;
                if job.created_at < cutoff_millis {
                    to_delete.push((key.value().to_string(), job.printer_id.clone()));
                }
            }

            for (id, printer_id) in &to_delete {
                table.remove(id.as_str())?;
                idx_table.remove((printer_id.as_str(), id.as_str()))?;
            }
            to_delete.len()
        };
        txn.commit()?;

        Ok(deleted)
    }
}

impl std::fmt::Debug for PrintStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrintStorage")
            .field("db", &"<redb>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printing::types::ConnectionKind;

    fn network_printer(name: &str) -> PrinterConfigurationCreate {
        PrinterConfigurationCreate::new(name, ConnectionKind::Network, "10.0.0.5:9100")
    }

    fn count_active(storage: &PrintStorage) -> usize {
        storage
            .list_printers()
            .unwrap()
            .iter()
            .filter(|p| p.is_active)
            .count()
    }

    #[test]
    fn test_activation_clears_other_rows() {
        let storage = PrintStorage::open_in_memory().unwrap();

        let a = storage.insert_printer(network_printer("A").active()).unwrap();
        let b = storage.insert_printer(network_printer("B")).unwrap();

        assert_eq!(count_active(&storage), 1);

        storage.activate_printer(&b.id).unwrap();

        assert_eq!(count_active(&storage), 1);
        assert!(!storage.get_printer(&a.id).unwrap().unwrap().is_active);
        assert!(storage.get_printer(&b.id).unwrap().unwrap().is_active);
        assert_eq!(storage.active_printer().unwrap().unwrap().id, b.id);
    }

    #[test]
    fn test_insert_active_deactivates_existing() {
        let storage = PrintStorage::open_in_memory().unwrap();

        let a = storage.insert_printer(network_printer("A").active()).unwrap();
        let b = storage.insert_printer(network_printer("B").active()).unwrap();

        assert_eq!(count_active(&storage), 1);
        assert!(!storage.get_printer(&a.id).unwrap().unwrap().is_active);
        assert_eq!(storage.active_printer().unwrap().unwrap().id, b.id);
    }

    #[test]
    fn test_deactivate_sole_active_refused() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let a = storage.insert_printer(network_printer("A").active()).unwrap();

        let err = storage.deactivate_printer(&a.id).unwrap_err();
        assert!(matches!(err, StorageError::SoleActivePrinter));
    }

    #[test]
    fn test_delete_sole_active_refused() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let a = storage.insert_printer(network_printer("A").active()).unwrap();

        let err = storage.delete_printer(&a.id, false).unwrap_err();
        assert!(matches!(err, StorageError::SoleActivePrinter));
        assert!(storage.get_printer(&a.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_with_jobs_requires_force() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let a = storage.insert_printer(network_printer("A").active()).unwrap();
        let b = storage.insert_printer(network_printer("B")).unwrap();
        storage.activate_printer(&b.id).unwrap();

        storage.create_job(&a.id, "17", "QR_CODE").unwrap();
        storage.create_job(&a.id, "18", "QR_CODE").unwrap();

        let err = storage.delete_printer(&a.id, false).unwrap_err();
        assert!(matches!(err, StorageError::JobsAttached { count: 2 }));

        let deleted = storage.delete_printer(&a.id, true).unwrap();
        assert_eq!(deleted, 2);
        assert!(storage.get_printer(&a.id).unwrap().is_none());
        assert_eq!(storage.count_jobs_for_printer(&a.id).unwrap(), 0);
    }

    #[test]
    fn test_job_lifecycle_monotonic() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let a = storage.insert_printer(network_printer("A").active()).unwrap();

        let job = storage.create_job(&a.id, "42", "QR_CODE").unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.completed_at.is_none());

        let job = storage.mark_printing(&job.id).unwrap();
        assert_eq!(job.status, JobStatus::Printing);

        let job = storage
            .complete_job(&job.id, JobStatus::Success, None)
            .unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert!(job.completed_at.is_some());

        // Terminal rows never move again
        let err = storage
            .complete_job(&job.id, JobStatus::Failed, Some("x".into()))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition { .. }));
    }

    #[test]
    fn test_pending_cannot_jump_to_success() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let a = storage.insert_printer(network_printer("A").active()).unwrap();
        let job = storage.create_job(&a.id, "42", "QR_CODE").unwrap();

        let err = storage
            .complete_job(&job.id, JobStatus::Success, None)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition { .. }));
    }

    #[test]
    fn test_retry_creates_new_job_original_stays_failed() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let a = storage.insert_printer(network_printer("A").active()).unwrap();

        let first = storage.create_job(&a.id, "42", "QR_CODE").unwrap();
        storage.mark_printing(&first.id).unwrap();
        storage
            .complete_job(&first.id, JobStatus::Failed, Some("cable suelto".into()))
            .unwrap();

        let second = storage.create_job(&a.id, "42", "QR_CODE").unwrap();
        assert_ne!(first.id, second.id);

        let jobs = storage.jobs_for_subject("42").unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            storage.get_job(&first.id).unwrap().unwrap().status,
            JobStatus::Failed
        );
    }

    #[test]
    fn test_purge_old_jobs() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let a = storage.insert_printer(network_printer("A").active()).unwrap();

        let _old = storage.create_job(&a.id, "1", "QR_CODE").unwrap();
        let fresh = storage.create_job(&a.id, "2", "QR_CODE").unwrap();

        let purged = storage.purge_jobs_older_than(fresh.created_at).unwrap();
        let remaining = storage.recent_jobs(10).unwrap();

        assert!(remaining.iter().any(|j| j.id == fresh.id));
        assert_eq!(remaining.len() + purged, 2);
    }

    #[test]
    fn test_design_activation_single_active() {
        let storage = PrintStorage::open_in_memory().unwrap();

        let first = storage
            .save_design(&TicketDesign {
                is_active: true,
                ..TicketDesign::default()
            })
            .unwrap();
        let second = storage
            .save_design(&TicketDesign {
                name: "Compacto".into(),
                is_active: true,
                ..TicketDesign::default()
            })
            .unwrap();

        let active: Vec<_> = storage
            .list_designs()
            .unwrap()
            .into_iter()
            .filter(|d| d.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert!(!storage.get_design(&first.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_ensure_active_design_materializes_default() {
        let storage = PrintStorage::open_in_memory().unwrap();
        assert!(storage.active_design().unwrap().is_none());

        let design = storage.ensure_active_design().unwrap();
        assert!(design.is_active);
        assert_eq!(design.name, "Configuración por defecto");

        // Second call returns the same row
        let again = storage.ensure_active_design().unwrap();
        assert_eq!(design.id, again.id);
    }

    #[test]
    fn test_create_job_unknown_printer_refused() {
        let storage = PrintStorage::open_in_memory().unwrap();
        let err = storage.create_job("nope", "42", "QR_CODE").unwrap_err();
        assert!(matches!(err, StorageError::PrinterNotFound(_)));
    }
}
