//! End-to-end print flow tests over a recording transport factory

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use parqueo_core::printing::{
    ConnectionKind, JobStatus, PreviewRequest, PrintStorage, PrinterConfiguration,
    PrinterConfigurationCreate, PrinterService, SIMULATION_MODE_TTL, SettingsCache, StorageError,
    TicketSubject, TransportFactory, VehicleType, parse_network_descriptor,
};
use parqueo_printer::{NetworkPrinter, PrintError, Printer};

#[derive(Default)]
struct RecordingTransports {
    fail_print: AtomicBool,
    opens: AtomicUsize,
    printed: Arc<Mutex<Vec<Vec<u8>>>>,
}

struct RecordingPrinter {
    fail_print: bool,
    printed: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl Printer for RecordingPrinter {
    async fn print(&self, data: &[u8]) -> Result<(), PrintError> {
        if self.fail_print {
            return Err(PrintError::Connection("printer unplugged".to_string()));
        }
        self.printed.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn is_online(&self) -> bool {
        !self.fail_print
    }
}

#[async_trait]
impl TransportFactory for RecordingTransports {
    async fn open(&self, _config: &PrinterConfiguration) -> Result<Box<dyn Printer>, PrintError> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(RecordingPrinter {
            fail_print: self.fail_print.load(Ordering::Relaxed),
            printed: self.printed.clone(),
        }))
    }
}

struct Harness {
    service: PrinterService,
    transports: Arc<RecordingTransports>,
    _dir: tempfile::TempDir,
}

async fn harness(simulation: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let storage = PrintStorage::open(dir.path().join("parqueo.redb")).unwrap();
    let cache = SettingsCache::new();
    cache.set_simulation_mode(simulation, SIMULATION_MODE_TTL).await;

    let transports = Arc::new(RecordingTransports::default());
    let service = PrinterService::with_transports(
        storage,
        cache,
        transports.clone(),
        chrono_tz::America::Bogota,
    )
    .await;

    Harness {
        service,
        transports,
        _dir: dir,
    }
}

fn network_printer(name: &str, descriptor: &str) -> PrinterConfigurationCreate {
    PrinterConfigurationCreate::new(name, ConnectionKind::Network, descriptor)
}

fn subject(id: i64) -> TicketSubject {
    TicketSubject {
        id,
        cedula: Some("1102345678".to_string()),
        nombre: Some("Carlos Pérez".to_string()),
        telefono: Some("3007654321".to_string()),
        vehicle_type: VehicleType::Carro,
        matricula: "XYZ-987".to_string(),
        entered_at: Some(1705912335000),
        qr_image_path: None,
        qr_payload: None,
    }
}

// Scenario A: no active configuration -> false, no job record
#[tokio::test]
async fn no_active_printer_returns_false_without_job() {
    let h = harness(false).await;

    assert!(!h.service.print_ticket(&subject(1)).await);
    assert!(h.service.storage().recent_jobs(10).unwrap().is_empty());
    assert_eq!(h.transports.opens.load(Ordering::Relaxed), 0);
}

// Scenario B: simulation on -> success, one SUCCESS job, zero transport calls
#[tokio::test]
async fn simulation_prints_without_touching_transport() {
    let h = harness(true).await;
    h.service
        .storage()
        .insert_printer(network_printer("Entrada", "10.0.0.5").active())
        .unwrap();

    assert!(h.service.print_ticket(&subject(7)).await);

    let jobs = h.service.storage().jobs_for_subject("7").unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Success);
    assert!(jobs[0].completed_at.is_some());
    assert_eq!(h.transports.opens.load(Ordering::Relaxed), 0);
}

// Scenario C: port-less network descriptor resolves to 9100
#[test]
fn portless_descriptor_targets_9100() {
    let (host, port) = parse_network_descriptor("10.0.0.5");
    assert_eq!(NetworkPrinter::new(&host, port).addr(), "10.0.0.5:9100");
}

// Scenario D: missing QR asset is skipped, ticket still prints
#[tokio::test]
async fn missing_qr_asset_still_prints() {
    let h = harness(false).await;
    h.service
        .storage()
        .insert_printer(network_printer("Entrada", "10.0.0.5").active())
        .unwrap();

    let mut s = subject(9);
    s.qr_image_path = Some("/no/existe/qr-9.png".into());

    assert!(h.service.print_ticket(&s).await);

    let jobs = h.service.storage().jobs_for_subject("9").unwrap();
    assert_eq!(jobs[0].status, JobStatus::Success);

    // Ticket went out without raster data (GS v 0 marker absent)
    let printed = h.transports.printed.lock().unwrap();
    assert!(!printed[0].windows(3).any(|w| w == [0x1D, 0x76, 0x30]));
}

// Scenario E: deletion guard rules
#[tokio::test]
async fn delete_guards_apply_uniformly() {
    let h = harness(true).await;
    let storage = h.service.storage();

    let a = storage
        .insert_printer(network_printer("A", "10.0.0.5").active())
        .unwrap();

    // Sole active configuration cannot be removed
    assert!(matches!(
        storage.delete_printer(&a.id, false).unwrap_err(),
        StorageError::SoleActivePrinter
    ));

    let b = storage.insert_printer(network_printer("B", "10.0.0.6")).unwrap();
    storage.activate_printer(&b.id).unwrap();

    // Three ledger rows against the now-inactive A
    storage.create_job(&a.id, "31", "QR_CODE").unwrap();
    storage.create_job(&a.id, "32", "QR_CODE").unwrap();
    storage.create_job(&a.id, "33", "QR_CODE").unwrap();

    match storage.delete_printer(&a.id, false).unwrap_err() {
        StorageError::JobsAttached { count } => assert_eq!(count, 3),
        other => panic!("expected JobsAttached, got {other:?}"),
    }

    let removed = storage.delete_printer(&a.id, true).unwrap();
    assert_eq!(removed, 3);
    assert!(storage.get_printer(&a.id).unwrap().is_none());
}

// Scenario F: retry creates a new job, the failed one is immutable
#[tokio::test]
async fn retry_creates_new_job() {
    let h = harness(false).await;
    h.service
        .storage()
        .insert_printer(network_printer("Entrada", "10.0.0.5").active())
        .unwrap();

    h.transports.fail_print.store(true, Ordering::Relaxed);
    assert!(!h.service.print_ticket(&subject(55)).await);

    let jobs = h.service.storage().jobs_for_subject("55").unwrap();
    assert_eq!(jobs.len(), 1);
    let failed_id = jobs[0].id.clone();
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert!(
        jobs[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("printer unplugged")
    );

    // Operator fixes the printer and retries the same subject
    h.transports.fail_print.store(false, Ordering::Relaxed);
    assert!(h.service.print_ticket(&subject(55)).await);

    let jobs = h.service.storage().jobs_for_subject("55").unwrap();
    assert_eq!(jobs.len(), 2);
    let original = jobs.iter().find(|j| j.id == failed_id).unwrap();
    assert_eq!(original.status, JobStatus::Failed);
    let retry = jobs.iter().find(|j| j.id != failed_id).unwrap();
    assert_eq!(retry.status, JobStatus::Success);
}

// Every print call leaves exactly one job in a terminal state
#[tokio::test]
async fn every_call_leaves_one_terminal_job() {
    let h = harness(false).await;
    h.service
        .storage()
        .insert_printer(network_printer("Entrada", "10.0.0.5").active())
        .unwrap();

    for (id, fail) in [(101, false), (102, true), (103, false)] {
        h.transports.fail_print.store(fail, Ordering::Relaxed);
        let ok = h.service.print_ticket(&subject(id)).await;
        assert_eq!(ok, !fail);

        let jobs = h.service.storage().jobs_for_subject(&id.to_string()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].status.is_terminal());
        assert!(jobs[0].completed_at.is_some());
    }
}

// Activation always leaves exactly one active row
#[tokio::test]
async fn activation_singleton_invariant() {
    let h = harness(true).await;
    let storage = h.service.storage();

    let ids: Vec<String> = (0..4)
        .map(|i| {
            storage
                .insert_printer(network_printer(&format!("P{i}"), "10.0.0.5").active())
                .unwrap()
                .id
        })
        .collect();

    for id in &ids {
        storage.activate_printer(id).unwrap();
        let active: Vec<_> = storage
            .list_printers()
            .unwrap()
            .into_iter()
            .filter(|p| p.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(&active[0].id, id);
    }
}

// Simulation idempotence: enabling twice keeps the flag set
#[tokio::test]
async fn simulation_enable_is_idempotent() {
    let h = harness(false).await;

    h.service.set_simulation_mode(true).await;
    h.service.set_simulation_mode(true).await;

    assert!(h.service.simulation_mode());
    assert_eq!(h.service.cache().simulation_mode().await, Some(true));
    assert!(h.service.reload_simulation_mode().await);
}

// Preview pipeline: synthesized subject, patch honored, dedicated job row
#[tokio::test]
async fn preview_pipeline_end_to_end() {
    let h = harness(false).await;
    h.service
        .storage()
        .insert_printer(network_printer("Entrada", "10.0.0.5").active())
        .unwrap();

    let request = PreviewRequest {
        cedula: "777".to_string(),
        nombre: None,
        telefono: None,
        matricula: "PRV-777".to_string(),
        vehicle_type: VehicleType::Otro,
    };

    assert!(h.service.print_preview(&request, None).await);

    let jobs = h.service.storage().jobs_for_subject("preview-777").unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].content_type, "PREVIEW");
    assert_eq!(jobs[0].status, JobStatus::Success);

    let printed = h.transports.printed.lock().unwrap();
    let needle = b"Cliente: N/A";
    assert!(printed[0].windows(needle.len()).any(|w| w == needle));
}
