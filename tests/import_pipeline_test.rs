use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, NamedTempFile, TempDir};

use client_importer::config::ImportSettings;
use client_importer::gateway::{ClientGateway, GatewayError, NewClient, RemoteId};
use client_importer::import::{
    validate_file, BatchImporter, CheckpointStore, Counters, ImportRequest, LineStatus, RunPhase, StartAt,
};
use client_importer::reader::{Dialect, ReaderError};
use client_importer::ImportError;

/// In-memory remote: remembers created emails and can reject some of them.
#[derive(Default)]
struct MockGateway {
    existing: Mutex<HashSet<String>>,
    created: Mutex<Vec<NewClient>>,
    rejected: HashSet<String>,
    unreachable: bool,
    lookup_fails: bool,
    next_id: AtomicU64,
    lookups: AtomicUsize,
}

impl MockGateway {
    fn with_existing(emails: &[&str]) -> Self {
        let gateway = Self::default();
        gateway.existing.lock().unwrap().extend(emails.iter().map(|e| e.to_string()));
        gateway
    }

    fn created(&self) -> Vec<NewClient> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientGateway for MockGateway {
    async fn client_exists(&self, email: &str) -> Result<bool, GatewayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unreachable || self.lookup_fails {
            return Err(GatewayError::Transport("connection refused".into()));
        }
        Ok(self.existing.lock().unwrap().contains(email))
    }

    async fn create_client(&self, client: &NewClient) -> Result<RemoteId, GatewayError> {
        if self.unreachable {
            return Err(GatewayError::Transport("connection refused".into()));
        }
        if self.rejected.contains(&client.email) {
            return Err(GatewayError::Remote("A user already exists with that email address".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.existing.lock().unwrap().insert(client.email.clone());
        self.created.lock().unwrap().push(client.clone());
        Ok(RemoteId(id.to_string()))
    }
}

struct Fixture {
    _dir: TempDir,
    settings: ImportSettings,
}

impl Fixture {
    fn new(batch_size: usize) -> Self {
        let dir = tempdir().unwrap();
        let settings = ImportSettings {
            batch_size,
            throttle_ms: 0,
            log_dir: dir.path().join("logs"),
            checkpoint_dir: dir.path().join("checkpoints"),
            ..ImportSettings::default()
        };
        Self { _dir: dir, settings }
    }

    fn importer(&self, gateway: Arc<MockGateway>) -> BatchImporter {
        let store = CheckpointStore::open(&self.settings.checkpoint_dir).unwrap();
        BatchImporter::new(gateway, self.settings.clone(), store)
    }
}

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn five_clients() -> NamedTempFile {
    csv_file(
        "firstname,lastname,email\n\
         Ana,Silva,ana@example.com\n\
         Bia,Souza,bia@example.com\n\
         Caio,Lima,caio@example.com\n\
         Davi,Rocha,davi@example.com\n\
         Eva,Costa,eva@example.com\n",
    )
}

#[tokio::test]
async fn valid_record_with_entity_document_is_created() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway.clone());
    let file = csv_file("firstname,lastname,email,cnpj\nAna,Silva,ana@example.com,11.222.333/0001-81\n");

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    assert_eq!(report.phase, RunPhase::Completed);
    assert!(report.finished);
    assert_eq!(report.summary.success, 1);
    let detail = &report.summary.details[0];
    assert_eq!(detail.line, 2);
    assert_eq!(detail.status, LineStatus::Success);
    assert_eq!(detail.message, "client created (id: 1)");

    let created = gateway.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].document.as_ref().map(|d| d.digits()), Some("11222333000181"));
    assert_eq!(created[0].country.as_deref(), Some("BR"));

    let log = std::fs::read_to_string(report.log_file.as_ref().unwrap()).unwrap();
    assert!(log.contains("SUCCESS: line 2 - ana@example.com - client created (id: 1)"));
}

#[tokio::test]
async fn invalid_document_does_not_change_outcome() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway.clone());
    let file = csv_file("firstname,lastname,email,documento\nAna,Silva,ana@example.com,123\n");

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    assert_eq!(report.summary.success, 1);
    assert!(gateway.created()[0].document.is_none());
}

#[tokio::test]
async fn invalid_email_fails_without_touching_the_remote() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway.clone());
    let file = csv_file("firstname,lastname,email\nAna,Silva,not-an-email\n");

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    assert_eq!(report.summary.failed, 1);
    let detail = &report.summary.details[0];
    assert_eq!(detail.status, LineStatus::Failed);
    assert!(detail.message.contains("invalid email"));
    assert_eq!(gateway.lookups.load(Ordering::SeqCst), 0);
    assert!(gateway.created().is_empty());
}

#[tokio::test]
async fn all_validation_reasons_are_reported() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway);
    let file = csv_file("firstname,lastname,email\n,,\n");

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    let detail = &report.summary.details[0];
    assert_eq!(detail.email, "N/A");
    assert_eq!(detail.message.split("; ").count(), 3);
    assert!(detail.message.contains("required field 'firstname' is empty"));
}

#[tokio::test]
async fn column_mismatch_fails_the_line_and_reading_continues() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway.clone());
    let file = csv_file(
        "firstname,lastname,email\n\
         Ana,Silva,ana@example.com\n\
         Bia,Souza,bia@example.com,extra\n\
         Caio,Lima,caio@example.com\n",
    );

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    let statuses: Vec<_> = report.summary.details.iter().map(|d| (d.line, d.status)).collect();
    assert_eq!(
        statuses,
        vec![(2, LineStatus::Success), (3, LineStatus::Failed), (4, LineStatus::Success)]
    );
    assert_eq!(report.summary.details[1].message, "column count 4 does not match header (3)");
    assert_eq!(report.summary.details[1].email, "N/A");
    assert_eq!(gateway.created().len(), 2);
}

#[tokio::test]
async fn existing_clients_are_skipped_without_create() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway::with_existing(&["bia@example.com"]));
    let importer = fixture.importer(gateway.clone());
    let file = five_clients();

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.details[1].message, "client already exists");
    assert!(gateway.created().iter().all(|c| c.email != "bia@example.com"));
}

#[tokio::test]
async fn remote_rejection_is_reported_verbatim() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway {
        rejected: ["ana@example.com".to_string()].into_iter().collect(),
        ..MockGateway::default()
    });
    let importer = fixture.importer(gateway);
    let file = csv_file("firstname,lastname,email\nAna,Silva,ana@example.com\n");

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    assert_eq!(report.summary.failed, 1);
    assert_eq!(
        report.summary.details[0].message,
        "remote error: A user already exists with that email address"
    );
    assert_eq!(report.phase, RunPhase::Completed);
}

#[tokio::test]
async fn transport_failures_fail_records_but_not_the_run() {
    let fixture = Fixture::new(2);
    let gateway = Arc::new(MockGateway { unreachable: true, ..MockGateway::default() });
    let importer = fixture.importer(gateway);
    let file = five_clients();

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.summary.failed, 5);
    assert!(report.summary.details.iter().all(|d| d.message.starts_with("transport error:")));
}

#[tokio::test]
async fn failed_lookup_still_creates_the_client() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway { lookup_fails: true, ..MockGateway::default() });
    let importer = fixture.importer(gateway.clone());
    let file = csv_file("firstname,lastname,email\nAna,Silva,ana@example.com\n");

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    assert_eq!(report.summary.success, 1);
    assert_eq!(report.summary.details[0].status, LineStatus::Success);
    assert_eq!(report.summary.details[0].message, "client created (id: 1)");
    assert_eq!(gateway.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.created().len(), 1);

    let log = std::fs::read_to_string(report.log_file.as_ref().unwrap()).unwrap();
    assert!(log.contains("DEBUG: line 2 - existence check failed"));
    assert!(log.contains("SUCCESS: line 2 - ana@example.com - client created (id: 1)"));
}

#[tokio::test]
async fn strict_run_aborts_on_column_mismatch() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway.clone());
    let file = csv_file(
        "firstname,lastname,email\n\
         Ana,Silva,ana@example.com\n\
         Bia,Souza,bia@example.com,extra\n\
         Caio,Lima,caio@example.com\n",
    );

    let report = importer.import_file(ImportRequest::new(file.path()).strict()).await;

    assert_eq!(report.phase, RunPhase::Aborted);
    assert!(matches!(
        report.abort,
        Some(ImportError::Reader(ReaderError::ColumnMismatch { line: 3, expected: 3, found: 4 }))
    ));
    assert!(!report.finished);
    assert_eq!(report.summary.total, 1);
    assert_eq!(report.summary.success, 1);
    let emails: Vec<String> = gateway.created().into_iter().map(|c| c.email).collect();
    assert_eq!(emails, vec!["ana@example.com".to_string()]);
}

#[tokio::test]
async fn second_import_of_same_file_skips_everything() {
    let fixture = Fixture::new(2);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway.clone());
    let file = five_clients();

    let first = importer.import_file(ImportRequest::new(file.path())).await;
    assert_eq!(first.summary.success, 5);

    let second = importer.import_file(ImportRequest::new(file.path())).await;
    assert_eq!(second.summary.success, 0);
    assert_eq!(second.summary.skipped, 5);
    assert!(second.summary.details.iter().all(|d| d.status == LineStatus::Skipped));
    assert_eq!(gateway.created().len(), 5);
}

#[tokio::test]
async fn details_follow_physical_line_order() {
    let fixture = Fixture::new(2);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway);
    let file = csv_file(
        "firstname,lastname,email,notes\n\
         Ana,Silva,ana@example.com,\"first line\nsecond line\"\n\
         Bia,Souza,bia@example.com,\n\
         Caio,Lima,bad-email,\n",
    );

    let report = importer.import_file(ImportRequest::new(file.path())).await;

    let lines: Vec<u64> = report.summary.details.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![2, 4, 5]);
    assert!(lines.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn resume_processes_remaining_records_once() {
    let fixture = Fixture::new(2);
    let file = five_clients();

    let uninterrupted = {
        let gateway = Arc::new(MockGateway::with_existing(&["caio@example.com"]));
        let store = CheckpointStore::in_memory().unwrap();
        BatchImporter::new(gateway, fixture.settings.clone(), store)
            .import_file(ImportRequest::new(file.path()))
            .await
    };

    let gateway = Arc::new(MockGateway::with_existing(&["caio@example.com"]));
    let importer = fixture.importer(gateway.clone());

    let first = importer.import_file(ImportRequest::new(file.path()).max_chunks(1)).await;
    assert_eq!(first.phase, RunPhase::Completed);
    assert!(!first.finished);
    assert_eq!(first.next_offset, 2);
    let file_id = first.file_id.clone().unwrap();
    let checkpoint = importer.checkpoints().load(&file_id).unwrap().unwrap();
    assert_eq!(checkpoint.next_offset, 2);
    assert_eq!(checkpoint.totals, Counters { total: 2, success: 2, failed: 0, skipped: 0 });

    let resumed = importer.import_file(ImportRequest::new(file.path())).await;
    assert_eq!(resumed.resumed_from, Some(2));
    assert!(resumed.finished);
    let lines: Vec<u64> = resumed.summary.details.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![4, 5, 6]);
    assert_eq!(resumed.totals, uninterrupted.totals);
    assert_eq!(resumed.totals, Counters { total: 5, success: 4, failed: 0, skipped: 1 });
    assert!(importer.checkpoints().load(&file_id).unwrap().is_none());

    let emails: Vec<String> = gateway.created().into_iter().map(|c| c.email).collect();
    assert_eq!(emails.len(), 4);
    let unique: HashSet<&String> = emails.iter().collect();
    assert_eq!(unique.len(), 4);
}

#[tokio::test]
async fn chunk_ending_at_end_of_file_finishes_the_run() {
    let fixture = Fixture::new(5);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway);
    let file = five_clients();

    let report = importer.import_file(ImportRequest::new(file.path()).max_chunks(1)).await;

    assert_eq!(report.phase, RunPhase::Completed);
    assert!(report.finished);
    assert_eq!(report.next_offset, 5);
    assert_eq!(report.summary.success, 5);
    assert!(importer.checkpoints().list().unwrap().is_empty());
}

#[tokio::test]
async fn fresh_start_and_explicit_offset_ignore_checkpoint() {
    let fixture = Fixture::new(2);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway);
    let file = five_clients();

    importer.import_file(ImportRequest::new(file.path()).max_chunks(1)).await;

    let fresh = importer
        .import_file(ImportRequest::new(file.path()).start_at(StartAt::Beginning).max_chunks(1))
        .await;
    assert_eq!(fresh.resumed_from, None);
    assert_eq!(fresh.summary.details[0].line, 2);

    let offset = importer
        .import_file(ImportRequest::new(file.path()).start_at(StartAt::Offset(4)))
        .await;
    let lines: Vec<u64> = offset.summary.details.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![6]);
}

#[tokio::test]
async fn process_chunk_handles_one_window_without_checkpoint() {
    let fixture = Fixture::new(50);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway.clone());
    let file = five_clients();

    let report = importer.process_chunk(file.path(), 1, 2).await;

    let lines: Vec<u64> = report.summary.details.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![3, 4]);
    assert_eq!(report.next_offset, 3);
    assert!(report.file_id.is_none());
    assert!(importer.checkpoints().list().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_run_writes_no_checkpoint() {
    let fixture = Fixture::new(2);
    let gateway = Arc::new(MockGateway::default());
    let importer = fixture.importer(gateway);
    let file = five_clients();

    let request = ImportRequest::new(file.path());
    request.cancel.cancel();
    let report = importer.import_file(request).await;

    assert_eq!(report.phase, RunPhase::Aborted);
    assert!(matches!(report.abort, Some(ImportError::Cancelled)));
    assert_eq!(report.summary.total, 0);
    assert!(importer.checkpoints().list().unwrap().is_empty());
}

#[tokio::test]
async fn missing_file_aborts_with_summary() {
    let fixture = Fixture::new(50);
    let importer = fixture.importer(Arc::new(MockGateway::default()));

    let report = importer.import_file(ImportRequest::new("/nonexistent/clients.csv")).await;

    assert!(report.is_aborted());
    assert!(matches!(report.abort, Some(ImportError::Reader(_))));
    assert_eq!(report.summary.total, 0);
    let log = std::fs::read_to_string(report.log_file.as_ref().unwrap()).unwrap();
    assert!(log.contains("ERRO: run aborted"));
}

#[test]
fn dry_run_reports_without_gateway() {
    let file = csv_file(
        "firstname,lastname,email\n\
         Ana,Silva,ana@example.com\n\
         Bia,Souza,bia-at-example\n\
         Caio,Lima\n",
    );

    let result = validate_file(file.path(), Dialect::default()).unwrap();

    assert_eq!((result.total, result.success, result.failed), (3, 1, 2));
    assert_eq!(result.details[0].message, "valid");
    assert!(result.details[1].message.contains("invalid email"));
    assert_eq!(result.details[2].message, "column count 2 does not match header (3)");
}

#[test]
fn dry_run_on_missing_file_errors() {
    assert!(validate_file(Path::new("/nonexistent/clients.csv"), Dialect::default()).is_err());
}
