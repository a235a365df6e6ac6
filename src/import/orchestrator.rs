use metrics::{counter, histogram};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::checkpoint::{file_identity, Checkpoint, CheckpointStore};
use super::outcome::{BatchResult, Counters, ImportOutcome, LineDetail, LineStatus};
use super::run_log::{LogTag, RunLog};
use super::throttle::Throttle;
use crate::config::ImportSettings;
use crate::constants::{EMAIL_UNAVAILABLE, FIELD_EMAIL};
use crate::error::ImportError;
use crate::gateway::{ClientGateway, NewClient};
use crate::reader::{Dialect, ReadMode, ReaderError, Record, Row, TabularReader};
use crate::validation::{self, document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Reading,
    Validating,
    Dispatching,
    Completed,
    Aborted,
}

/// Where a run starts reading data records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    Beginning,
    /// Resume from the stored checkpoint of this file, if any.
    Checkpoint,
    /// Skip this many data records.
    Offset(u64),
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub path: PathBuf,
    pub start: StartAt,
    pub max_chunks: Option<usize>,
    /// Abort the run on the first structurally broken line instead of
    /// recording it as failed.
    pub strict: bool,
    pub cancel: CancellationToken,
}

impl ImportRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            start: StartAt::Checkpoint,
            max_chunks: None,
            strict: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn start_at(mut self, start: StartAt) -> Self {
        self.start = start;
        self
    }

    pub fn max_chunks(mut self, chunks: usize) -> Self {
        self.max_chunks = Some(chunks);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn cancel_on(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Everything a caller learns about a run. Always produced, also after an abort.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub file_id: Option<String>,
    /// Outcomes of the records handled by this run.
    pub summary: BatchResult,
    /// Cumulative counters including a resumed checkpoint.
    pub totals: Counters,
    pub resumed_from: Option<u64>,
    /// Data-record offset a later run should start from.
    pub next_offset: u64,
    /// The file was read to its end.
    pub finished: bool,
    pub phase: RunPhase,
    #[serde(serialize_with = "serialize_abort")]
    pub abort: Option<ImportError>,
    pub log_file: Option<PathBuf>,
}

impl RunReport {
    pub fn is_aborted(&self) -> bool {
        self.phase == RunPhase::Aborted
    }
}

fn serialize_abort<S: Serializer>(abort: &Option<ImportError>, serializer: S) -> Result<S::Ok, S::Error> {
    match abort {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

struct RunPlan<'a> {
    path: &'a Path,
    start: StartAt,
    max_chunks: Option<usize>,
    chunk_size: usize,
    checkpointing: bool,
    mode: ReadMode,
}

/// Mutable state of one run, owned by the orchestrator for its duration.
struct Run {
    id: Uuid,
    phase: RunPhase,
    started: Instant,
    log: Option<RunLog>,
    summary: BatchResult,
    base: Counters,
    file_id: Option<String>,
    resumed_from: Option<u64>,
    next_offset: u64,
    finished: bool,
}

impl Run {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: RunPhase::Idle,
            started: Instant::now(),
            log: None,
            summary: BatchResult::default(),
            base: Counters::default(),
            file_id: None,
            resumed_from: None,
            next_offset: 0,
            finished: false,
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        if self.phase != phase {
            debug!(run_id = %self.id, from = ?self.phase, to = ?phase, "phase transition");
            self.phase = phase;
        }
    }

    fn log(&mut self, tag: LogTag, detail: &str) {
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.write(tag, detail) {
                warn!(run_id = %self.id, "run log write failed: {}", e);
            }
        }
    }

    fn record(&mut self, line: u64, email: &str, outcome: ImportOutcome) {
        let status = outcome.status();
        let text = {
            let detail = self.summary.push(line, email, &outcome);
            format!("line {} - {} - {}", detail.line, detail.email, detail.message)
        };
        let tag = match status {
            LineStatus::Success => LogTag::Success,
            LineStatus::Failed => LogTag::Error,
            LineStatus::Skipped => LogTag::Skipped,
        };
        self.log(tag, &text);
        counter!("importer_records_total", "status" => status.to_string()).increment(1);
    }

    fn totals(&self) -> Counters {
        self.base.merged(&self.summary.counters())
    }

    fn complete(mut self) -> RunReport {
        self.enter(RunPhase::Completed);
        let totals = self.totals();
        info!(
            run_id = %self.id,
            total = self.summary.total,
            success = self.summary.success,
            failed = self.summary.failed,
            skipped = self.summary.skipped,
            finished = self.finished,
            "import run completed"
        );
        self.log(
            LogTag::Debug,
            &format!(
                "run finished: total={} success={} failed={} skipped={} next_offset={}",
                totals.total, totals.success, totals.failed, totals.skipped, self.next_offset
            ),
        );
        self.into_report(None)
    }

    fn abort(mut self, err: ImportError) -> RunReport {
        match &err {
            ImportError::Cancelled => warn!(run_id = %self.id, "import run cancelled"),
            other => error!(run_id = %self.id, "import run aborted: {}", other),
        }
        self.log(LogTag::Error, &format!("run aborted: {}", err));
        self.enter(RunPhase::Aborted);
        self.into_report(Some(err))
    }

    fn into_report(self, abort: Option<ImportError>) -> RunReport {
        counter!("importer_runs_total", "phase" => format!("{:?}", self.phase).to_lowercase()).increment(1);
        histogram!("importer_run_duration_seconds").record(self.started.elapsed().as_secs_f64());
        let totals = self.totals();
        RunReport {
            run_id: self.id,
            file_id: self.file_id,
            summary: self.summary,
            totals,
            resumed_from: self.resumed_from,
            next_offset: self.next_offset,
            finished: self.finished,
            phase: self.phase,
            abort,
            log_file: self.log.map(|log| log.path().to_path_buf()),
        }
    }
}

/// Sequential importer: one record at a time, in file order.
pub struct BatchImporter {
    gateway: Arc<dyn ClientGateway>,
    settings: ImportSettings,
    checkpoints: CheckpointStore,
    throttle: Throttle,
    dialect: Dialect,
}

impl BatchImporter {
    pub fn new(gateway: Arc<dyn ClientGateway>, settings: ImportSettings, checkpoints: CheckpointStore) -> Self {
        let throttle = Throttle::new(settings.throttle());
        Self { gateway, settings, checkpoints, throttle, dialect: Dialect::default() }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Imports the whole file in chunks of `batch_size`, checkpointing after
    /// each chunk.
    #[instrument(skip(self, request), fields(path = %request.path.display()))]
    pub async fn import_file(&self, request: ImportRequest) -> RunReport {
        let plan = RunPlan {
            path: &request.path,
            start: request.start,
            max_chunks: request.max_chunks,
            chunk_size: self.settings.batch_size.max(1),
            checkpointing: true,
            mode: if request.strict { ReadMode::Strict } else { ReadMode::Lenient },
        };
        self.execute(plan, &request.cancel).await
    }

    /// Handles `size` records starting at data-record `offset`. No checkpoint
    /// is read or written.
    #[instrument(skip(self))]
    pub async fn process_chunk(&self, path: &Path, offset: u64, size: usize) -> RunReport {
        let plan = RunPlan {
            path,
            start: StartAt::Offset(offset),
            max_chunks: Some(1),
            chunk_size: size.max(1),
            checkpointing: false,
            mode: ReadMode::Lenient,
        };
        self.execute(plan, &CancellationToken::new()).await
    }

    /// Dry run over `path`; see [`validate_file`].
    pub fn validate_file(&self, path: &Path) -> Result<BatchResult, ReaderError> {
        validate_file(path, self.dialect)
    }

    async fn execute(&self, plan: RunPlan<'_>, cancel: &CancellationToken) -> RunReport {
        let mut run = Run::new();
        info!(run_id = %run.id, path = %plan.path.display(), "import run started");

        let tag = run.id.simple().to_string();
        match RunLog::create(&self.settings.log_dir, &tag[..8]) {
            Ok(log) => run.log = Some(log),
            Err(e) => return run.abort(ImportError::RunLog(e)),
        }

        run.enter(RunPhase::Reading);
        let mut reader = match TabularReader::open(plan.path, self.dialect, plan.mode) {
            Ok(reader) => reader,
            Err(e) => return run.abort(e.into()),
        };
        if plan.checkpointing {
            match file_identity(plan.path) {
                Ok(id) => run.file_id = Some(id),
                Err(source) => {
                    let err = ReaderError::Unreadable { path: plan.path.to_path_buf(), source };
                    return run.abort(err.into());
                }
            }
        }

        if let Err(e) = self.position_reader(&mut reader, &mut run, plan.start) {
            return run.abort(e);
        }
        run.next_offset = reader.position().index;

        let mut chunks = 0;
        loop {
            let mut processed = 0;
            let mut eof = false;
            while processed < plan.chunk_size {
                if cancel.is_cancelled() {
                    return run.abort(ImportError::Cancelled);
                }
                let row = match reader.next_row() {
                    Ok(Some(row)) => row,
                    Ok(None) => {
                        eof = true;
                        break;
                    }
                    Err(e) => return run.abort(e.into()),
                };
                if !self.process_row(row, &mut run, cancel).await {
                    return run.abort(ImportError::Cancelled);
                }
                run.enter(RunPhase::Reading);
                processed += 1;
            }

            if !eof {
                eof = match reader.at_end() {
                    Ok(end) => end,
                    Err(e) => return run.abort(e.into()),
                };
            }

            chunks += 1;
            run.next_offset = reader.position().index;

            if eof {
                run.finished = true;
                if let Some(file_id) = run.file_id.clone() {
                    match self.checkpoints.clear(&file_id) {
                        Ok(true) => debug!(run_id = %run.id, "checkpoint cleared"),
                        Ok(false) => {}
                        Err(e) => return run.abort(e.into()),
                    }
                }
                break;
            }

            if let Some(file_id) = run.file_id.clone() {
                let checkpoint = Checkpoint::new(&file_id, plan.path, reader.position(), run.totals());
                if let Err(e) = self.checkpoints.save(&checkpoint) {
                    return run.abort(e.into());
                }
                run.log(LogTag::Debug, &format!("checkpoint saved at record {}", checkpoint.next_offset));
            }
            debug!(run_id = %run.id, chunk = chunks, records = processed, "chunk completed");

            if plan.max_chunks.is_some_and(|max| chunks >= max) {
                break;
            }
        }

        run.complete()
    }

    fn position_reader(&self, reader: &mut TabularReader, run: &mut Run, start: StartAt) -> Result<(), ImportError> {
        match start {
            StartAt::Beginning => {}
            StartAt::Offset(n) => {
                let skipped = reader.skip(n)?;
                if skipped < n {
                    warn!(run_id = %run.id, "offset {} is past the end of the file ({} records)", n, skipped);
                }
            }
            StartAt::Checkpoint => {
                let Some(file_id) = run.file_id.clone() else {
                    return Ok(());
                };
                if let Some(checkpoint) = self.checkpoints.load(&file_id)? {
                    reader.seek(checkpoint.next)?;
                    run.base = checkpoint.totals;
                    run.resumed_from = Some(checkpoint.next_offset);
                    info!(run_id = %run.id, offset = checkpoint.next_offset, "resuming from checkpoint");
                    run.log(
                        LogTag::Debug,
                        &format!("resuming at record {} (line {})", checkpoint.next_offset, checkpoint.next.line),
                    );
                }
            }
        }
        Ok(())
    }

    /// Runs one row through the pipeline and records its outcome. Returns
    /// `false` when cancelled before the create call, leaving the row
    /// unrecorded.
    async fn process_row(&self, row: Row, run: &mut Run, cancel: &CancellationToken) -> bool {
        let record = match row {
            Row::Malformed(fault) => {
                run.record(fault.line, EMAIL_UNAVAILABLE, ImportOutcome::Failed(fault.to_string()));
                return true;
            }
            Row::Record(record) => record,
        };
        let line = record.line();
        let email = email_of(&record).to_string();

        run.enter(RunPhase::Validating);
        if let Some(reasons) = validation_reasons(&record) {
            run.record(line, &email, ImportOutcome::Failed(reasons));
            return true;
        }

        run.enter(RunPhase::Dispatching);
        match self.gateway.client_exists(&email).await {
            Ok(true) => {
                run.record(line, &email, ImportOutcome::Skipped("client already exists".to_string()));
                return true;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(run_id = %run.id, line, "existence check failed, treating client as new: {}", e);
                run.log(LogTag::Debug, &format!("line {} - existence check failed: {}", line, e));
            }
        }

        let document = match document::find_document_field(&record) {
            Some((field, raw)) => match document::normalize(raw) {
                Some(doc) => {
                    run.log(
                        LogTag::Debug,
                        &format!("line {} - {} {} taken from '{}'", line, doc.kind().label(), doc.formatted(), field),
                    );
                    Some(doc)
                }
                None => {
                    run.log(LogTag::Debug, &format!("line {} - invalid document in '{}' omitted", line, field));
                    None
                }
            },
            None => None,
        };
        let client = NewClient::from_record(&record, document).with_defaults(
            self.settings.default_country.as_deref(),
            self.settings.default_notes.as_deref(),
        );

        if !self.throttle.pause(cancel).await {
            return false;
        }

        let outcome = match self.gateway.create_client(&client).await {
            Ok(id) => ImportOutcome::Success(id),
            Err(e) => ImportOutcome::Failed(e.to_string()),
        };
        run.record(line, &email, outcome);
        true
    }
}

/// Dry run: reader and validators only, no gateway and no checkpoint. Valid
/// rows are reported as `success` with message `valid`.
pub fn validate_file(path: &Path, dialect: Dialect) -> Result<BatchResult, ReaderError> {
    let mut reader = TabularReader::open(path, dialect, ReadMode::Lenient)?;
    let mut result = BatchResult::default();
    while let Some(row) = reader.next_row()? {
        let detail = match row {
            Row::Malformed(fault) => LineDetail {
                line: fault.line,
                email: EMAIL_UNAVAILABLE.to_string(),
                status: LineStatus::Failed,
                message: fault.to_string(),
            },
            Row::Record(record) => {
                let (status, message) = match validation_reasons(&record) {
                    Some(reasons) => (LineStatus::Failed, reasons),
                    None => (LineStatus::Success, "valid".to_string()),
                };
                LineDetail { line: record.line(), email: email_of(&record).to_string(), status, message }
            }
        };
        result.push_detail(detail);
    }
    Ok(result)
}

fn email_of(record: &Record) -> &str {
    record.get_trimmed(FIELD_EMAIL).unwrap_or(EMAIL_UNAVAILABLE)
}

fn validation_reasons(record: &Record) -> Option<String> {
    let errors = validation::validate(record);
    if errors.is_empty() {
        return None;
    }
    Some(errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "))
}
