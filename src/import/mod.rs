//! Batch import: drives records from the reader through validation and the
//! gateway, recording every outcome and checkpointing progress per chunk.

pub mod checkpoint;
pub mod orchestrator;
pub mod outcome;
pub mod run_log;
pub mod throttle;

pub use checkpoint::{file_identity, Checkpoint, CheckpointError, CheckpointStore};
pub use orchestrator::{validate_file, BatchImporter, ImportRequest, RunPhase, RunReport, StartAt};
pub use outcome::{BatchResult, Counters, ImportOutcome, LineDetail, LineStatus};
pub use run_log::{LogTag, RunLog};
pub use throttle::Throttle;
