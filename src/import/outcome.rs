use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gateway::RemoteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for LineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LineStatus::Success => "success",
            LineStatus::Failed => "failed",
            LineStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Result of pushing one data line through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Success(RemoteId),
    Failed(String),
    Skipped(String),
}

impl ImportOutcome {
    pub fn status(&self) -> LineStatus {
        match self {
            ImportOutcome::Success(_) => LineStatus::Success,
            ImportOutcome::Failed(_) => LineStatus::Failed,
            ImportOutcome::Skipped(_) => LineStatus::Skipped,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ImportOutcome::Success(id) => format!("client created (id: {})", id),
            ImportOutcome::Failed(reason) | ImportOutcome::Skipped(reason) => reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDetail {
    pub line: u64,
    pub email: String,
    pub status: LineStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl Counters {
    pub fn record(&mut self, status: LineStatus) {
        self.total += 1;
        match status {
            LineStatus::Success => self.success += 1,
            LineStatus::Failed => self.failed += 1,
            LineStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn merged(&self, other: &Counters) -> Counters {
        Counters {
            total: self.total + other.total,
            success: self.success + other.success,
            failed: self.failed + other.failed,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Summary handed back to callers: counts plus per-line detail in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub details: Vec<LineDetail>,
}

impl BatchResult {
    pub fn push(&mut self, line: u64, email: impl Into<String>, outcome: &ImportOutcome) -> &LineDetail {
        self.push_detail(LineDetail { line, email: email.into(), status: outcome.status(), message: outcome.message() })
    }

    pub fn push_detail(&mut self, detail: LineDetail) -> &LineDetail {
        let mut counters = self.counters();
        counters.record(detail.status);
        self.total = counters.total;
        self.success = counters.success;
        self.failed = counters.failed;
        self.skipped = counters.skipped;

        self.details.push(detail);
        &self.details[self.details.len() - 1]
    }

    pub fn counters(&self) -> Counters {
        Counters { total: self.total, success: self.success, failed: self.failed, skipped: self.skipped }
    }
}
