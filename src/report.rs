use crate::{error::FailureKind, util::now_rfc3339};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum BatchOutcome {
    Done,
    Cancelled,
    Failed(FailureKind),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub dest_dir: PathBuf,
    pub total: usize,
    pub converted: Vec<ConvertedItem>,
    pub started: String,
    pub finished: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertedItem {
    pub index: usize,
    pub source: PathBuf,
    pub output: PathBuf,
    /// The engine reported a benign fault for this item.
    pub recovered: bool,
}

impl BatchReport {
    pub(crate) fn begin(dest_dir: PathBuf, total: usize) -> Self {
        Self {
            outcome: BatchOutcome::Done,
            dest_dir,
            total,
            converted: Vec::new(),
            started: now_rfc3339(),
            finished: String::new(),
        }
    }

    pub(crate) fn finish(mut self, outcome: BatchOutcome) -> Self {
        self.outcome = outcome;
        self.finished = now_rfc3339();
        self
    }
}
