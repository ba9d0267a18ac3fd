use crate::{
    diagnostics::{DiagnosticLog, Fault},
    document::DocumentEntry,
    engine::Engine,
    error::{BatchError, EngineError},
    pool::ConverterPool,
    progress::{CancelSignal, ProgressSnapshot},
    provision,
    report::{BatchOutcome, BatchReport, ConvertedItem},
    util::pdf_output_path,
};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Idle,
    Provisioning,
    Converting,
    Cancelling,
    Cancelled,
    Done,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Engine faults that are reported although the document converted. Only
/// faults whose signature matches one of the patterns are forgiven.
#[derive(Debug, Clone, Default)]
pub struct FaultPolicy {
    benign: Vec<Regex>,
}

impl FaultPolicy {
    pub fn new(patterns: &[String]) -> Result<Self, regex::Error> {
        let benign = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { benign })
    }

    pub fn is_benign(&self, err: &EngineError) -> bool {
        err.signature()
            .is_some_and(|sig| self.benign.iter().any(|re| re.is_match(sig)))
    }
}

/// One queued document paired with where its PDF goes.
struct ConversionJob<'a> {
    index: usize,
    entry: &'a DocumentEntry,
    output: PathBuf,
}

/// Runs batches strictly one document at a time.
pub struct Orchestrator<E: Engine> {
    engine: E,
    policy: FaultPolicy,
    diagnostics: Arc<DiagnosticLog>,
    state: BatchState,
}

impl<E: Engine> Orchestrator<E> {
    pub fn new(engine: E, policy: FaultPolicy, diagnostics: Arc<DiagnosticLog>) -> Self {
        Self {
            engine,
            policy,
            diagnostics,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Converts `entries` into `dest` in queue order.
    ///
    /// `on_progress` sees item `i` before its conversion starts. `cancel` is
    /// checked after every item; converted files are kept on cancellation.
    pub fn run<F>(
        &mut self,
        entries: &[DocumentEntry],
        dest: &Path,
        mut on_progress: F,
        cancel: &CancelSignal,
    ) -> BatchReport
    where
        F: FnMut(ProgressSnapshot),
    {
        let total = entries.len();
        let mut report = BatchReport::begin(dest.to_path_buf(), total);
        set_state(&mut self.state, BatchState::Idle);
        if entries.is_empty() {
            info!("queue is empty; nothing to convert");
            return report.finish(BatchOutcome::Done);
        }

        set_state(&mut self.state, BatchState::Provisioning);
        if let Err(err) = provision::ensure(dest) {
            let kind = err.failure_kind();
            error!("{}: {err}", kind.describe());
            set_state(&mut self.state, BatchState::Failed);
            return report.finish(BatchOutcome::Failed(kind));
        }

        set_state(&mut self.state, BatchState::Converting);
        let mut pool = ConverterPool::new(&self.engine);

        for (i, entry) in entries.iter().enumerate() {
            let job = ConversionJob {
                index: i + 1,
                entry,
                output: pdf_output_path(dest, entry.path()),
            };

            on_progress(ProgressSnapshot {
                current_index: job.index,
                max_index: total,
                file_name: entry.name(),
            });
            info!("converting {}/{}: {}", job.index, total, entry.path().display());

            match convert_one(&mut pool, &job) {
                Ok(()) => report.converted.push(converted(&job, false)),
                Err(BatchError::Conversion { source, .. }) if self.policy.is_benign(&source) => {
                    warn!("ignoring benign converter fault on {}: {source}", entry.name());
                    report.converted.push(converted(&job, true));
                }
                Err(err) => {
                    let torn_down = pool.shutdown();
                    info!("tore down {torn_down} converter(s) after fault");
                    error!("{err}");
                    self.diagnostics
                        .record(&Fault::from_error(err.kind_name(), "orchestrator", &err));
                    set_state(&mut self.state, BatchState::Failed);
                    return report.finish(BatchOutcome::Failed(err.failure_kind()));
                }
            }

            if cancel.is_cancelled() {
                set_state(&mut self.state, BatchState::Cancelling);
                pool.shutdown();
                set_state(&mut self.state, BatchState::Cancelled);
                info!("cancelled after {}/{}", job.index, total);
                return report.finish(BatchOutcome::Cancelled);
            }
        }

        pool.shutdown();
        set_state(&mut self.state, BatchState::Done);
        report.finish(BatchOutcome::Done)
    }
}

fn convert_one<E: Engine>(
    pool: &mut ConverterPool<'_, E>,
    job: &ConversionJob<'_>,
) -> Result<(), BatchError> {
    let kind = job.entry.kind();
    let handle = pool
        .handle(kind)
        .map_err(|source| BatchError::Start { kind, source })?;
    handle
        .convert(job.entry.path(), &job.output)
        .map_err(|source| BatchError::Conversion {
            index: job.index,
            path: job.entry.path().to_path_buf(),
            source,
        })
}

fn converted(job: &ConversionJob<'_>, recovered: bool) -> ConvertedItem {
    ConvertedItem {
        index: job.index,
        source: job.entry.path().to_path_buf(),
        output: job.output.clone(),
        recovered,
    }
}

fn set_state(state: &mut BatchState, next: BatchState) {
    if *state != next {
        info!("batch state {} -> {}", state, next);
        *state = next;
    }
}
