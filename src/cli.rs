use crate::{
    config::Config,
    diagnostics::{DiagnosticLog, Fault},
    document::{self, DocumentEntry},
    engine::{soffice::SofficeEngine, Engine},
    orchestrator::{FaultPolicy, Orchestrator},
    progress::CancelSignal,
    report::{BatchOutcome, BatchReport},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const EXIT_FAILED: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "docs2pdf")]
#[command(about = "Batch office document to PDF orchestrator (LibreOffice sessions + progress + cancellation)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./docs2pdf.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report the converter executable and version.
    Doctor {},
    /// Classify and page-count documents without converting them.
    Inspect {
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Convert documents to PDF. Type `cancel` on stdin to stop after the
    /// current document.
    Run {
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<i32> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
    let diagnostics = Arc::new(open_diagnostics(&cfg));

    let result = match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Inspect { input } => inspect(&cfg, input, &diagnostics),
        Command::Run { input, out_dir } => run(&cfg, input, out_dir.as_deref(), &diagnostics),
    };

    if let Err(err) = &result {
        diagnostics.record(&Fault::from_error("Error", "cli", &**err));
    }
    result
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("docs2pdf.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            crate::util::ensure_dir(parent)?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.work_dir).join("docs2pdf.log"))
}

fn open_diagnostics(cfg: &Config) -> DiagnosticLog {
    if !cfg.diagnostics.enabled {
        return DiagnosticLog::disabled();
    }
    DiagnosticLog::open(Path::new(&cfg.diagnostics.log_path), cfg.diagnostics.max_bytes)
}

fn doctor(cfg: &Config) -> Result<i32> {
    let engine = SofficeEngine::new(cfg)?;
    let diag = engine.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(if diag.ok { 0 } else { EXIT_FAILED })
}

fn inspect(cfg: &Config, inputs: &[PathBuf], diagnostics: &DiagnosticLog) -> Result<i32> {
    let paths = expand_inputs(cfg, inputs)?;
    let summary = document::ingest_all(&paths);
    report_ingest_failures(&summary.failures, diagnostics);

    let entries: Vec<_> = summary
        .entries
        .iter()
        .map(|e| {
            serde_json::json!({
                "path": e.path(),
                "kind": e.kind(),
                "size_bytes": e.size_bytes(),
                "page_count": e.page_count(),
                "size_label": e.size_label(),
                "page_label": e.page_label(),
            })
        })
        .collect();
    let failures: Vec<_> = summary
        .failures
        .iter()
        .map(|(path, err)| serde_json::json!({ "path": path, "error": err.to_string() }))
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "entries": entries,
            "skipped": summary.skipped,
            "failures": failures,
        }))?
    );
    Ok(if summary.failures.is_empty() { 0 } else { EXIT_FAILED })
}

fn run(
    cfg: &Config,
    inputs: &[PathBuf],
    out_override: Option<&Path>,
    diagnostics: &Arc<DiagnosticLog>,
) -> Result<i32> {
    let paths = expand_inputs(cfg, inputs)?;
    let summary = document::ingest_all(&paths);
    report_ingest_failures(&summary.failures, diagnostics);
    let entries = summary.entries;
    info!("{} document(s) queued", entries.len());

    let Some(dest) = destination(cfg, &entries, out_override)? else {
        info!("no convertible documents; nothing to do");
        return finish(cfg, &BatchReport::begin(PathBuf::new(), 0).finish(BatchOutcome::Done));
    };

    let engine = SofficeEngine::new(cfg)?;
    let policy = FaultPolicy::new(&cfg.converter.benign_faults)
        .with_context(|| "compiling converter.benign_faults")?;
    let mut orchestrator = Orchestrator::new(engine, policy, Arc::clone(diagnostics));

    let cancel = CancelSignal::new();
    listen_for_cancel(cancel.clone());

    let (tx, rx) = mpsc::channel();
    let worker_cancel = cancel.clone();
    let worker = std::thread::Builder::new()
        .name("docs2pdf-batch".into())
        .spawn(move || {
            orchestrator.run(
                &entries,
                &dest,
                |snapshot| {
                    let _ = tx.send(snapshot);
                },
                &worker_cancel,
            )
        })
        .with_context(|| "spawning batch worker")?;

    for snapshot in rx {
        info!(
            "Converting... {} / {} : {}",
            snapshot.current_index, snapshot.max_index, snapshot.file_name
        );
    }

    let report = worker
        .join()
        .map_err(|_| anyhow!("batch worker panicked"))?;
    finish(cfg, &report)
}

fn finish(cfg: &Config, report: &BatchReport) -> Result<i32> {
    let code = match report.outcome {
        BatchOutcome::Done => {
            info!("Done! {} of {} converted", report.converted.len(), report.total);
            0
        }
        BatchOutcome::Cancelled => {
            warn!("Conversion canceled.");
            EXIT_CANCELLED
        }
        BatchOutcome::Failed(kind) => {
            error!("{} ({})", kind.describe(), report.dest_dir.display());
            EXIT_FAILED
        }
    };

    if cfg.output.write_report_json && report.dest_dir.is_dir() {
        std::fs::write(
            report.dest_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(report)?,
        )?;
    }

    if cfg.output.print_report {
        println!("{}", serde_json::to_string_pretty(report)?);
    }

    Ok(code)
}

fn report_ingest_failures(
    failures: &[(PathBuf, crate::error::IngestError)],
    diagnostics: &DiagnosticLog,
) {
    for (path, err) in failures {
        error!("cannot add {}: {err}", path.display());
        if !err.is_expected() {
            diagnostics.record(&Fault::from_error("IngestError", "ingest", err));
        }
    }
}

/// Directories contribute their immediate files, sorted by name.
fn expand_inputs(cfg: &Config, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if cfg.ingest.expand_directories && input.is_dir() {
            let mut files = std::fs::read_dir(input)
                .with_context(|| format!("reading directory: {}", input.display()))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect::<Vec<_>>();
            files.sort();
            out.extend(files);
        } else {
            out.push(input.clone());
        }
    }
    Ok(out)
}

/// `--out-dir`, else `<folder of the first queued file>/<default_dest_subdir>`.
/// `None` when there is neither.
fn destination(
    cfg: &Config,
    entries: &[DocumentEntry],
    out_override: Option<&Path>,
) -> Result<Option<PathBuf>> {
    if let Some(p) = out_override {
        return Ok(Some(p.to_path_buf()));
    }
    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let parent = first
        .path()
        .parent()
        .ok_or_else(|| anyhow!("no parent folder for {}", first.path().display()))?;
    Ok(Some(parent.join(&cfg.paths.default_dest_subdir)))
}

fn listen_for_cancel(cancel: CancelSignal) {
    let spawned = std::thread::Builder::new()
        .name("cancel-listener".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if matches!(line.trim(), "cancel" | "q") {
                    warn!("Cancelling...");
                    cancel.cancel();
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        warn!("cancellation from stdin unavailable: {err}");
    }
}
