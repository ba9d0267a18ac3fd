use super::{types::*, Engine, OpenDocument, Session};
use crate::{
    config::Config,
    document::DocumentKind,
    error::EngineError,
    util::{expand_tilde, pdf_output_path, remove_dir_if_present},
};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const MAC_BUNDLE_EXE: &str = "/Applications/LibreOffice.app/Contents/MacOS/soffice";

/// LibreOffice in headless mode. Each session gets a private user profile so
/// that two kinds never contend for the same profile lock.
pub struct SofficeEngine {
    cfg: Config,
    soffice_exe: PathBuf,
    work_dir: PathBuf,
}

impl SofficeEngine {
    pub fn new(cfg: &Config) -> Result<Self, EngineError> {
        let soffice_exe = resolve_soffice_exe(&cfg.converter.soffice_exe)?;
        let work_dir = std::path::absolute(expand_tilde(&cfg.paths.work_dir))
            .map_err(|e| EngineError::io("resolving work_dir", e))?;
        Ok(Self {
            cfg: cfg.clone(),
            soffice_exe,
            work_dir,
        })
    }

    fn timeout(seconds: u64) -> Option<u64> {
        (seconds > 0).then_some(seconds)
    }
}

impl Engine for SofficeEngine {
    type Session = SofficeSession;

    fn doctor(&self) -> Result<EngineDiag, EngineError> {
        let mut cmd = Command::new(&self.soffice_exe);
        cmd.arg("--version");
        let (version, error) = match run_with_timeout(
            cmd,
            &self.soffice_exe,
            Self::timeout(self.cfg.converter.doctor_timeout_seconds),
        ) {
            Ok(out) if out.status.success() => (
                Some(String::from_utf8_lossy(&out.stdout).trim().to_string()),
                None,
            ),
            Ok(out) => (None, Some(exit_signature(out.status))),
            Err(err) => (None, Some(err.to_string())),
        };
        Ok(EngineDiag {
            soffice_exe: self.soffice_exe.display().to_string(),
            ok: version.is_some(),
            version,
            work_dir: self.work_dir.display().to_string(),
            error,
        })
    }

    fn start(&self, kind: DocumentKind) -> Result<SofficeSession, EngineError> {
        let tag = format!("{}-{}", kind.as_str(), std::process::id());
        let profile_dir = self.work_dir.join("profiles").join(&tag);
        let staging_dir = self.work_dir.join("staging").join(&tag);
        for dir in [&profile_dir, &staging_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| EngineError::io(format!("create {}", dir.display()), e))?;
        }

        let invocation = Invocation {
            exe: self.soffice_exe.clone(),
            profile_url: file_url(&profile_dir),
            extra_args: self.cfg.converter.extra_args.clone(),
            env: self.cfg.converter.env.clone(),
            timeout_seconds: Self::timeout(self.cfg.converter.timeout_seconds),
        };

        // Initialize the profile up front so the first document does not pay
        // for it (and does not hit the restart-after-init exit code).
        let mut warm_up = invocation.command();
        warm_up.arg("--terminate_after_init");
        let out = run_with_timeout(
            warm_up,
            &profile_dir,
            Self::timeout(self.cfg.converter.start_timeout_seconds),
        )?;
        if !out.status.success() {
            warn!(
                "{kind} session warm-up returned {}; continuing",
                exit_signature(out.status)
            );
        }

        info!("started {kind} converter session profile={}", profile_dir.display());
        Ok(SofficeSession {
            kind,
            invocation,
            profile_dir,
            staging_dir,
        })
    }
}

#[derive(Debug, Clone)]
struct Invocation {
    exe: PathBuf,
    profile_url: String,
    extra_args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout_seconds: Option<u64>,
}

impl Invocation {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args([
            "--headless",
            "--invisible",
            "--norestore",
            "--nolockcheck",
            "--nodefault",
            "--nologo",
        ]);
        cmd.arg(format!("-env:UserInstallation={}", self.profile_url));
        cmd.args(&self.extra_args);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

pub struct SofficeSession {
    kind: DocumentKind,
    invocation: Invocation,
    profile_dir: PathBuf,
    staging_dir: PathBuf,
}

impl Session for SofficeSession {
    type Document = SofficeDocument;

    fn open(&mut self, input: &Path) -> Result<SofficeDocument, EngineError> {
        std::fs::metadata(input)
            .map_err(|e| EngineError::io(format!("open {}", input.display()), e))?;
        Ok(SofficeDocument {
            kind: self.kind,
            input: input.to_path_buf(),
            invocation: self.invocation.clone(),
            staging_dir: self.staging_dir.clone(),
            staged: None,
        })
    }

    fn quit(&mut self) -> Result<(), EngineError> {
        remove_dir_if_present(&self.staging_dir)
            .map_err(|e| EngineError::io(format!("remove {}", self.staging_dir.display()), e))?;
        remove_dir_if_present(&self.profile_dir)
            .map_err(|e| EngineError::io(format!("remove {}", self.profile_dir.display()), e))?;
        debug!("{} session quit", self.kind);
        Ok(())
    }

    fn release(&mut self) {
        debug!("{} session released", self.kind);
    }
}

pub struct SofficeDocument {
    kind: DocumentKind,
    input: PathBuf,
    invocation: Invocation,
    staging_dir: PathBuf,
    staged: Option<PathBuf>,
}

impl OpenDocument for SofficeDocument {
    fn save_as(&mut self, output: &Path, format: SaveFormat) -> Result<(), EngineError> {
        let SaveFormat::Pdf = format;
        let mut cmd = self.invocation.command();
        cmd.arg("--convert-to")
            .arg(format!("pdf:{}", pdf_filter(self.kind)))
            .arg("--outdir")
            .arg(&self.staging_dir)
            .arg(&self.input);
        debug!("soffice convert {} -> {}", self.input.display(), output.display());

        let out = run_with_timeout(cmd, &self.input, self.invocation.timeout_seconds)?;
        let staged = pdf_output_path(&self.staging_dir, &self.input);
        if !out.status.success() {
            // Some exit codes are raised after the PDF was written; keep it
            // so a forgiven fault still leaves the output in place.
            if staged.exists() {
                self.staged = Some(staged.clone());
                move_into_place(&staged, output)?;
                self.staged = None;
            }
            return Err(EngineError::Fault {
                signature: exit_signature(out.status),
                message: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        if !staged.exists() {
            return Err(EngineError::Fault {
                signature: "no output produced".into(),
                message: format!(
                    "{} {}",
                    String::from_utf8_lossy(&out.stdout).trim(),
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            });
        }
        self.staged = Some(staged.clone());
        move_into_place(&staged, output)?;
        self.staged = None;
        Ok(())
    }

    /// The source file is never modified, so there is nothing to discard;
    /// closing only clears a staged file left behind by a failed move.
    fn close(&mut self, _discard_changes: bool) -> Result<(), EngineError> {
        if let Some(staged) = self.staged.take() {
            if staged.exists() {
                std::fs::remove_file(&staged)
                    .map_err(|e| EngineError::io(format!("remove {}", staged.display()), e))?;
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        debug!("released document {}", self.input.display());
    }
}

fn pdf_filter(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::WordDocument => "writer_pdf_Export",
        DocumentKind::Presentation => "impress_pdf_Export",
    }
}

fn exit_signature(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn move_into_place(staged: &Path, output: &Path) -> Result<(), EngineError> {
    if output.exists() {
        std::fs::remove_file(output)
            .map_err(|e| EngineError::io(format!("replace {}", output.display()), e))?;
    }
    if std::fs::rename(staged, output).is_ok() {
        return Ok(());
    }
    // Staging and destination may sit on different filesystems.
    std::fs::copy(staged, output)
        .map_err(|e| EngineError::io(format!("write {}", output.display()), e))?;
    std::fs::remove_file(staged)
        .map_err(|e| EngineError::io(format!("remove {}", staged.display()), e))
}

fn file_url(path: &Path) -> String {
    let raw = path.display().to_string().replace('\\', "/");
    if raw.starts_with('/') {
        format!("file://{raw}")
    } else {
        format!("file:///{raw}")
    }
}

fn resolve_soffice_exe(raw: &str) -> Result<PathBuf, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("SOFFICE_PATH") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return Ok(p);
            }
        }
        for name in ["soffice", "libreoffice"] {
            if let Ok(p) = which::which(name) {
                return Ok(p);
            }
        }
        let bundle = PathBuf::from(MAC_BUNDLE_EXE);
        if bundle.exists() {
            return Ok(bundle);
        }
        return Err(EngineError::NotFound(
            "soffice (set converter.soffice_exe or SOFFICE_PATH)".into(),
        ));
    }
    let p = expand_tilde(raw);
    if p.components().count() > 1 {
        if p.exists() {
            return Ok(p);
        }
        return Err(EngineError::NotFound(p.display().to_string()));
    }
    which::which(&p).map_err(|_| EngineError::NotFound(raw.to_string()))
}

fn run_with_timeout(
    mut cmd: Command,
    subject: &Path,
    timeout_seconds: Option<u64>,
) -> Result<Output, EngineError> {
    let exe = PathBuf::from(cmd.get_program());
    // The launcher forks the real office process; a group lets a timeout
    // reach both.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|source| EngineError::Spawn { exe, source })?;

    match timeout_seconds {
        Some(secs) => wait_with_timeout(&mut child, subject, secs),
        None => child
            .wait_with_output()
            .map_err(|e| EngineError::io("waiting for soffice", e)),
    }
}

fn wait_with_timeout(child: &mut Child, subject: &Path, secs: u64) -> Result<Output, EngineError> {
    // Drain both pipes while waiting; a chatty child must not block on a full
    // pipe buffer.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let timeout = Duration::from_secs(secs);

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| EngineError::io("polling soffice", e))?
        {
            break status;
        }
        if start.elapsed() > timeout {
            warn!("soffice timed out after {:?} on {}", timeout, subject.display());
            kill_process_group(child);
            let _ = child.wait();
            // Not joined: a descendant outside the group may still hold the
            // pipes open.
            drop((stdout, stderr));
            return Err(EngineError::Timeout {
                input: subject.to_path_buf(),
                seconds: secs,
            });
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    Ok(Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall on a group created for this child.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}
