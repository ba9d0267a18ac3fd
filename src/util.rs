use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// `dest/<file stem>.pdf`; whatever extension the input had is replaced.
pub fn pdf_output_path(dest: &Path, input: &Path) -> PathBuf {
    let name = input.file_name().map(PathBuf::from).unwrap_or_default();
    dest.join(name.with_extension("pdf"))
}

/// Removes a directory tree, treating "already gone" as success.
pub fn remove_dir_if_present(p: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(p) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
