use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub converter: Converter,
    #[serde(default)]
    pub ingest: Ingest,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub diagnostics: Diagnostics,
    #[serde(default)]
    pub output: Output,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    /// Scratch space for converter profiles and staged output.
    pub work_dir: String,
    /// Used next to the first queued file when no destination is given.
    pub default_dest_subdir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            work_dir: ".docs2pdf-work".into(),
            default_dest_subdir: "PDF-Conversions".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Converter {
    pub soffice_exe: String,
    pub timeout_seconds: u64,
    pub start_timeout_seconds: u64,
    pub doctor_timeout_seconds: u64,
    /// Regexes matched against a fault signature; a match means the fault is
    /// reported by the engine although the document converted fine.
    pub benign_faults: Vec<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Converter {
    fn default() -> Self {
        Self {
            soffice_exe: "auto".into(),
            timeout_seconds: 300,
            start_timeout_seconds: 120,
            doctor_timeout_seconds: 60,
            benign_faults: vec!["^exit status 81$".into()],
            extra_args: Vec::new(),
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingest {
    pub expand_directories: bool,
}
impl Default for Ingest {
    fn default() -> Self {
        Self {
            expand_directories: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub enabled: bool,
    pub log_path: String,
    pub max_bytes: u64,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "docs2pdf-errors.log".into(),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub print_report: bool,
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            print_report: true,
            write_report_json: false,
            report_filename: "docs2pdf-report.json".into(),
        }
    }
}
