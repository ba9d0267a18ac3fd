use crate::document::DocumentKind;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(target_os = "linux")]
const NAME_TOO_LONG: Option<i32> = Some(36);
#[cfg(target_os = "macos")]
const NAME_TOO_LONG: Option<i32> = Some(63);
#[cfg(windows)]
const NAME_TOO_LONG: Option<i32> = Some(206);
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
const NAME_TOO_LONG: Option<i32> = None;

/// Filesystem failures that callers map to distinct user-facing messages.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path too long: {path}")]
    PathTooLong {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("access denied: {path}")]
    Unauthorized {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported path '{path}': {reason}")]
    UnsupportedPath { path: PathBuf, reason: String },
}

impl PathError {
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if NAME_TOO_LONG.is_some() && source.raw_os_error() == NAME_TOO_LONG {
            return PathError::PathTooLong { path, source };
        }
        match source.kind() {
            io::ErrorKind::PermissionDenied => PathError::Unauthorized { path, source },
            io::ErrorKind::InvalidInput => PathError::UnsupportedPath {
                path,
                reason: source.to_string(),
            },
            _ => PathError::Io { path, source },
        }
    }

    pub fn unsupported(path: &Path, reason: impl Into<String>) -> Self {
        PathError::UnsupportedPath {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            PathError::PathTooLong { path, .. }
            | PathError::Unauthorized { path, .. }
            | PathError::Io { path, .. }
            | PathError::UnsupportedPath { path, .. } => path,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PathError::PathTooLong { .. } => FailureKind::PathTooLong,
            PathError::Unauthorized { .. } => FailureKind::Unauthorized,
            PathError::Io { .. } => FailureKind::IoFailure,
            PathError::UnsupportedPath { .. } => FailureKind::UnsupportedPath,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("not a readable document package: {path}")]
    InvalidPackage {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl IngestError {
    /// Path length and permission problems are reported to the user as-is;
    /// everything else is unexpected and belongs in the diagnostic log.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            IngestError::Path(PathError::PathTooLong { .. })
                | IngestError::Path(PathError::Unauthorized { .. })
        )
    }
}

/// Faults raised by a converter engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("converter executable not found: {0}")]
    NotFound(String),

    #[error("failed to launch converter {exe}")]
    Spawn {
        exe: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("converter exceeded timeout ({seconds}s) on {input}")]
    Timeout { input: PathBuf, seconds: u64 },

    #[error("converter fault [{signature}]: {message}")]
    Fault { signature: String, message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        EngineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Stable identifier used to match a fault against the benign allow-list.
    pub fn signature(&self) -> Option<&str> {
        match self {
            EngineError::Fault { signature, .. } => Some(signature),
            _ => None,
        }
    }
}

/// Faults that end a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot provision destination directory")]
    Provision(#[from] PathError),

    #[error("failed to start the {kind} converter")]
    Start {
        kind: DocumentKind,
        #[source]
        source: EngineError,
    },

    #[error("conversion failed for item {index} ({path})")]
    Conversion {
        index: usize,
        path: PathBuf,
        #[source]
        source: EngineError,
    },
}

impl BatchError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            BatchError::Provision(err) => err.failure_kind(),
            BatchError::Start { .. } => FailureKind::ConverterStart,
            BatchError::Conversion { .. } => FailureKind::ConversionFault,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            BatchError::Provision(_) => "ProvisionError",
            BatchError::Start { .. } => "ConverterStartError",
            BatchError::Conversion { .. } => "ConversionFault",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    PathTooLong,
    Unauthorized,
    IoFailure,
    UnsupportedPath,
    ConverterStart,
    ConversionFault,
}

impl FailureKind {
    pub fn describe(self) -> &'static str {
        match self {
            FailureKind::PathTooLong => "the output folder path is too long",
            FailureKind::Unauthorized => "access to the output folder was denied",
            FailureKind::IoFailure => "the output folder could not be created",
            FailureKind::UnsupportedPath => "the output folder path is invalid",
            FailureKind::ConverterStart => "the document converter could not be started",
            FailureKind::ConversionFault => "a document could not be converted",
        }
    }
}
