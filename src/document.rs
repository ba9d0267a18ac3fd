use crate::{
    error::{IngestError, PathError},
    page_count::{self, PackageCounter},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Page count reported when a document cannot be inspected cheaply.
pub const UNKNOWN_PAGES: i64 = -1;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentKind {
    WordDocument,
    Presentation,
}

/// Per-kind behavior: how a file is recognized, which containers can be
/// inspected, how pages are counted and how the count is labelled.
pub(crate) struct KindProfile {
    pub kind: DocumentKind,
    pub marker: &'static str,
    pub package_extensions: &'static [&'static str],
    pub count_pages: PackageCounter,
    pub page_unit: &'static str,
}

impl KindProfile {
    pub fn is_package(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.package_extensions
                    .iter()
                    .any(|p| ext.eq_ignore_ascii_case(p))
            })
            .unwrap_or(false)
    }
}

// Order matters: presentations are recognized first.
static PROFILES: [KindProfile; 2] = [
    KindProfile {
        kind: DocumentKind::Presentation,
        marker: ".ppt",
        package_extensions: &["pptx", "pptm"],
        count_pages: page_count::count_slides,
        page_unit: "Slide(s)",
    },
    KindProfile {
        kind: DocumentKind::WordDocument,
        marker: ".doc",
        package_extensions: &["docx", "docm"],
        count_pages: page_count::count_word_pages,
        page_unit: "Page(s)",
    },
];

impl DocumentKind {
    /// Classifies a file by the kind marker in its file name (`.ppt*`,
    /// `.doc*`). Returns `None` for anything else.
    pub fn classify(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        PROFILES
            .iter()
            .find(|p| name.contains(p.marker))
            .map(|p| p.kind)
    }

    pub(crate) fn profile(self) -> &'static KindProfile {
        match self {
            DocumentKind::Presentation => &PROFILES[0],
            DocumentKind::WordDocument => &PROFILES[1],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::WordDocument => "word",
            DocumentKind::Presentation => "presentation",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued file. Fields are fixed at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEntry {
    path: PathBuf,
    size_bytes: u64,
    kind: DocumentKind,
    page_count: i64,
}

impl DocumentEntry {
    /// Classifies, sizes and page-counts `path`.
    ///
    /// Returns `Ok(None)` when the file is not a supported document kind.
    pub fn ingest(path: &Path) -> Result<Option<Self>, IngestError> {
        let Some(kind) = DocumentKind::classify(path) else {
            debug!("skipping unsupported file {}", path.display());
            return Ok(None);
        };

        let path = std::path::absolute(path).map_err(|e| PathError::from_io(path, e))?;
        let size_bytes = {
            let file = File::open(&path).map_err(|e| PathError::from_io(&path, e))?;
            let meta = file.metadata().map_err(|e| PathError::from_io(&path, e))?;
            if meta.is_dir() {
                return Err(PathError::unsupported(&path, "is a directory").into());
            }
            meta.len()
        };
        let page_count = page_count::count(&path, kind)?;

        Ok(Some(Self {
            path,
            size_bytes,
            kind,
            page_count,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn page_count(&self) -> i64 {
        self.page_count
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn size_label(&self) -> String {
        size_label(self.size_bytes)
    }

    pub fn page_label(&self) -> String {
        page_label(self.kind, self.page_count)
    }
}

pub fn size_label(size_bytes: u64) -> String {
    if size_bytes < MIB {
        format!("{:.1} KB", size_bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", size_bytes as f64 / MIB as f64)
    }
}

/// Empty for an unknown count, never "0 pages".
pub fn page_label(kind: DocumentKind, page_count: i64) -> String {
    if page_count < 0 {
        return String::new();
    }
    format!("| {} {}", page_count, kind.profile().page_unit)
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub entries: Vec<DocumentEntry>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, IngestError)>,
}

/// Ingests each path independently. A failing file is reported and does not
/// stop the remaining adds.
pub fn ingest_all(paths: &[PathBuf]) -> IngestSummary {
    let mut summary = IngestSummary::default();
    for path in paths {
        match DocumentEntry::ingest(path) {
            Ok(Some(entry)) => {
                debug!(
                    "queued {} kind={} pages={} size={}",
                    entry.path().display(),
                    entry.kind(),
                    entry.page_count(),
                    entry.size_label()
                );
                summary.entries.push(entry);
            }
            Ok(None) => summary.skipped.push(path.clone()),
            Err(err) => {
                warn!("cannot add {}: {err}", path.display());
                summary.failures.push((path.clone(), err));
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_name_marker() {
        assert_eq!(
            DocumentKind::classify(Path::new("/a/Deck.PPTX")),
            Some(DocumentKind::Presentation)
        );
        assert_eq!(
            DocumentKind::classify(Path::new("report.doc")),
            Some(DocumentKind::WordDocument)
        );
        assert_eq!(
            DocumentKind::classify(Path::new("Minutes.DOCM")),
            Some(DocumentKind::WordDocument)
        );
        assert_eq!(DocumentKind::classify(Path::new("template.dotx")), None);
        assert_eq!(DocumentKind::classify(Path::new("sheet.xlsx")), None);
        assert_eq!(DocumentKind::classify(Path::new("dir.doc/readme.txt")), None);
    }

    #[test]
    fn size_label_switches_to_mb_at_one_mib() {
        assert_eq!(size_label(0), "0.0 KB");
        assert_eq!(size_label(1536), "1.5 KB");
        assert_eq!(size_label(MIB - 1), "1024.0 KB");
        assert_eq!(size_label(MIB), "1.0 MB");
        assert_eq!(size_label(5 * MIB / 2), "2.5 MB");
    }

    #[test]
    fn page_label_per_kind() {
        assert_eq!(page_label(DocumentKind::Presentation, 12), "| 12 Slide(s)");
        assert_eq!(page_label(DocumentKind::WordDocument, 0), "| 0 Page(s)");
        assert_eq!(page_label(DocumentKind::WordDocument, UNKNOWN_PAGES), "");
    }

    #[test]
    fn package_extensions_are_case_insensitive() {
        let p = DocumentKind::Presentation.profile();
        assert!(p.is_package(Path::new("a.PPTX")));
        assert!(!p.is_package(Path::new("a.ppt")));
        let w = DocumentKind::WordDocument.profile();
        assert!(w.is_package(Path::new("a.Docx")));
        assert!(!w.is_package(Path::new("a.doc")));
    }
}
