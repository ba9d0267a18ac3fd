use crate::{
    document::{DocumentKind, UNKNOWN_PAGES},
    error::{IngestError, PathError},
};
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;
use zip::{result::ZipError, ZipArchive};

pub(crate) type PackageCounter = fn(&mut ZipArchive<File>, &Path) -> Result<i64, IngestError>;

const APP_PROPERTIES_PART: &str = "docProps/app.xml";
const PRESENTATION_PART: &str = "ppt/presentation.xml";

const OFFICE_DOCUMENT_REL: &str = "/relationships/officeDocument";
const EXTENDED_PROPERTIES_REL: &str = "/relationships/extended-properties";
const SLIDE_REL: &str = "/relationships/slide";

static SLIDE_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ppt/slides/slide\d+\.xml$").expect("static regex"));

static PAGES_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:\w+:)?Pages>\s*([^<]*?)\s*</(?:\w+:)?Pages>").expect("static regex")
});

static RELATIONSHIP_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:\w+:)?Relationship\b([^>]*)>").expect("static regex"));

static XML_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w:]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex")
});

/// Page (or slide) count for `path` without starting a converter.
///
/// Legacy binary containers are never opened and report [`UNKNOWN_PAGES`].
/// Package containers are opened read-only and closed before returning.
pub fn count(path: &Path, kind: DocumentKind) -> Result<i64, IngestError> {
    let profile = kind.profile();
    if !profile.is_package(path) {
        debug!("legacy container, page count unknown: {}", path.display());
        return Ok(UNKNOWN_PAGES);
    }

    let mut archive = open_package(path)?;
    (profile.count_pages)(&mut archive, path)
}

fn open_package(path: &Path) -> Result<ZipArchive<File>, IngestError> {
    let file = File::open(path).map_err(|e| PathError::from_io(path, e))?;
    ZipArchive::new(file).map_err(|source| IngestError::InvalidPackage {
        path: path.to_path_buf(),
        source,
    })
}

/// Counts the slides the presentation part links to. Packages without a
/// presentation relationships part fall back to the conventional slide names.
pub(crate) fn count_slides(archive: &mut ZipArchive<File>, path: &Path) -> Result<i64, IngestError> {
    let presentation = related_part(archive, path, "", OFFICE_DOCUMENT_REL)?
        .unwrap_or_else(|| PRESENTATION_PART.to_string());

    let Some(rels) = read_part(archive, path, &rels_part_for(&presentation))? else {
        debug!("no presentation relationships in {}", path.display());
        let slides = archive
            .file_names()
            .filter(|name| SLIDE_PART.is_match(name))
            .count();
        return Ok(slides as i64);
    };

    let parts: HashSet<&str> = archive.file_names().collect();
    let slides = relationships(&rels)
        .into_iter()
        .filter(|rel| !rel.external && rel.rel_type.ends_with(SLIDE_REL))
        .map(|rel| resolve_target(&presentation, &rel.target))
        .filter(|part| parts.contains(part.as_str()))
        .count();
    Ok(slides as i64)
}

/// Trusts the page count stored in the extended properties part; a missing
/// or unreadable value counts as zero.
pub(crate) fn count_word_pages(
    archive: &mut ZipArchive<File>,
    path: &Path,
) -> Result<i64, IngestError> {
    let part = related_part(archive, path, "", EXTENDED_PROPERTIES_REL)?
        .filter(|part| archive.file_names().any(|name| name == part))
        .unwrap_or_else(|| APP_PROPERTIES_PART.to_string());

    let Some(xml) = read_part(archive, path, &part)? else {
        return Ok(0);
    };
    Ok(parse_declared_pages(&xml).unwrap_or(0))
}

/// `None` when the part is absent or not readable text.
fn read_part(
    archive: &mut ZipArchive<File>,
    path: &Path,
    name: &str,
) -> Result<Option<String>, IngestError> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(source) => {
            return Err(IngestError::InvalidPackage {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let mut xml = String::new();
    if part.read_to_string(&mut xml).is_err() {
        debug!("unreadable part {name} in {}", path.display());
        return Ok(None);
    }
    Ok(Some(xml))
}

#[derive(Debug, PartialEq, Eq)]
struct Relationship {
    rel_type: String,
    target: String,
    external: bool,
}

fn relationships(xml: &str) -> Vec<Relationship> {
    RELATIONSHIP_ELEMENT
        .captures_iter(xml)
        .filter_map(|caps| {
            let mut rel_type = None;
            let mut target = None;
            let mut external = false;
            for attr in XML_ATTRIBUTE.captures_iter(caps.get(1)?.as_str()) {
                let value = attr.get(2).or_else(|| attr.get(3))?.as_str();
                match &attr[1] {
                    "Type" => rel_type = Some(value.to_string()),
                    "Target" => target = Some(value.to_string()),
                    "TargetMode" => external = value == "External",
                    _ => {}
                }
            }
            Some(Relationship {
                rel_type: rel_type?,
                target: target?,
                external,
            })
        })
        .collect()
}

/// Target of the first internal relationship of `rel_suffix` type owned by
/// `source_part` (`""` is the package root).
fn related_part(
    archive: &mut ZipArchive<File>,
    path: &Path,
    source_part: &str,
    rel_suffix: &str,
) -> Result<Option<String>, IngestError> {
    let Some(rels) = read_part(archive, path, &rels_part_for(source_part))? else {
        return Ok(None);
    };
    Ok(relationships(&rels)
        .into_iter()
        .find(|rel| !rel.external && rel.rel_type.ends_with(rel_suffix))
        .map(|rel| resolve_target(source_part, &rel.target)))
}

/// `dir/name` -> `dir/_rels/name.rels`; the package root maps to `_rels/.rels`.
fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolves a relationship target against the directory of its source part.
fn resolve_target(source_part: &str, target: &str) -> String {
    let base = match target.strip_prefix('/') {
        Some(_) => "",
        None => source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""),
    };
    let mut segments: Vec<&str> = Vec::new();
    for seg in base.split('/').chain(target.trim_start_matches('/').split('/')) {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            seg => segments.push(seg),
        }
    }
    segments.join("/")
}

fn parse_declared_pages(xml: &str) -> Option<i64> {
    let caps = PAGES_ELEMENT.captures(xml)?;
    caps.get(1)?.as_str().parse::<u32>().ok().map(i64::from)
}
