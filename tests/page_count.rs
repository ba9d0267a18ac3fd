use docs2pdf::document::{self, DocumentEntry, DocumentKind, UNKNOWN_PAGES};
use docs2pdf::error::IngestError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;

fn write_package(path: &Path, parts: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, body) in parts {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn app_xml(pages: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties"><Template>Normal.dotm</Template><TotalTime>4</TotalTime><Pages>{pages}</Pages><Words>812</Words></Properties>"#
    )
}

fn ingest(path: &Path) -> DocumentEntry {
    DocumentEntry::ingest(path).unwrap().expect("supported kind")
}

#[test]
fn legacy_containers_report_unknown_and_empty_label() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["old.ppt", "old.doc", "OLD.PPT", "legacy.pot.ppt"] {
        let path = tmp.path().join(name);
        std::fs::write(&path, b"\xD0\xCF\x11\xE0 not a zip").unwrap();
        let entry = ingest(&path);
        assert_eq!(entry.page_count(), UNKNOWN_PAGES, "{name}");
        assert_eq!(entry.page_label(), "", "{name}");
    }
}

#[test]
fn presentation_counts_slide_parts() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("deck.pptx");
    write_package(
        &path,
        &[
            ("[Content_Types].xml", "<Types/>"),
            ("ppt/presentation.xml", "<p:presentation/>"),
            ("ppt/slides/slide1.xml", "<p:sld/>"),
            ("ppt/slides/slide2.xml", "<p:sld/>"),
            ("ppt/slides/slide3.xml", "<p:sld/>"),
            ("ppt/slides/_rels/slide1.xml.rels", "<Relationships/>"),
            ("ppt/slideLayouts/slideLayout1.xml", "<p:sldLayout/>"),
            ("ppt/notesSlides/notesSlide1.xml", "<p:notes/>"),
        ],
    );
    let entry = ingest(&path);
    assert_eq!(entry.kind(), DocumentKind::Presentation);
    assert_eq!(entry.page_count(), 3);
    assert_eq!(entry.page_label(), "| 3 Slide(s)");
}

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn rels(entries: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (i, (rel_type, target)) in entries.iter().enumerate() {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{REL_NS}/{rel_type}" Target="{target}"/>"#,
            i + 1
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

#[test]
fn presentation_counts_linked_slides_only() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("linked.pptx");
    let root = rels(&[("officeDocument", "ppt/presentation.xml")]);
    let presentation = rels(&[
        ("slideMaster", "slideMasters/slideMaster1.xml"),
        ("slide", "slides/intro.xml"),
        ("slide", "slides/slide1.xml"),
        ("theme", "theme/theme1.xml"),
    ]);
    write_package(
        &path,
        &[
            ("_rels/.rels", root.as_str()),
            ("ppt/presentation.xml", "<p:presentation/>"),
            ("ppt/_rels/presentation.xml.rels", presentation.as_str()),
            ("ppt/slides/intro.xml", "<p:sld/>"),
            ("ppt/slides/slide1.xml", "<p:sld/>"),
            // Left behind by an editor; nothing links to it.
            ("ppt/slides/slide9.xml", "<p:sld/>"),
            ("ppt/slideMasters/slideMaster1.xml", "<p:sldMaster/>"),
        ],
    );
    assert_eq!(ingest(&path).page_count(), 2);
}

#[test]
fn presentation_part_found_through_package_relationships() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("moved.pptx");
    let root = rels(&[("officeDocument", "deck/main.xml")]);
    let presentation = rels(&[
        ("slide", "pages/a.xml"),
        ("slide", "pages/b.xml"),
        ("slide", "pages/c.xml"),
        // Dangling link: no such part.
        ("slide", "pages/d.xml"),
    ]);
    write_package(
        &path,
        &[
            ("_rels/.rels", root.as_str()),
            ("deck/main.xml", "<p:presentation/>"),
            ("deck/_rels/main.xml.rels", presentation.as_str()),
            ("deck/pages/a.xml", "<p:sld/>"),
            ("deck/pages/b.xml", "<p:sld/>"),
            ("deck/pages/c.xml", "<p:sld/>"),
        ],
    );
    assert_eq!(ingest(&path).page_count(), 3);
}

#[test]
fn macro_enabled_presentation_is_a_package() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("Macro.PPTM");
    write_package(&path, &[("ppt/slides/slide1.xml", "<p:sld/>")]);
    assert_eq!(ingest(&path).page_count(), 1);
}

#[test]
fn word_document_trusts_declared_pages() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("report.docx");
    write_package(
        &path,
        &[
            ("word/document.xml", "<w:document/>"),
            ("docProps/app.xml", app_xml("7").as_str()),
        ],
    );
    let entry = ingest(&path);
    assert_eq!(entry.kind(), DocumentKind::WordDocument);
    assert_eq!(entry.page_count(), 7);
    assert_eq!(entry.page_label(), "| 7 Page(s)");
}

#[test]
fn word_document_follows_extended_properties_relationship() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("relocated.docx");
    let root = rels(&[
        ("officeDocument", "word/document.xml"),
        ("extended-properties", "meta/properties.xml"),
    ]);
    write_package(
        &path,
        &[
            ("_rels/.rels", root.as_str()),
            ("word/document.xml", "<w:document/>"),
            ("meta/properties.xml", app_xml("4").as_str()),
            ("docProps/app.xml", app_xml("99").as_str()),
        ],
    );
    assert_eq!(ingest(&path).page_count(), 4);
}

#[test]
fn word_document_falls_back_to_conventional_properties() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("stale-rels.docx");
    let root = rels(&[("extended-properties", "docProps/missing.xml")]);
    write_package(
        &path,
        &[("_rels/.rels", root.as_str()), ("docProps/app.xml", app_xml("11").as_str())],
    );
    assert_eq!(ingest(&path).page_count(), 11);
}

#[test]
fn word_document_without_pages_counts_zero() {
    let tmp = tempfile::tempdir().unwrap();

    let no_props = tmp.path().join("bare.docx");
    write_package(&no_props, &[("word/document.xml", "<w:document/>")]);
    assert_eq!(ingest(&no_props).page_count(), 0);

    let garbled = tmp.path().join("garbled.docx");
    write_package(&garbled, &[("docProps/app.xml", app_xml("many").as_str())]);
    assert_eq!(ingest(&garbled).page_count(), 0);
    assert_eq!(ingest(&garbled).page_label(), "| 0 Page(s)");
}

#[test]
fn entry_records_size_and_absolute_path() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("memo.doc");
    std::fs::write(&path, vec![0u8; 2048]).unwrap();
    let entry = ingest(&path);
    assert_eq!(entry.size_bytes(), 2048);
    assert_eq!(entry.size_label(), "2.0 KB");
    assert!(entry.path().is_absolute());
    assert_eq!(entry.name(), "memo.doc");
}

#[test]
fn unsupported_files_are_skipped_not_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("budget.xlsx");
    std::fs::write(&path, b"x").unwrap();
    assert!(DocumentEntry::ingest(&path).unwrap().is_none());
}

#[test]
fn corrupt_package_fails_ingestion() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("broken.docx");
    std::fs::write(&path, b"this is not a zip archive").unwrap();
    let err = DocumentEntry::ingest(&path).unwrap_err();
    assert!(matches!(err, IngestError::InvalidPackage { .. }));
    assert!(!err.is_expected());
}

#[test]
fn missing_file_fails_ingestion() {
    let tmp = tempfile::tempdir().unwrap();
    let err = DocumentEntry::ingest(&tmp.path().join("gone.pptx")).unwrap_err();
    assert!(matches!(err, IngestError::Path(_)));
}

#[test]
fn ingest_all_reports_failures_per_file() {
    let tmp = tempfile::tempdir().unwrap();
    let bad = tmp.path().join("broken.pptx");
    let good = tmp.path().join("slides.ppt");
    let other = tmp.path().join("notes.txt");
    std::fs::write(&bad, b"nope").unwrap();
    std::fs::write(&good, b"legacy").unwrap();
    std::fs::write(&other, b"text").unwrap();

    let paths: Vec<PathBuf> = vec![bad.clone(), good, other.clone()];
    let summary = document::ingest_all(&paths);
    assert_eq!(summary.entries.len(), 1);
    assert_eq!(summary.entries[0].name(), "slides.ppt");
    assert_eq!(summary.skipped, vec![other]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].0, bad);
}
