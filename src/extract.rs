//! Document loading: uploaded file → text [`Segment`]s.
//!
//! Dispatch is by file-name extension over a closed set of loaders
//! ([`LoaderKind`]). PDF yields one segment per page, DOCX one segment for the
//! whole document, and presentations (PPTX) one segment per slide. Anything
//! else maps to [`LoaderKind::Unsupported`] and is reported, never silently
//! dropped.

use std::io::Read;

use quick_xml::events::Event;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Segment, UploadedFile};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Why a file produced no segments.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unsupported file type '{0}' (supported: pdf, docx, pptx)")]
    Unsupported(String),
    #[error("presentation support is disabled (set loader.enable_presentations = true)")]
    PresentationsDisabled,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("no extractable text")]
    Empty,
}

/// Loader selected from a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderKind {
    Pdf,
    Docx,
    Presentation,
    /// Carries the lowercased extension (empty when the name has none).
    Unsupported(String),
}

impl LoaderKind {
    pub fn from_file_name(name: &str) -> Self {
        let ext = std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => LoaderKind::Pdf,
            "docx" => LoaderKind::Docx,
            "pptx" => LoaderKind::Presentation,
            _ => LoaderKind::Unsupported(ext),
        }
    }

    /// Extract segments from `bytes`, labelling each with `source`.
    pub fn extract(&self, source: &str, bytes: &[u8]) -> Result<Vec<Segment>, LoadError> {
        let pages: Vec<(Option<u32>, String)> = match self {
            LoaderKind::Pdf => extract_pdf_pages(bytes)?
                .into_iter()
                .enumerate()
                .map(|(i, text)| (Some(i as u32 + 1), text))
                .collect(),
            LoaderKind::Docx => vec![(None, extract_docx(bytes)?)],
            LoaderKind::Presentation => extract_pptx_slides(bytes)?
                .into_iter()
                .map(|(n, text)| (Some(n), text))
                .collect(),
            LoaderKind::Unsupported(ext) => return Err(LoadError::Unsupported(ext.clone())),
        };

        let segments: Vec<Segment> = pages
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(page, text)| Segment {
                source: source.to_string(),
                page,
                text,
            })
            .collect();

        if segments.is_empty() {
            return Err(LoadError::Empty);
        }
        Ok(segments)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub enable_presentations: bool,
}

/// A file that contributed no segments, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Outcome of loading a batch of files.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub segments: Vec<Segment>,
    pub skipped: Vec<SkippedFile>,
}

/// Load one file. Presentations are rejected unless enabled in `options`.
pub fn load_file(file: &UploadedFile, options: LoadOptions) -> Result<Vec<Segment>, LoadError> {
    let kind = LoaderKind::from_file_name(&file.name);
    if kind == LoaderKind::Presentation && !options.enable_presentations {
        return Err(LoadError::PresentationsDisabled);
    }
    kind.extract(&file.name, &file.bytes)
}

/// Load every file; failures are collected per file and never abort the batch.
pub fn load_documents(files: &[UploadedFile], options: LoadOptions) -> LoadReport {
    let mut report = LoadReport::default();
    for file in files {
        match load_file(file, options) {
            Ok(segments) => {
                debug!(file = %file.name, segments = segments.len(), "extracted segments");
                report.segments.extend(segments);
            }
            Err(e) => {
                warn!(file = %file.name, "skipping file: {}", e);
                report.skipped.push(SkippedFile {
                    name: file.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| LoadError::Pdf(e.to_string()))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, LoadError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| LoadError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, LoadError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| LoadError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| LoadError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(LoadError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, LoadError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    // Word paragraphs become blank-line separated so the chunker sees them.
    extract_ooxml_text(&xml, b"p", "\n\n")
}

/// Returns `(slide number, text)` in slide order.
fn extract_pptx_slides(bytes: &[u8]) -> Result<Vec<(u32, String)>, LoadError> {
    let mut archive = open_archive(bytes)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|n| {
            n.strip_prefix("ppt/slides/slide")
                .and_then(|rest| rest.strip_suffix(".xml"))
                .and_then(|num| num.parse::<u32>().ok())
                .map(|num| (num, n.to_string()))
        })
        .collect();
    slides.sort_by_key(|(num, _)| *num);

    let mut out = Vec::with_capacity(slides.len());
    for (num, name) in slides {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        out.push((num, extract_ooxml_text(&xml, b"p", "\n")?));
    }
    Ok(out)
}

/// Collect `<*:t>` text runs. `paragraph` is the local name of the paragraph
/// element; `paragraph_break` is appended when one closes.
fn extract_ooxml_text(
    xml: &[u8],
    paragraph: &[u8],
    paragraph_break: &str,
) -> Result<String, LoadError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == paragraph && !out.is_empty() {
                    out.push_str(paragraph_break);
                }
            }
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| LoadError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_by_extension_is_case_insensitive() {
        assert_eq!(LoaderKind::from_file_name("a.PDF"), LoaderKind::Pdf);
        assert_eq!(LoaderKind::from_file_name("dir/b.docx"), LoaderKind::Docx);
        assert_eq!(LoaderKind::from_file_name("c.pptx"), LoaderKind::Presentation);
        assert_eq!(
            LoaderKind::from_file_name("notes.txt"),
            LoaderKind::Unsupported("txt".into())
        );
        assert_eq!(
            LoaderKind::from_file_name("README"),
            LoaderKind::Unsupported(String::new())
        );
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = LoaderKind::from_file_name("x.txt")
            .extract("x.txt", b"foo")
            .unwrap_err();
        assert!(matches!(err, LoadError::Unsupported(ext) if ext == "txt"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = LoaderKind::Pdf.extract("a.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, LoadError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = LoaderKind::Docx.extract("a.docx", b"not a zip").unwrap_err();
        assert!(matches!(err, LoadError::Ooxml(_)));
    }

    #[test]
    fn docx_paragraphs_are_separated_by_blank_lines() {
        let xml = br#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = extract_ooxml_text(xml, b"p", "\n\n").unwrap();
        assert_eq!(text, "Hello world\n\nSecond & last");
    }

    #[test]
    fn presentations_are_gated() {
        let file = UploadedFile::new("deck.pptx", b"irrelevant".to_vec());
        let err = load_file(&file, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::PresentationsDisabled));
    }

    #[test]
    fn batch_load_reports_each_skipped_file() {
        let files = vec![
            UploadedFile::new("deck.pptx", Vec::new()),
            UploadedFile::new("notes.txt", b"plain".to_vec()),
        ];
        let report = load_documents(&files, LoadOptions::default());
        assert!(report.segments.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].name, "deck.pptx");
        assert!(report.skipped[1].reason.contains("unsupported"));
    }
}
