//! Text Extractor: turns uploaded resume blobs into plain text.
//!
//! Extraction never fails a request on its own: every fault drops the single
//! document and leaves a diagnostic behind. Only an empty batch is an error,
//! and that decision belongs to the pipeline.

use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ranking::models::{Diagnostic, DiagnosticKind, Document, DocumentKind, ExtractedResume};

const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type")]
    Unsupported,

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("DOCX container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("DOCX XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request bounds applied while extracting a batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_resumes: usize,
    pub max_chars: usize,
}

/// Resumes that yielded text, plus one diagnostic per dropped document.
#[derive(Debug, Default)]
pub struct ExtractedBatch {
    pub resumes: Vec<ExtractedResume>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Extracts text from every document in upload order.
///
/// Stops taking resumes once `max_resumes` usable ones are collected; the
/// rest of the upload is recorded as `batch_capped`.
pub fn extract_batch(documents: Vec<Document>, limits: &BatchLimits) -> ExtractedBatch {
    let mut batch = ExtractedBatch::default();
    let mut capped = 0usize;

    for (index, document) in documents.into_iter().enumerate() {
        let id = index as u32 + 1;

        if batch.resumes.len() >= limits.max_resumes {
            capped += 1;
            batch.diagnostics.push(Diagnostic::new(
                DiagnosticKind::BatchCapped,
                format!(
                    "resume #{id} ({}) excluded: at most {} resumes are ranked per request",
                    document.filename, limits.max_resumes
                ),
            ));
            continue;
        }

        let text = match extract_text(document.kind, &document.bytes) {
            Ok(text) => text,
            Err(ExtractError::Unsupported) => {
                debug!("Skipping unsupported document {}", document.filename);
                batch.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnsupportedDocument,
                    format!("resume #{id} ({}) has an unsupported file type", document.filename),
                ));
                continue;
            }
            Err(e) => {
                warn!("Failed to extract text from {}: {e}", document.filename);
                batch.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnreadableDocument,
                    format!("resume #{id} ({}) could not be read: {e}", document.filename),
                ));
                continue;
            }
        };

        if text.trim().is_empty() {
            warn!("No text extracted from {}", document.filename);
            batch.diagnostics.push(Diagnostic::new(
                DiagnosticKind::EmptyDocument,
                format!("resume #{id} ({}) contains no extractable text", document.filename),
            ));
            continue;
        }

        batch.resumes.push(ExtractedResume {
            id,
            filename: document.filename,
            text: truncate_chars(&text, limits.max_chars).to_string(),
        });
    }

    if capped > 0 {
        info!(
            "Resume cap of {} reached; {} further document(s) excluded",
            limits.max_resumes, capped
        );
    }

    batch
}

/// Best-effort text for a single document.
pub fn extract_text(kind: DocumentKind, bytes: &[u8]) -> Result<String, ExtractError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Docx => extract_docx(bytes),
        DocumentKind::Text => Ok(decode_text(bytes)),
        DocumentKind::Unknown => Err(ExtractError::Unsupported),
    }
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PDF
// ────────────────────────────────────────────────────────────────────────────

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract gives the better text layout but is all-or-nothing and can
    // panic on malformed fonts.
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => return Ok(text),
        Ok(Err(e)) => warn!("pdf-extract failed ({e}); salvaging page by page"),
        Err(_) => warn!("pdf-extract panicked; salvaging page by page"),
    }

    panic::catch_unwind(AssertUnwindSafe(|| salvage_pdf_pages(bytes)))
        .unwrap_or_else(|_| Err(ExtractError::Pdf("PDF parser panicked".to_string())))
}

/// Extracts each page independently so one broken page only loses its own text.
fn salvage_pdf_pages(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut text = String::new();
    for page_number in doc.get_pages().into_keys() {
        match panic::catch_unwind(AssertUnwindSafe(|| doc.extract_text(&[page_number]))) {
            Ok(Ok(page_text)) => text.push_str(&page_text),
            Ok(Err(e)) => warn!("Skipping unreadable PDF page {page_number}: {e}"),
            Err(_) => warn!("Skipping PDF page {page_number} after parser panic"),
        }
    }
    Ok(text)
}

// ────────────────────────────────────────────────────────────────────────────
// DOCX
// ────────────────────────────────────────────────────────────────────────────

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive.by_name(DOCX_BODY_PART)?.read_to_string(&mut xml)?;
    Ok(docx_paragraphs(&xml)?.join("\n"))
}

/// Paragraph texts of a WordprocessingML body, in document order.
fn docx_paragraphs(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    // Text boxes nest paragraphs inside paragraphs; they are folded into the outer one.
    let mut depth = 0usize;
    // Tabs and breaks only count inside a run; `w:pPr` also holds tab-stop definitions.
    let mut run_depth = 0usize;
    let mut in_text_run = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => depth += 1,
                b"w:r" => run_depth += 1,
                b"w:t" => in_text_run = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" if depth == 0 => paragraphs.push(String::new()),
                b"w:tab" if depth > 0 && run_depth > 0 => current.push('\t'),
                b"w:br" | b"w:cr" if depth > 0 && run_depth > 0 => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text_run && depth > 0 => current.push_str(&t.unescape()?),
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:r" => run_depth = run_depth.saturating_sub(1),
                b"w:p" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

// ────────────────────────────────────────────────────────────────────────────
// Plain text
// ────────────────────────────────────────────────────────────────────────────

/// UTF-8 decode that discards undecodable sequences instead of failing.
fn decode_text(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}
