//! Word documents: detection and best-effort local text extraction.
//!
//! A `.docx` file is a zip archive whose body lives in `word/document.xml`.
//! Text runs sit inside `<w:t>` elements and paragraphs are `<w:p>`, which is
//! enough structure to hand the model readable text without a full OOXML
//! parser. Legacy binary `.doc` files are not parsed; extraction simply fails
//! and the caller continues without text.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use tracing::{debug, warn};

/// Whether a file is a Word document, by MIME type or extension.
pub fn is_word_document(mime_type: &str, file_name: &str) -> bool {
    let name = file_name.to_ascii_lowercase();
    mime_type.contains("wordprocessingml")
        || mime_type.contains("msword")
        || name.ends_with(".docx")
        || name.ends_with(".doc")
}

static RE_DOCX_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:p[\s>/]|<w:tab\s*/>|<w:br\s*/>").unwrap()
});

/// Extract plain text from `.docx` bytes.
pub fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractError::ExtractionFailure(format!("Invalid DOCX archive: {e}")))?;

    let mut doc_xml = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::ExtractionFailure("No document.xml found in DOCX".into()))?;

    let mut xml = String::new();
    doc_xml
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::ExtractionFailure(format!("Failed to read document.xml: {e}")))?;

    Ok(plaintext_from_document_xml(&xml))
}

/// Non-fatal wrapper: log the failure and carry on without text.
pub fn try_extract_text(bytes: &[u8], file_name: &str) -> Option<String> {
    match extract_docx_text(bytes) {
        Ok(text) if !text.trim().is_empty() => {
            debug!("Extracted {} chars of text from '{}'", text.len(), file_name);
            Some(text)
        }
        Ok(_) => {
            warn!("No text found in '{}'; continuing without extracted text", file_name);
            None
        }
        Err(e) => {
            warn!("Text extraction failed for '{}': {}; continuing without extracted text", file_name, e);
            None
        }
    }
}

fn plaintext_from_document_xml(xml: &str) -> String {
    let mut out = String::new();
    for caps in RE_DOCX_TOKEN.captures_iter(xml) {
        if let Some(run) = caps.get(1) {
            out.push_str(&decode_entities(run.as_str()));
            continue;
        }
        let token = &caps[0];
        if token.starts_with("<w:p") {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
        } else if token.starts_with("<w:tab") {
            out.push('\t');
        } else {
            out.push('\n');
        }
    }
    out.trim().to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
