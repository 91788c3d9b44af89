//! File encoding: raw bytes → base64 payload with MIME type and display name.
//!
//! The model API accepts documents and images as base64 strings embedded in
//! the JSON request body, so every inline payload passes through here.

use crate::error::ExtractError;
use crate::model::DEFAULT_MIME_TYPE;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// A file as selected by the user, before encoding.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub bytes: Vec<u8>,
    /// MIME type as reported by the caller, if known.
    pub mime_type: Option<String>,
    pub name: String,
}

impl FileInput {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.map(str::to_string),
            name: name.into(),
        }
    }

    /// The MIME type, defaulting to `application/octet-stream`.
    pub fn mime_or_default(&self) -> &str {
        self.mime_type
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MIME_TYPE)
    }
}

/// Base64 payload ready for a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFile {
    pub data: String,
    pub mime_type: String,
    pub display_name: String,
}

/// Encode a file's bytes for inline transport.
pub fn encode_file(input: &FileInput) -> EncodedFile {
    let data = STANDARD.encode(&input.bytes);
    debug!(
        "Encoded '{}' ({} bytes) → {} bytes base64",
        input.name,
        input.bytes.len(),
        data.len()
    );
    EncodedFile {
        data,
        mime_type: input.mime_or_default().to_string(),
        display_name: input.name.clone(),
    }
}

/// Read a file from disk, guessing its MIME type from the extension.
pub async fn read_file(path: impl AsRef<Path>) -> Result<FileInput, ExtractError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mime_type = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read {} ({} bytes, {:?})", path.display(), bytes.len(), mime_type);
    Ok(FileInput {
        bytes,
        mime_type,
        name,
    })
}

/// Decode a base64 payload back into bytes.
pub fn decode_payload(data: &str) -> Result<Vec<u8>, ExtractError> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| ExtractError::ExtractionFailure(format!("invalid base64 payload: {e}")))
}

/// Decode document bytes as text: UTF-8 first, otherwise one char per byte.
///
/// The fallback maps each byte to the Unicode scalar of the same value
/// (Latin-1), so legacy single-byte text still reaches the model readable.
pub fn bytes_to_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn encode_defaults_mime() {
        let input = FileInput::new(b"hello".to_vec(), None, "notes.bin");
        let enc = encode_file(&input);
        assert_eq!(enc.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(enc.display_name, "notes.bin");
        assert_eq!(enc.data, "aGVsbG8=");

        let blank = FileInput::new(b"x".to_vec(), Some(""), "x");
        assert_eq!(encode_file(&blank).mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn encode_keeps_known_mime() {
        let input = FileInput::new(b"%PDF-1.7".to_vec(), Some("application/pdf"), "a.pdf");
        let enc = encode_file(&input);
        assert_eq!(enc.mime_type, "application/pdf");
        assert_eq!(decode_payload(&enc.data).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn text_decoding_falls_back_to_latin1() {
        assert_eq!(bytes_to_text("café".as_bytes().to_vec()), "café");
        // 0xE9 alone is 'é' in Latin-1 and invalid UTF-8.
        assert_eq!(bytes_to_text(vec![b'c', b'a', b'f', 0xE9]), "café");
    }

    #[test]
    fn bad_base64_is_extraction_failure() {
        let err = decode_payload("!!not base64!!").unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionFailure(_)));
    }

    #[tokio::test]
    async fn read_file_guesses_mime() {
        let mut tmp = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        tmp.write_all(b"Invoice total: 42").unwrap();
        let input = read_file(tmp.path()).await.unwrap();
        assert_eq!(input.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(input.bytes, b"Invoice total: 42");
        assert!(input.name.ends_with(".txt"));
    }

    #[tokio::test]
    async fn read_missing_file_is_read_error() {
        let err = read_file("/definitely/not/here.pdf").await.unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }));
    }
}
