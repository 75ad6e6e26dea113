//! Document encoder: raw file → self-describing `DocumentPayload`.
//!
//! The payload carries a `data:<mime>;base64,<bytes>` URL, so `decode`
//! recovers the exact bytes and MIME type with no outside metadata.

use std::io::Read;
use std::path::Path;

use base64::Engine;
use thiserror::Error;

use crate::config::{MAX_DOCUMENT_BYTES, PDF_MIME_TYPE};
use crate::models::{DocumentPayload, RawFile};

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Unsupported file type: {0} (only PDF files are accepted)")]
    UnsupportedType(String),

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    TooLarge { size_mb: f64, max_mb: u64 },

    #[error("Malformed document data: {0}")]
    MalformedData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a picked file for transport.
///
/// The type check runs first, so a non-PDF is `UnsupportedType` whatever its size.
pub fn encode(file: &RawFile) -> Result<DocumentPayload, EncodeError> {
    check_constraints(&file.mime_type, file.size())?;

    let encoded = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
    Ok(DocumentPayload {
        name: sanitize_filename(&file.name),
        mime_type: file.mime_type.clone(),
        data: format!("data:{};base64,{}", file.mime_type, encoded),
    })
}

/// Decode a payload back to `(bytes, mime_type)`.
///
/// The MIME type comes from the data URL itself, not from `payload.mime_type`.
/// Raw base64 without a data URL header is rejected: it is not self-describing.
pub fn decode(payload: &DocumentPayload) -> Result<(Vec<u8>, String), EncodeError> {
    let rest = payload
        .data
        .strip_prefix("data:")
        .ok_or_else(|| EncodeError::MalformedData("missing data: URL prefix".into()))?;
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| EncodeError::MalformedData("missing ',' separator".into()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| EncodeError::MalformedData("data URL is not base64".into()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| EncodeError::MalformedData(format!("Base64 decode failed: {e}")))?;

    Ok((bytes, mime_type.to_string()))
}

/// Server-side check of an uploaded payload: declared type, data URL type,
/// decodability and decoded size. Returns the decoded byte count.
pub fn validate_payload(payload: &DocumentPayload) -> Result<usize, EncodeError> {
    if payload.mime_type != PDF_MIME_TYPE {
        return Err(EncodeError::UnsupportedType(payload.mime_type.clone()));
    }
    let (bytes, mime_type) = decode(payload)?;
    check_constraints(&mime_type, bytes.len())?;
    Ok(bytes.len())
}

/// The base64 body of a payload, for backends that take inline data.
pub fn base64_body(payload: &DocumentPayload) -> Result<&str, EncodeError> {
    payload
        .data
        .split_once(',')
        .map(|(_, body)| body)
        .ok_or_else(|| EncodeError::MalformedData("missing ',' separator".into()))
}

fn check_constraints(mime_type: &str, size: usize) -> Result<(), EncodeError> {
    if mime_type != PDF_MIME_TYPE {
        return Err(EncodeError::UnsupportedType(mime_type.to_string()));
    }
    if size > MAX_DOCUMENT_BYTES {
        return Err(EncodeError::TooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: (MAX_DOCUMENT_BYTES / (1024 * 1024)) as u64,
        });
    }
    Ok(())
}

/// Read a file from disk, taking its MIME type from magic bytes
/// (extensions can be wrong).
pub fn read_file(path: &Path) -> Result<RawFile, EncodeError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > MAX_DOCUMENT_BYTES as u64 {
        // Still sniff the header so a large non-PDF reports the type problem
        let mut header = [0u8; 8];
        let n = std::fs::File::open(path)?.read(&mut header)?;
        check_constraints(sniff_mime_type(&header[..n]), metadata.len() as usize)?;
    }

    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.pdf");
    Ok(RawFile::new(name, sniff_mime_type(&bytes), bytes))
}

/// Detect the MIME type from magic bytes.
pub fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF-") {
        PDF_MIME_TYPE
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else {
        "application/octet-stream"
    }
}

/// Sanitize a filename: strip path components, limit length
pub fn sanitize_filename(original: &str) -> String {
    let name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let clean: String = name.chars().filter(|c| *c != '\0').take(255).collect();

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}
