use serde::{Deserialize, Serialize};

/// Transport-safe form of an uploaded document.
///
/// `data` is a `data:<mime>;base64,<bytes>` URL, so the payload can be
/// decoded back to the original bytes and MIME type without side channels.
/// On the wire the MIME type travels as `type`, matching browser `File`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub data: String,
}

/// A file as picked by the user, before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
