//! Core trait and types for file processing providers.

use async_trait::async_trait;
use std::sync::Arc;

/// A file as delivered by one interaction.
#[derive(Clone)]
pub struct UploadedFile {
    /// Original file name; the dedup key within a session.
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Raw content.
    pub data: Arc<[u8]>,
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .finish()
    }
}

impl UploadedFile {
    /// Build an upload, guessing the MIME type from the name when the
    /// declared one is missing or generic.
    #[must_use]
    pub fn new(name: impl Into<String>, mime_type: &str, data: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let declared = normalize_mime(mime_type);
        let mime_type = if declared.is_empty() || declared == "application/octet-stream" {
            mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        } else {
            declared
        };
        Self {
            name,
            mime_type,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Lowercased MIME essence without parameters (`text/plain; charset=utf-8` -> `text/plain`).
#[must_use]
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// What a provider got out of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Extracted text (may be empty).
    Text(String),
    /// Media the model consumes directly.
    Media {
        mime_type: String,
        data: Arc<[u8]>,
    },
}

/// Errors that can occur during file processing.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// The bytes could not be decoded as the declared format.
    #[error("Decode error: {0}")]
    Decode(String),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    /// An error occurred in the provider's extraction engine.
    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Trait for file processing providers.
///
/// Implementors turn the bytes of one upload into [`Extracted`] content.
/// Each provider supports a fixed set of MIME types.
#[async_trait]
pub trait FileProcessor: Send + Sync + std::fmt::Debug {
    /// Process an uploaded file.
    ///
    /// # Returns
    ///
    /// The [`Extracted`] content, or an error describing why it could not be read.
    async fn process(&self, file: &UploadedFile) -> Result<Extracted, ProcessingError>;

    /// Check if this processor supports the given (normalized) MIME type.
    fn supports_mime_type(&self, mime_type: &str) -> bool;

    /// Human label used in fragment text (`"Text file"`, `"PDF file"`).
    fn label(&self) -> &'static str;

    /// Notice used when extraction yields no text.
    fn empty_notice(&self, file_name: &str) -> String {
        format!("{} '{file_name}' is empty.", self.label())
    }

    /// Get the provider name for logging and debugging.
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mime() {
        assert_eq!(normalize_mime("Text/Plain; charset=UTF-8"), "text/plain");
        assert_eq!(normalize_mime(""), "");
    }

    #[test]
    fn test_guess_when_generic() {
        let file = UploadedFile::new("scores.csv", "application/octet-stream", b"a,b".to_vec());
        assert_eq!(file.mime_type, "text/csv");

        let file = UploadedFile::new("photo.png", "", b"".to_vec());
        assert_eq!(file.mime_type, "image/png");
    }

    #[test]
    fn test_declared_type_wins() {
        let file = UploadedFile::new("archive.zip", "application/zip", b"PK".to_vec());
        assert_eq!(file.mime_type, "application/zip");
        assert_eq!(file.size(), 2);
    }
}
