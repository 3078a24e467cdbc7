//! Local plain-text provider.
//!
//! Decodes `text/plain` uploads as strict UTF-8. Invalid bytes are an
//! error rather than being replaced, so the child sees that the file could
//! not be read instead of a garbled version of it.

use super::provider::{Extracted, FileProcessor, ProcessingError, UploadedFile};
use async_trait::async_trait;

/// Local file processor for plain text.
#[derive(Debug, Default)]
pub struct LocalProvider;

impl LocalProvider {
    /// Create a new local file processor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileProcessor for LocalProvider {
    async fn process(&self, file: &UploadedFile) -> Result<Extracted, ProcessingError> {
        let text = std::str::from_utf8(&file.data).map_err(|e| {
            ProcessingError::Decode(format!("File is not valid UTF-8 text: {e}"))
        })?;
        Ok(Extracted::Text(text.to_string()))
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        mime_type == "text/plain"
    }

    fn label(&self) -> &'static str {
        "Text file"
    }

    fn provider_name(&self) -> &'static str {
        "Local"
    }
}
