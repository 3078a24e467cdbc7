//! Image provider: JPEG and PNG are handed to the model as-is.

use super::provider::{Extracted, FileProcessor, ProcessingError, UploadedFile};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ImageProvider;

impl ImageProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileProcessor for ImageProvider {
    async fn process(&self, file: &UploadedFile) -> Result<Extracted, ProcessingError> {
        Ok(Extracted::Media {
            mime_type: file.mime_type.clone(),
            data: Arc::clone(&file.data),
        })
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        matches!(mime_type, "image/jpeg" | "image/png")
    }

    fn label(&self) -> &'static str {
        "Image file"
    }

    fn provider_name(&self) -> &'static str {
        "Image"
    }
}
