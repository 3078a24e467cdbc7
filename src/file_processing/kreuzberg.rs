//! Kreuzberg file processing provider.
//!
//! Uses the Kreuzberg Rust core to pull the text out of PDF uploads.
//! Extraction runs on the blocking pool; OCR is off unless configured.

use async_trait::async_trait;

use crate::config::PdfConfig;

use super::provider::{Extracted, FileProcessor, ProcessingError, UploadedFile};

/// Kreuzberg-based PDF processor using the native Rust core.
#[derive(Debug)]
pub struct KreuzbergProvider {
    config: PdfConfig,
}

impl KreuzbergProvider {
    /// Create a new Kreuzberg provider with the given configuration.
    pub fn new(config: PdfConfig) -> Self {
        Self { config }
    }

    /// Create a provider with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: PdfConfig::default(),
        }
    }

    /// Build the Kreuzberg `ExtractionConfig` from our config.
    fn build_extraction_config(&self) -> ::kreuzberg::ExtractionConfig {
        let mut config = ::kreuzberg::ExtractionConfig::default();

        if self.config.ocr_enabled {
            config.ocr = Some(::kreuzberg::OcrConfig {
                backend: self.config.ocr_backend.clone(),
                language: self.config.ocr_language.clone(),
                tesseract_config: None,
            });
        }
        config.force_ocr = self.config.force_ocr;

        config
    }
}

/// The `%PDF-` header must appear within the first 1024 bytes.
const HEADER_WINDOW: usize = 1024;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn has_pdf_header(data: &[u8]) -> bool {
    contains(&data[..data.len().min(HEADER_WINDOW)], b"%PDF-")
}

/// Pages without a content stream cannot carry any text.
fn has_page_content(data: &[u8]) -> bool {
    contains(data, b"/Contents")
}

#[async_trait]
impl FileProcessor for KreuzbergProvider {
    async fn process(&self, file: &UploadedFile) -> Result<Extracted, ProcessingError> {
        if !has_pdf_header(&file.data) {
            return Err(ProcessingError::Decode("missing %PDF header".to_string()));
        }

        let extraction_config = self.build_extraction_config();
        let data = std::sync::Arc::clone(&file.data);
        let mime_type = file.mime_type.clone();

        // Kreuzberg's synchronous API wrapped in spawn_blocking
        let result = tokio::task::spawn_blocking(move || {
            ::kreuzberg::extract_bytes_sync(&data, &mime_type, &extraction_config)
        })
        .await
        .map_err(|e| ProcessingError::ProviderError(format!("Task join error: {e}")))?;

        match result {
            Ok(result) => {
                tracing::debug!(
                    file = %file.name,
                    content_length = result.content.len(),
                    "PDF text extracted"
                );
                Ok(Extracted::Text(result.content))
            }
            Err(e) if !has_page_content(&file.data) => {
                tracing::debug!(
                    file = %file.name,
                    error = %e,
                    "PDF has no page content; treating as empty"
                );
                Ok(Extracted::Text(String::new()))
            }
            Err(e) => Err(ProcessingError::ProviderError(format!("Kreuzberg error: {e}"))),
        }
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        mime_type == "application/pdf"
    }

    fn label(&self) -> &'static str {
        "PDF file"
    }

    fn empty_notice(&self, file_name: &str) -> String {
        format!("PDF file '{file_name}' contains no extractable text.")
    }

    fn provider_name(&self) -> &'static str {
        "Kreuzberg"
    }
}
