//! Turning uploaded files into content fragments.
//!
//! [`FileIngestor::ingest`] never fails because of the file itself: bad
//! bytes become an error placeholder and unknown types become a "not
//! supported" notice, so the child always sees what happened to each upload.
//! Only a failure of the token-counting service is returned as an error.

use std::sync::Arc;

use serde::Serialize;

use crate::config::{ImageCosting, PdfConfig};
use crate::file_processing::{
    CsvProvider, Extracted, FileProcessor, ImageProvider, KreuzbergProvider, LocalProvider,
    UploadedFile,
};
use crate::llm::{ModelHandle, Part};

/// Coarse classification of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Text,
    BinaryMedia,
    ErrorPlaceholder,
}

/// Payload of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentBody {
    /// Extracted text or an informational notice.
    Text(String),
    /// Media the model reads directly.
    Media {
        mime_type: String,
        data: Arc<[u8]>,
    },
    /// Why the file could not be read.
    Error(String),
}

/// One unit of file-derived content, attached to file-mode turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Name of the upload this came from.
    pub source_file_name: String,
    /// MIME type the upload was declared (or guessed) as.
    pub source_mime_type: String,
    pub body: FragmentBody,
}

impl Fragment {
    #[must_use]
    pub fn kind(&self) -> FragmentKind {
        match self.body {
            FragmentBody::Text(_) => FragmentKind::Text,
            FragmentBody::Media { .. } => FragmentKind::BinaryMedia,
            FragmentBody::Error(_) => FragmentKind::ErrorPlaceholder,
        }
    }

    /// Text payload for text and error fragments.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            FragmentBody::Text(text) | FragmentBody::Error(text) => Some(text),
            FragmentBody::Media { .. } => None,
        }
    }

    /// Size of the payload in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        match &self.body {
            FragmentBody::Text(text) | FragmentBody::Error(text) => text.len(),
            FragmentBody::Media { data, .. } => data.len(),
        }
    }

    /// Outbound representation.
    #[must_use]
    pub fn to_part(&self) -> Part {
        match &self.body {
            FragmentBody::Text(text) | FragmentBody::Error(text) => Part::text(text.clone()),
            FragmentBody::Media { mime_type, data } => Part::Media {
                mime_type: mime_type.clone(),
                data: Arc::clone(data),
            },
        }
    }
}

/// Result of ingesting one file.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub fragments: Vec<Fragment>,
    /// Estimated token cost of all fragments.
    pub token_cost: u64,
}

/// Dispatches uploads to the first provider that supports their MIME type.
#[derive(Debug)]
pub struct FileIngestor {
    processors: Vec<Arc<dyn FileProcessor>>,
    image_costing: ImageCosting,
}

impl FileIngestor {
    /// Ingestor with the standard PDF, text, CSV and image providers.
    #[must_use]
    pub fn new(pdf: PdfConfig, image_costing: ImageCosting) -> Self {
        Self {
            processors: vec![
                Arc::new(KreuzbergProvider::new(pdf)),
                Arc::new(LocalProvider::new()),
                Arc::new(CsvProvider::new()),
                Arc::new(ImageProvider::new()),
            ],
            image_costing,
        }
    }

    /// Put a provider ahead of the standard ones.
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn FileProcessor>) -> Self {
        self.processors.insert(0, processor);
        self
    }

    fn processor_for(&self, mime_type: &str) -> Option<&Arc<dyn FileProcessor>> {
        self.processors
            .iter()
            .find(|p| p.supports_mime_type(mime_type))
    }

    /// Convert one upload into fragments and their estimated token cost.
    pub async fn ingest(
        &self,
        file: &UploadedFile,
        model: &ModelHandle,
    ) -> anyhow::Result<Ingested> {
        let body = self.extract(file).await;
        let token_cost = self.cost(file, &body, model).await?;

        tracing::info!(
            name: "file.ingested",
            file = %file.name,
            mime_type = %file.mime_type,
            size = file.size(),
            token_cost = token_cost,
            "File ingested"
        );

        Ok(Ingested {
            fragments: vec![Fragment {
                source_file_name: file.name.clone(),
                source_mime_type: file.mime_type.clone(),
                body,
            }],
            token_cost,
        })
    }

    async fn extract(&self, file: &UploadedFile) -> FragmentBody {
        let Some(processor) = self.processor_for(&file.mime_type) else {
            tracing::info!(file = %file.name, mime_type = %file.mime_type, "Unsupported file type");
            return FragmentBody::Text(format!(
                "File '{}' ({}): processing not supported.",
                file.name, file.mime_type
            ));
        };

        match processor.process(file).await {
            Ok(Extracted::Text(text)) if text.trim().is_empty() => {
                FragmentBody::Text(processor.empty_notice(&file.name))
            }
            Ok(Extracted::Text(text)) => FragmentBody::Text(format!(
                "{} '{}' content: {text}",
                processor.label(),
                file.name
            )),
            Ok(Extracted::Media { mime_type, data }) => FragmentBody::Media { mime_type, data },
            Err(e) => {
                tracing::warn!(
                    file = %file.name,
                    provider = processor.provider_name(),
                    error = %e,
                    "File processing failed"
                );
                FragmentBody::Error(format!(
                    "Error loading '{}' ({}): {e}",
                    file.name, file.mime_type
                ))
            }
        }
    }

    async fn cost(
        &self,
        file: &UploadedFile,
        body: &FragmentBody,
        model: &ModelHandle,
    ) -> anyhow::Result<u64> {
        let tokens = match body {
            FragmentBody::Text(text) | FragmentBody::Error(text) => model.count_tokens(text).await?,
            FragmentBody::Media { mime_type, data }
                if self.image_costing == ImageCosting::Measured && model.measures_media() =>
            {
                model
                    .count_parts(&[Part::Media {
                        mime_type: mime_type.clone(),
                        data: Arc::clone(data),
                    }])
                    .await?
            }
            FragmentBody::Media { .. } => {
                model
                    .count_tokens(&format!("Placeholder for {}", file.name))
                    .await?
            }
        };
        Ok(u64::from(tokens))
    }
}
