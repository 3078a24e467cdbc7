//! CSV provider: rows re-rendered as comma-joined lines.

use super::provider::{Extracted, FileProcessor, ProcessingError, UploadedFile};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct CsvProvider;

impl CsvProvider {
    pub fn new() -> Self {
        Self
    }

    fn render(data: &[u8]) -> Result<String, ProcessingError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut lines = Vec::new();
        for record in reader.records() {
            let record = record?;
            lines.push(record.iter().collect::<Vec<_>>().join(","));
        }
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl FileProcessor for CsvProvider {
    async fn process(&self, file: &UploadedFile) -> Result<Extracted, ProcessingError> {
        Self::render(&file.data).map(Extracted::Text)
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        mime_type == "text/csv"
    }

    fn label(&self) -> &'static str {
        "CSV file"
    }

    fn provider_name(&self) -> &'static str {
        "Csv"
    }
}
