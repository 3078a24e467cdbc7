//! File processing abstraction for uploaded files.
//!
//! Each provider turns the bytes of one upload into model-consumable content:
//! extracted text, or the raw media payload for formats the model reads
//! natively.
//!
//! # Providers
//!
//! - [`KreuzbergProvider`] - PDF text extraction via the Kreuzberg Rust core
//! - [`LocalProvider`] - UTF-8 plain text
//! - [`CsvProvider`] - CSV rows re-rendered as comma-joined lines
//! - [`ImageProvider`] - JPEG/PNG passed through as media
//!
//! # Usage
//!
//! ```rust,ignore
//! use tutor_chat::file_processing::{FileProcessor, LocalProvider, UploadedFile};
//!
//! let file = UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec());
//! let extracted = LocalProvider::new().process(&file).await?;
//! ```

mod image;
mod kreuzberg;
mod local;
mod provider;
mod tabular;

pub use self::image::ImageProvider;
pub use self::kreuzberg::KreuzbergProvider;
pub use self::local::LocalProvider;
pub use self::provider::{Extracted, FileProcessor, ProcessingError, UploadedFile, normalize_mime};
pub use self::tabular::CsvProvider;
