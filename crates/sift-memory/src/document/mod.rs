pub mod cleaner;
pub mod error;
pub mod pipeline;
pub mod splitter;
pub mod types;

pub use cleaner::normalize_text;
pub use error::DocumentError;
pub use pipeline::{IngestConfig, IngestReport, IngestionPipeline};
pub use splitter::{Segmenter, SplitterConfig, TextSplitter};
pub use types::SourceDocument;
