pub mod accessibility;
pub mod analyzer;
pub mod editor;
pub mod pipeline;

pub use accessibility::is_accessible;
pub use analyzer::{AnalyzeOptions, ArticleAnalyzer};
pub use editor::ArticleEditor;
pub use pipeline::{IngestSummary, IngestionPipeline};
