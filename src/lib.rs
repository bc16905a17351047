pub mod analysis;
pub mod config;
pub mod error;
pub mod feeds;
pub mod geo;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod rate_limiter;
pub mod storage;
pub mod triggers;
pub mod weather;

pub use analysis::{ArticleAnalyzer, ArticleEditor, IngestSummary, IngestionPipeline};
pub use config::{AnalyzerConfig, Config, GeoConfig, PipelineConfig, WeatherConfig};
pub use error::{Error, Result};
pub use feeds::{FeedFetcher, FeedSource};
pub use geo::{GeoResolver, MarketTable, NominatimGeocoder};
pub use ledger::EditLedger;
pub use llm::{ClaudeProvider, LLMProvider};
pub use storage::Storage;
pub use triggers::{EditOutcome, EditRequest, WebhookPayload, WebhookSettings};
pub use weather::{NwsClient, WeatherEnricher};
