use thiserror::Error;

use crate::models::ArticleTable;

#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("Weather API error: {0}")]
    Weather(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Webhook secret mismatch")]
    Unauthorized,

    #[error("Article {id} not found in {table}")]
    NotFound { id: i64, table: ArticleTable },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors caused by the triggering request rather than by an upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::Unauthorized | Error::NotFound { .. }
        )
    }
}

impl From<feed_rs::parser::ParseFeedError> for Error {
    fn from(e: feed_rs::parser::ParseFeedError) -> Self {
        Error::Feed(e.to_string())
    }
}
