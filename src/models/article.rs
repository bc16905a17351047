use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::market::MarketName;

/// The two article tables: news outlets and first-party organizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleTable {
    #[default]
    Articles,
    FirstPartyArticles,
}

impl ArticleTable {
    pub const ALL: [ArticleTable; 2] = [ArticleTable::Articles, ArticleTable::FirstPartyArticles];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleTable::Articles => "articles",
            ArticleTable::FirstPartyArticles => "first_party_articles",
        }
    }
}

impl fmt::Display for ArticleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleTable {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "articles" | "news" => Ok(ArticleTable::Articles),
            "first_party_articles" | "first_party" | "first-party" => {
                Ok(ArticleTable::FirstPartyArticles)
            }
            other => Err(format!("unknown article table: {}", other)),
        }
    }
}

/// An article as it arrives from a feed or webhook, before analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArticle {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_city: Option<String>,
    #[serde(default)]
    pub table: ArticleTable,
    /// Minimum priority for trusted sources.
    #[serde(default)]
    pub priority_floor: Option<u8>,
}

/// Everything written by an ingestion upsert, keyed by `(table, url)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDraft {
    pub table: ArticleTable,
    pub url: String,
    pub source_url: String,
    pub source_name: Option<String>,
    pub source_city: Option<String>,
    pub title: String,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub location: Option<String>,
    pub market: Option<MarketName>,
    pub is_local: bool,
    pub priority: Option<u8>,
    pub bullet: Option<String>,
    pub is_accessible: bool,
    pub priority_floor: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub table: ArticleTable,
    pub url: String,
    pub source_url: String,
    pub source_name: Option<String>,
    pub source_city: Option<String>,
    pub title: String,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub location: Option<String>,
    pub market: Option<MarketName>,
    pub is_local: bool,
    pub priority: Option<u8>,
    pub bullet: Option<String>,
    pub is_accessible: bool,
    pub is_discarded: bool,
    pub is_used: bool,
    /// Floor the source was ingested with; reprocessing keeps it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_floor: Option<u8>,
    #[serde(default)]
    pub additional_markets: Vec<String>,
}

/// A manually created article (admin create request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub bullet: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_city: Option<String>,
}

/// Field updates from the manual edit path. `None` leaves a field untouched;
/// an empty `bullet` or `location` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub market: Option<MarketName>,
    #[serde(default)]
    pub is_local: Option<bool>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub bullet: Option<String>,
    #[serde(default)]
    pub is_accessible: Option<bool>,
    #[serde(default)]
    pub is_discarded: Option<bool>,
    #[serde(default)]
    pub is_used: Option<bool>,
}

impl ArticleChanges {
    pub fn is_empty(&self) -> bool {
        *self == ArticleChanges::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub market: Option<MarketName>,
    pub local_only: bool,
    pub accessible_only: bool,
    pub include_discarded: bool,
    pub missing_market: bool,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
