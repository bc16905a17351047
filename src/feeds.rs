//! RSS/Atom source fetching.

use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::llm::prompts::truncate_chars;
use crate::models::{ArticleTable, RawArticle};

const MAX_CONTENT_CHARS: usize = 10_000;
const DEFAULT_MAX_ITEMS: usize = 20;

/// A configured feed and the outlet it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub table: ArticleTable,
}

pub struct FeedFetcher {
    client: Client,
    max_items: usize,
}

impl FeedFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_str(user_agent)?);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            max_items: DEFAULT_MAX_ITEMS,
        })
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub async fn fetch(&self, source: &FeedSource) -> Result<Vec<RawArticle>> {
        tracing::info!("Fetching feed: {}", source.url);

        let response = self.client.get(&source.url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Feed(format!(
                "{} returned {}",
                source.url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        let articles = parse_feed(&bytes, source, self.max_items)?;
        tracing::info!("  Found {} articles", articles.len());
        Ok(articles)
    }
}

/// Newest `max_items` entries that carry both a link and a title.
pub fn parse_feed(bytes: &[u8], source: &FeedSource, max_items: usize) -> Result<Vec<RawArticle>> {
    let feed = feed_rs::parser::parse(bytes)?;

    let mut articles: Vec<RawArticle> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.links.first().map(|l| l.href.trim().to_string())?;
            let title = entry.title.map(|t| t.content.trim().to_string())?;
            if url.is_empty() || title.is_empty() {
                return None;
            }

            let content = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content))
                .filter(|c| !c.trim().is_empty())
                .map(|c| truncate_chars(&c, MAX_CONTENT_CHARS));

            let published_at: Option<DateTime<Utc>> = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.with_timezone(&Utc));

            Some(RawArticle {
                url,
                title,
                content,
                published_at,
                source_name: source.name.clone(),
                source_city: source.city.clone(),
                table: source.table,
                priority_floor: None,
            })
        })
        .collect();

    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    articles.truncate(max_items);
    Ok(articles)
}
