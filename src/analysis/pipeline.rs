use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;

use crate::analysis::accessibility::is_accessible;
use crate::analysis::analyzer::{AnalyzeOptions, ArticleAnalyzer};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::geo::GeoResolver;
use crate::models::{Article, ArticleDraft, ArticleFilter, ArticleTable, MarketName, RawArticle};
use crate::storage::Storage;

/// Counts from one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub ingested: usize,
    pub topics_written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Raw article → analysis → market resolution → upserted rows.
pub struct IngestionPipeline {
    analyzer: Arc<ArticleAnalyzer>,
    resolver: Arc<GeoResolver>,
    storage: Arc<Storage>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        analyzer: Arc<ArticleAnalyzer>,
        resolver: Arc<GeoResolver>,
        storage: Arc<Storage>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            analyzer,
            resolver,
            storage,
            config,
        }
    }

    /// Ingest one article. A roundup becomes one row per topic, each under
    /// `<url>#<n>`; a single-topic article keeps its own URL.
    pub async fn ingest(&self, raw: &RawArticle) -> Result<Vec<Article>> {
        let url = raw.url.trim();
        let title = raw.title.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("article url is required".to_string()));
        }
        if title.is_empty() {
            return Err(Error::InvalidInput("article title is required".to_string()));
        }

        let default_location = raw
            .source_city
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&self.config.default_location);

        let body = raw.content.as_deref().unwrap_or("");
        let options = AnalyzeOptions {
            priority_floor: raw.priority_floor,
            char_budget: self.char_budget(raw.table),
        };

        let analysis = self
            .analyzer
            .analyze_with(title, body, default_location, options)
            .await;

        let fetched_at = Utc::now();
        let accessible = is_accessible(raw.content.as_deref());
        let fan_out = analysis.topics.len() > 1;

        let mut written = Vec::with_capacity(analysis.topics.len());
        let mut last_error = None;

        for (i, topic) in analysis.topics.into_iter().enumerate() {
            let market = self.resolver.resolve(&topic.location).await;

            let draft = ArticleDraft {
                table: raw.table,
                url: if fan_out {
                    format!("{}#{}", url, i + 1)
                } else {
                    url.to_string()
                },
                source_url: url.to_string(),
                source_name: raw.source_name.clone(),
                source_city: raw.source_city.clone(),
                title: topic.title,
                content: raw.content.clone(),
                published_at: raw.published_at,
                fetched_at,
                location: Some(topic.location),
                market: Some(market),
                is_local: topic.is_local,
                priority: Some(topic.priority),
                bullet: topic.bullet,
                is_accessible: accessible,
                priority_floor: raw.priority_floor,
            };

            match self.storage.upsert_article(&draft) {
                Ok(article) => {
                    tracing::debug!(
                        "Stored {} -> {}",
                        article.url,
                        article.market.as_ref().map(MarketName::as_str).unwrap_or("-")
                    );
                    written.push(article);
                }
                Err(e) => {
                    tracing::warn!("Failed to store topic {} of {}: {}", i + 1, url, e);
                    last_error = Some(e);
                }
            }
        }

        if !written.is_empty() {
            match self.stale_rows(raw.table, url, &written) {
                Ok(stale) if !stale.is_empty() => tracing::warn!(
                    "{} still has {} row(s) from an earlier ingest with a different topic count",
                    url,
                    stale.len()
                ),
                Ok(_) => {}
                Err(e) => tracing::debug!("Could not check earlier rows for {}: {}", url, e),
            }
        }

        match last_error {
            Some(e) if written.is_empty() => Err(e),
            _ => Ok(written),
        }
    }

    /// Rows from the same source that this ingest did not write.
    fn stale_rows(
        &self,
        table: ArticleTable,
        source_url: &str,
        written: &[Article],
    ) -> Result<Vec<Article>> {
        Ok(self
            .storage
            .articles_by_source_url(table, source_url)?
            .into_iter()
            .filter(|a| written.iter().all(|w| w.id != a.id))
            .collect())
    }

    /// Re-run analysis on a stored row and overwrite its derived fields.
    /// Only the first topic is used; an existing row is never fanned out.
    pub async fn reprocess(&self, id: i64, table: ArticleTable) -> Result<Article> {
        let mut article = self
            .storage
            .get_article(table, id)?
            .ok_or(Error::NotFound { id, table })?;

        let default_location = article
            .source_city
            .clone()
            .or_else(|| article.location.clone())
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.config.default_location.clone());

        let options = AnalyzeOptions {
            priority_floor: article.priority_floor,
            char_budget: self.char_budget(table),
        };
        let analysis = self
            .analyzer
            .analyze_with(
                &article.title,
                article.content.as_deref().unwrap_or(""),
                &default_location,
                options,
            )
            .await;

        let Some(topic) = analysis.topics.into_iter().next() else {
            return Ok(article);
        };

        article.market = Some(self.resolver.resolve(&topic.location).await);
        article.location = Some(topic.location);
        article.is_local = topic.is_local;
        article.bullet = topic.bullet;
        article.priority = Some(topic.priority);
        article.is_accessible = is_accessible(article.content.as_deref());

        self.storage.save_article(&article)?;
        tracing::info!("Reprocessed {} {} -> {:?}", table, id, article.market);
        Ok(article)
    }

    /// Ingest a list of articles one by one with a fixed delay between them.
    /// Sources already stored are skipped unless `force` is set.
    pub async fn ingest_batch(&self, articles: &[RawArticle], force: bool) -> IngestSummary {
        let mut summary = IngestSummary::default();

        let pb = ProgressBar::new(articles.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} articles")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for (i, raw) in articles.iter().enumerate() {
            pb.inc(1);

            if !force {
                match self.storage.has_source_url(raw.table, raw.url.trim()) {
                    Ok(true) => {
                        tracing::debug!("Skipping already ingested {}", raw.url);
                        summary.skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!("Could not check {}: {}", raw.url, e),
                }
            }

            if i > 0 && !self.config.request_delay.is_zero() {
                tokio::time::sleep(self.config.request_delay).await;
            }

            match self.ingest(raw).await {
                Ok(rows) => {
                    summary.ingested += 1;
                    summary.topics_written += rows.len();
                }
                Err(e) => {
                    tracing::warn!("Failed to ingest {}: {}", raw.url, e);
                    summary.failed += 1;
                }
            }
        }

        pb.finish_with_message("Ingestion complete");
        tracing::info!(
            "Ingested {} articles ({} rows), skipped {}, failed {}",
            summary.ingested,
            summary.topics_written,
            summary.skipped,
            summary.failed
        );
        summary
    }

    /// Fill in `market` for rows that never got one. Rows without a location
    /// become At Large. Returns the number of rows updated.
    pub async fn backfill_markets(&self, table: ArticleTable) -> Result<usize> {
        let filter = ArticleFilter {
            missing_market: true,
            include_discarded: true,
            ..Default::default()
        };
        let pending = self.storage.list_articles(table, &filter)?;
        tracing::info!("Found {} {} rows without a market", pending.len(), table);

        for article in &pending {
            let market = match article.location.as_deref() {
                Some(location) => self.resolver.resolve(location).await,
                None => MarketName::AtLarge,
            };
            tracing::debug!("  {:?} -> {}", article.location, market);
            self.storage.set_market(table, article.id, &market)?;
        }

        Ok(pending.len())
    }

    fn char_budget(&self, table: ArticleTable) -> Option<usize> {
        match table {
            ArticleTable::FirstPartyArticles => Some(self.config.first_party_char_budget),
            ArticleTable::Articles => None,
        }
    }
}
