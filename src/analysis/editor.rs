use chrono::Utc;
use std::sync::Arc;

use crate::analysis::accessibility::is_accessible;
use crate::error::{Error, Result};
use crate::geo::GeoResolver;
use crate::ledger::EditLedger;
use crate::models::{
    Article, ArticleChanges, ArticleDraft, ArticleTable, EditRecord, FieldChange, MarketName,
    NewArticle, AT_LARGE, MAX_PRIORITY, MIN_PRIORITY,
};
use crate::storage::Storage;

const ADDITIONAL_MARKETS_FIELD: &str = "additional_markets";

/// Manual edits. Every changed field is written to the edit ledger;
/// creation and ingestion are not.
pub struct ArticleEditor {
    storage: Arc<Storage>,
    resolver: Arc<GeoResolver>,
}

impl ArticleEditor {
    pub fn new(storage: Arc<Storage>, resolver: Arc<GeoResolver>) -> Self {
        Self { storage, resolver }
    }

    pub fn get(&self, id: i64, table: ArticleTable) -> Result<Article> {
        self.storage
            .get_article(table, id)?
            .ok_or(Error::NotFound { id, table })
    }

    pub async fn update(
        &self,
        id: i64,
        table: ArticleTable,
        changes: &ArticleChanges,
        editor: Option<&str>,
    ) -> Result<Article> {
        check_priority(changes.priority)?;
        let market = changes
            .market
            .as_ref()
            .map(|m| self.canonical_market(m.as_str()).map(MarketName::from))
            .transpose()?;

        let current = self.get(id, table)?;
        if changes.is_empty() {
            return Ok(current);
        }

        let mut updated = current.clone();

        if let Some(title) = &changes.title {
            updated.title = title.clone();
        }
        if let Some(content) = &changes.content {
            updated.content = non_blank(content);
        }
        if let Some(is_local) = changes.is_local {
            updated.is_local = is_local;
        }
        if let Some(priority) = changes.priority {
            updated.priority = Some(priority);
        }
        if let Some(bullet) = &changes.bullet {
            updated.bullet = non_blank(bullet);
        }
        if let Some(accessible) = changes.is_accessible {
            updated.is_accessible = accessible;
        }
        if let Some(discarded) = changes.is_discarded {
            updated.is_discarded = discarded;
        }
        if let Some(used) = changes.is_used {
            updated.is_used = used;
        }
        if let Some(location) = &changes.location {
            updated.location = non_blank(location);
        }

        match market {
            Some(market) => updated.market = Some(market),
            None if updated.location != current.location => {
                let market = match updated.location.as_deref() {
                    Some(location) => self.resolver.resolve(location).await,
                    None => MarketName::AtLarge,
                };
                updated.market = Some(market);
            }
            None => {}
        }

        let diffs: Vec<FieldChange> = diff(&current, &updated)
            .into_iter()
            .filter(|c| !c.is_noop())
            .collect();
        if diffs.is_empty() {
            return Ok(current);
        }

        self.storage.save_article(&updated)?;
        let ledgered = EditLedger::new(&self.storage).record_all(id, table, &diffs, editor);
        tracing::info!(
            "Updated {} {}: {} field(s) changed, {} ledgered",
            table,
            id,
            diffs.len(),
            ledgered
        );

        Ok(updated)
    }

    pub async fn discard(&self, id: i64, table: ArticleTable, editor: Option<&str>) -> Result<Article> {
        let changes = ArticleChanges {
            is_discarded: Some(true),
            ..Default::default()
        };
        self.update(id, table, &changes, editor).await
    }

    pub async fn publish(&self, id: i64, table: ArticleTable, editor: Option<&str>) -> Result<Article> {
        let changes = ArticleChanges {
            is_used: Some(true),
            ..Default::default()
        };
        self.update(id, table, &changes, editor).await
    }

    /// Manually insert (or overwrite, keyed by URL) an article.
    pub async fn create(
        &self,
        table: ArticleTable,
        article: NewArticle,
        editor: Option<&str>,
    ) -> Result<Article> {
        let url = article.url.trim().to_string();
        if url.is_empty() {
            return Err(Error::InvalidInput("article url is required".to_string()));
        }
        if article.title.trim().is_empty() {
            return Err(Error::InvalidInput("article title is required".to_string()));
        }
        check_priority(article.priority)?;

        let location = article
            .location
            .as_deref()
            .and_then(non_blank)
            .or_else(|| article.source_city.as_deref().and_then(non_blank));
        let market = match location.as_deref() {
            Some(location) => self.resolver.resolve(location).await,
            None => MarketName::AtLarge,
        };

        let draft = ArticleDraft {
            table,
            source_url: url.clone(),
            url,
            source_name: article.source_name,
            source_city: article.source_city,
            title: article.title.trim().to_string(),
            is_accessible: is_accessible(article.content.as_deref()),
            content: article.content,
            published_at: article.published_at,
            fetched_at: Utc::now(),
            location,
            market: Some(market),
            is_local: true,
            priority: article.priority,
            bullet: article.bullet.as_deref().and_then(non_blank),
            priority_floor: None,
        };

        let created = self.storage.upsert_article(&draft)?;
        tracing::info!(
            "Created {} {} ({}) by {}",
            table,
            created.id,
            created.url,
            editor.unwrap_or("unknown editor")
        );
        Ok(created)
    }

    /// Attach an extra market. Returns whether anything changed.
    pub fn add_market(
        &self,
        id: i64,
        table: ArticleTable,
        market: &str,
        editor: Option<&str>,
    ) -> Result<bool> {
        self.get(id, table)?;
        let market = self.canonical_market(market)?;

        let inserted = self.storage.add_market(table, id, &market)?;
        if inserted {
            EditLedger::new(&self.storage).record(
                id,
                table,
                ADDITIONAL_MARKETS_FIELD,
                None,
                Some(&market),
                editor,
            );
        }
        Ok(inserted)
    }

    /// Detach an extra market. Returns whether anything changed.
    pub fn remove_market(
        &self,
        id: i64,
        table: ArticleTable,
        market: &str,
        editor: Option<&str>,
    ) -> Result<bool> {
        self.get(id, table)?;
        let market = self.canonical_market(market)?;

        let removed = self.storage.remove_market(table, id, &market)?;
        if removed {
            EditLedger::new(&self.storage).record(
                id,
                table,
                ADDITIONAL_MARKETS_FIELD,
                Some(&market),
                None,
                editor,
            );
        }
        Ok(removed)
    }

    pub fn history(&self, id: i64, table: ArticleTable) -> Result<Vec<EditRecord>> {
        EditLedger::new(&self.storage).history(id, table)
    }

    fn canonical_market(&self, market: &str) -> Result<String> {
        let market = market.trim();
        if market.is_empty() {
            return Err(Error::InvalidInput("market is required".to_string()));
        }
        if market.eq_ignore_ascii_case(AT_LARGE) {
            return Ok(AT_LARGE.to_string());
        }
        self.resolver
            .markets()
            .by_name(market)
            .map(|anchor| anchor.name.clone())
            .ok_or_else(|| Error::InvalidInput(format!("unknown market: {}", market)))
    }
}

fn check_priority(priority: Option<u8>) -> Result<()> {
    match priority {
        Some(p) if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&p) => Err(Error::InvalidInput(format!(
            "priority must be between {} and {}, got {}",
            MIN_PRIORITY, MAX_PRIORITY, p
        ))),
        _ => Ok(()),
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn diff(before: &Article, after: &Article) -> Vec<FieldChange> {
    let market = |a: &Article| a.market.as_ref().map(|m| m.as_str().to_string());

    vec![
        FieldChange::new("title", Some(&before.title), Some(&after.title)),
        FieldChange::new("content", before.content.as_ref(), after.content.as_ref()),
        FieldChange::new("location", before.location.as_ref(), after.location.as_ref()),
        FieldChange::new("market", market(before), market(after)),
        FieldChange::new("is_local", Some(before.is_local), Some(after.is_local)),
        FieldChange::new("priority", before.priority, after.priority),
        FieldChange::new("bullet", before.bullet.as_ref(), after.bullet.as_ref()),
        FieldChange::new("is_accessible", Some(before.is_accessible), Some(after.is_accessible)),
        FieldChange::new("is_discarded", Some(before.is_discarded), Some(after.is_discarded)),
        FieldChange::new("is_used", Some(before.is_used), Some(after.is_used)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeoConfig;
    use crate::geo::resolver::tests::StubGeocoder;
    use crate::geo::MarketTable;
    use crate::models::Coordinate;

    fn editor_with(geocoder: StubGeocoder) -> (ArticleEditor, Arc<Storage>) {
        let storage = Arc::new(Storage::in_memory().unwrap());
        let resolver = GeoResolver::new(
            Arc::new(MarketTable::kansas()),
            Arc::new(geocoder),
            GeoConfig::default(),
        );
        (ArticleEditor::new(storage.clone(), Arc::new(resolver)), storage)
    }

    fn new_article(url: &str) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: "Bridge reopens".to_string(),
            content: Some("The Kansas River bridge reopened Monday.".to_string()),
            published_at: None,
            location: Some("Topeka".to_string()),
            bullet: None,
            priority: Some(3),
            source_name: None,
            source_city: None,
        }
    }

    #[tokio::test]
    async fn test_create_is_not_ledgered() {
        let (editor, _) = editor_with(StubGeocoder::returning(None));
        let created = editor
            .create(ArticleTable::Articles, new_article("https://desk.example/1"), Some("ed"))
            .await
            .unwrap();

        assert_eq!(created.market, Some(MarketName::named("Topeka")));
        assert!(created.is_accessible);
        assert!(editor.history(created.id, ArticleTable::Articles).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_url_and_title() {
        let (editor, _) = editor_with(StubGeocoder::returning(None));
        let mut article = new_article("");
        assert!(matches!(
            editor.create(ArticleTable::Articles, article.clone(), None).await,
            Err(Error::InvalidInput(_))
        ));

        article.url = "https://desk.example/2".to_string();
        article.title = "   ".to_string();
        assert!(editor.create(ArticleTable::Articles, article, None).await.is_err());
    }

    #[tokio::test]
    async fn test_same_priority_writes_no_history() {
        let (editor, _) = editor_with(StubGeocoder::returning(None));
        let article = editor
            .create(ArticleTable::Articles, new_article("https://desk.example/3"), None)
            .await
            .unwrap();

        let changes = ArticleChanges {
            priority: Some(3),
            ..Default::default()
        };
        editor
            .update(article.id, ArticleTable::Articles, &changes, Some("ed"))
            .await
            .unwrap();
        assert!(editor.history(article.id, ArticleTable::Articles).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_ledgers_each_changed_field() {
        let (editor, storage) = editor_with(StubGeocoder::returning(None));
        let article = editor
            .create(ArticleTable::Articles, new_article("https://desk.example/4"), None)
            .await
            .unwrap();

        let changes = ArticleChanges {
            priority: Some(5),
            bullet: Some("Traffic is flowing again.".to_string()),
            is_local: Some(true),
            ..Default::default()
        };
        let updated = editor
            .update(article.id, ArticleTable::Articles, &changes, Some("night desk"))
            .await
            .unwrap();
        assert_eq!(updated.priority, Some(5));

        let stored = storage.get_article(ArticleTable::Articles, article.id).unwrap().unwrap();
        assert_eq!(stored.bullet.as_deref(), Some("Traffic is flowing again."));

        let history = editor.history(article.id, ArticleTable::Articles).unwrap();
        assert_eq!(history.len(), 2);
        let priority = history.iter().find(|r| r.field == "priority").unwrap();
        assert_eq!(priority.old_value.as_deref(), Some("3"));
        assert_eq!(priority.new_value.as_deref(), Some("5"));
        assert_eq!(priority.editor.as_deref(), Some("night desk"));
        let bullet = history.iter().find(|r| r.field == "bullet").unwrap();
        assert_eq!(bullet.old_value, None);
    }

    #[tokio::test]
    async fn test_location_change_re_resolves_market() {
        // 6 miles from Topeka
        let geocoder = StubGeocoder::returning(Some(Coordinate::new(39.1342, -95.6752)));
        let (editor, _) = editor_with(geocoder);
        let mut seed = new_article("https://desk.example/5");
        seed.location = Some("Lawrence".to_string());
        let article = editor.create(ArticleTable::Articles, seed, None).await.unwrap();
        assert_eq!(article.market, Some(MarketName::named("Lawrence")));

        let changes = ArticleChanges {
            location: Some("Silver Lake".to_string()),
            ..Default::default()
        };
        let updated = editor
            .update(article.id, ArticleTable::Articles, &changes, None)
            .await
            .unwrap();
        assert_eq!(updated.market, Some(MarketName::named("Topeka")));

        let fields: Vec<_> = editor
            .history(article.id, ArticleTable::Articles)
            .unwrap()
            .into_iter()
            .map(|r| r.field)
            .collect();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains(&"location".to_string()));
        assert!(fields.contains(&"market".to_string()));
    }

    #[tokio::test]
    async fn test_explicit_market_wins_over_location() {
        let (editor, _) = editor_with(StubGeocoder::failing());
        let article = editor
            .create(ArticleTable::Articles, new_article("https://desk.example/6"), None)
            .await
            .unwrap();

        let changes = ArticleChanges {
            location: Some("Somewhere".to_string()),
            market: Some(MarketName::named("Emporia")),
            ..Default::default()
        };
        let updated = editor
            .update(article.id, ArticleTable::Articles, &changes, None)
            .await
            .unwrap();
        assert_eq!(updated.market, Some(MarketName::named("Emporia")));
    }

    #[tokio::test]
    async fn test_discard_and_publish() {
        let (editor, _) = editor_with(StubGeocoder::returning(None));
        let article = editor
            .create(ArticleTable::FirstPartyArticles, new_article("https://org.example/1"), None)
            .await
            .unwrap();

        let discarded = editor
            .discard(article.id, ArticleTable::FirstPartyArticles, Some("ed"))
            .await
            .unwrap();
        assert!(discarded.is_discarded);

        let published = editor
            .publish(article.id, ArticleTable::FirstPartyArticles, Some("ed"))
            .await
            .unwrap();
        assert!(published.is_used);
        assert!(published.is_discarded);

        let history = editor.history(article.id, ArticleTable::FirstPartyArticles).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].field, "is_used");
    }

    #[tokio::test]
    async fn test_update_missing_article() {
        let (editor, _) = editor_with(StubGeocoder::returning(None));
        let err = editor
            .discard(99, ArticleTable::Articles, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 99, .. }));
    }

    #[tokio::test]
    async fn test_additional_markets_ledgered_only_on_change() {
        let (editor, storage) = editor_with(StubGeocoder::returning(None));
        let article = editor
            .create(ArticleTable::Articles, new_article("https://desk.example/7"), None)
            .await
            .unwrap();
        let id = article.id;

        assert!(editor.add_market(id, ArticleTable::Articles, "salina", Some("ed")).unwrap());
        assert!(!editor.add_market(id, ArticleTable::Articles, "Salina", Some("ed")).unwrap());
        assert_eq!(
            storage.additional_markets(ArticleTable::Articles, id).unwrap(),
            vec!["Salina".to_string()]
        );

        assert!(editor.remove_market(id, ArticleTable::Articles, "Salina", None).unwrap());
        assert!(!editor.remove_market(id, ArticleTable::Articles, "Salina", None).unwrap());

        let history = editor.history(id, ArticleTable::Articles).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.field == "additional_markets"));
        assert!(history
            .iter()
            .any(|r| r.old_value.is_none() && r.new_value.as_deref() == Some("Salina")));
        assert!(history
            .iter()
            .any(|r| r.old_value.as_deref() == Some("Salina") && r.new_value.is_none()));

        assert!(matches!(
            editor.add_market(id, ArticleTable::Articles, "Narnia", None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_priority_rejected() {
        let (editor, storage) = editor_with(StubGeocoder::returning(None));
        let mut seed = new_article("https://desk.example/8");
        seed.priority = Some(200);
        assert!(matches!(
            editor.create(ArticleTable::Articles, seed, None).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(storage
            .get_article_by_url(ArticleTable::Articles, "https://desk.example/8")
            .unwrap()
            .is_none());

        let article = editor
            .create(ArticleTable::Articles, new_article("https://desk.example/8"), None)
            .await
            .unwrap();
        for priority in [0, 9] {
            let changes = ArticleChanges {
                priority: Some(priority),
                ..Default::default()
            };
            let err = editor
                .update(article.id, ArticleTable::Articles, &changes, None)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("priority")));
        }

        let stored = editor.get(article.id, ArticleTable::Articles).unwrap();
        assert_eq!(stored.priority, Some(3));
        assert!(editor.history(article.id, ArticleTable::Articles).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_primary_market_rejected() {
        let (editor, _) = editor_with(StubGeocoder::returning(None));
        let article = editor
            .create(ArticleTable::Articles, new_article("https://desk.example/9"), None)
            .await
            .unwrap();

        let changes = ArticleChanges {
            priority: Some(5),
            market: Some(MarketName::named("Narnia")),
            ..Default::default()
        };
        assert!(matches!(
            editor.update(article.id, ArticleTable::Articles, &changes, None).await,
            Err(Error::InvalidInput(_))
        ));
        let stored = editor.get(article.id, ArticleTable::Articles).unwrap();
        assert_eq!(stored.market, Some(MarketName::named("Topeka")));
        assert_eq!(stored.priority, Some(3));

        let changes = ArticleChanges {
            market: Some(MarketName::named("emporia")),
            ..Default::default()
        };
        let updated = editor
            .update(article.id, ArticleTable::Articles, &changes, None)
            .await
            .unwrap();
        assert_eq!(updated.market, Some(MarketName::named("Emporia")));

        let changes = ArticleChanges {
            market: Some(MarketName::AtLarge),
            ..Default::default()
        };
        let updated = editor
            .update(article.id, ArticleTable::Articles, &changes, None)
            .await
            .unwrap();
        assert_eq!(updated.market, Some(MarketName::AtLarge));
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_fail_update() {
        let (editor, storage) = editor_with(StubGeocoder::returning(None));
        let article = editor
            .create(ArticleTable::Articles, new_article("https://desk.example/10"), None)
            .await
            .unwrap();
        storage.drop_edit_ledger().unwrap();

        let changes = ArticleChanges {
            priority: Some(5),
            ..Default::default()
        };
        let updated = editor
            .update(article.id, ArticleTable::Articles, &changes, Some("ed"))
            .await
            .unwrap();
        assert_eq!(updated.priority, Some(5));

        let stored = storage.get_article(ArticleTable::Articles, article.id).unwrap().unwrap();
        assert_eq!(stored.priority, Some(5));
        assert!(editor.history(article.id, ArticleTable::Articles).is_err());
    }
}
