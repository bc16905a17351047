//! Request shapes that start work: the inbound article webhook and the
//! manual edit request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::ArticleEditor;
use crate::error::{Error, Result};
use crate::models::{Article, ArticleChanges, ArticleTable, NewArticle, RawArticle};

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// When set, every call must present the same secret.
    pub secret: Option<String>,
    pub priority_floor: u8,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            priority_floor: 4,
        }
    }
}

impl From<&crate::config::Config> for WebhookSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            secret: config.webhook_secret.clone(),
            priority_floor: config.webhook_priority_floor,
        }
    }
}

/// Article pushed by a first-party publisher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "html")]
    pub content: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_city: Option<String>,
}

impl WebhookPayload {
    /// Check the secret and required fields, then build the first-party
    /// article the pipeline ingests.
    pub fn into_raw_article(
        self,
        presented_secret: Option<&str>,
        settings: &WebhookSettings,
    ) -> Result<RawArticle> {
        if let Some(expected) = settings.secret.as_deref() {
            if presented_secret != Some(expected) {
                return Err(Error::Unauthorized);
            }
        }

        let url = required(self.url, "url")?;
        let title = required(self.title, "title")?;

        Ok(RawArticle {
            url,
            title,
            content: self.content,
            published_at: self.published_at,
            source_name: self.source_name,
            source_city: self.source_city,
            table: ArticleTable::FirstPartyArticles,
            priority_floor: Some(settings.priority_floor),
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("{} is required", field)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditAction {
    Create,
    Update,
    Discard,
    Publish,
    AddMarket,
    RemoveMarket,
}

/// One manual edit, as submitted from the editing desk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRequest {
    pub action: EditAction,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub table: Option<ArticleTable>,
    #[serde(default)]
    pub changes: Option<ArticleChanges>,
    #[serde(default)]
    pub article: Option<NewArticle>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub editor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EditOutcome {
    Article(Article),
    Markets { changed: bool, article: Article },
}

/// An [`EditRequest`] with everything its action needs present.
enum EditCommand {
    Create(NewArticle),
    Update(i64, ArticleChanges),
    Discard(i64),
    Publish(i64),
    AddMarket(i64, String),
    RemoveMarket(i64, String),
}

impl EditRequest {
    /// Reject requests missing what their action needs, before touching storage.
    pub fn validate(&self) -> Result<()> {
        self.command().map(|_| ())
    }

    fn command(&self) -> Result<(ArticleTable, EditCommand)> {
        let table = self
            .table
            .ok_or_else(|| Error::InvalidInput("table is required".to_string()))?;

        let id = || {
            self.id
                .ok_or_else(|| Error::InvalidInput("id is required".to_string()))
        };
        let market = || {
            self.market
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .ok_or_else(|| Error::InvalidInput("market is required".to_string()))
        };

        let command = match self.action {
            EditAction::Create => {
                let article = self.article.clone().ok_or_else(|| {
                    Error::InvalidInput("article is required for create".to_string())
                })?;
                EditCommand::Create(article)
            }
            EditAction::Update => {
                let id = id()?;
                let changes = self
                    .changes
                    .clone()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| Error::InvalidInput("no changes supplied".to_string()))?;
                EditCommand::Update(id, changes)
            }
            EditAction::Discard => EditCommand::Discard(id()?),
            EditAction::Publish => EditCommand::Publish(id()?),
            EditAction::AddMarket => EditCommand::AddMarket(id()?, market()?),
            EditAction::RemoveMarket => EditCommand::RemoveMarket(id()?, market()?),
        };

        Ok((table, command))
    }

    pub async fn dispatch(self, editor: &ArticleEditor) -> Result<EditOutcome> {
        let (table, command) = self.command()?;
        let who = self.editor.as_deref();

        let outcome = match command {
            EditCommand::Create(article) => EditOutcome::Article(editor.create(table, article, who).await?),
            EditCommand::Update(id, changes) => {
                EditOutcome::Article(editor.update(id, table, &changes, who).await?)
            }
            EditCommand::Discard(id) => EditOutcome::Article(editor.discard(id, table, who).await?),
            EditCommand::Publish(id) => EditOutcome::Article(editor.publish(id, table, who).await?),
            EditCommand::AddMarket(id, market) => EditOutcome::Markets {
                changed: editor.add_market(id, table, &market, who)?,
                article: editor.get(id, table)?,
            },
            EditCommand::RemoveMarket(id, market) => EditOutcome::Markets {
                changed: editor.remove_market(id, table, &market, who)?,
                article: editor.get(id, table)?,
            },
        };

        Ok(outcome)
    }
}
