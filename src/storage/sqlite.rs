use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::models::{
    Article, ArticleDraft, ArticleFilter, ArticleTable, EditRecord, FieldChange, MarketName,
    WeatherSnapshot,
};

const ARTICLE_COLUMNS: &str = "id, url, source_url, source_name, source_city, title, content, \
     published_at, fetched_at, location, market, is_local, priority, bullet, \
     is_accessible, is_discarded, is_used, priority_floor";

/// SQLite-backed store. Every write is an upsert on a natural key, so
/// re-running a pipeline over the same inputs is safe.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_db()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_db()?;
        Ok(storage)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StorageUnavailable("connection lock poisoned".to_string()))
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.conn()?;

        for table in ArticleTable::ALL {
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {t} (
                    id INTEGER PRIMARY KEY,
                    url TEXT UNIQUE NOT NULL,
                    source_url TEXT NOT NULL,
                    source_name TEXT,
                    source_city TEXT,
                    title TEXT NOT NULL,
                    content TEXT,
                    published_at TEXT,
                    fetched_at TEXT NOT NULL,
                    location TEXT,
                    market TEXT,
                    is_local INTEGER NOT NULL DEFAULT 1,
                    priority INTEGER,
                    bullet TEXT,
                    is_accessible INTEGER NOT NULL DEFAULT 1,
                    is_discarded INTEGER NOT NULL DEFAULT 0,
                    is_used INTEGER NOT NULL DEFAULT 0,
                    priority_floor INTEGER
                );

                CREATE INDEX IF NOT EXISTS idx_{t}_source_url ON {t}(source_url);
                CREATE INDEX IF NOT EXISTS idx_{t}_market ON {t}(market);
                "#,
                t = table.as_str()
            ))?;

            // Databases created before the floor was stored.
            let has_floor: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = 'priority_floor'",
                    table.as_str()
                ),
                [],
                |row| row.get(0),
            )?;
            if has_floor == 0 {
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN priority_floor INTEGER",
                    table.as_str()
                ))?;
            }
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS article_markets (
                id INTEGER PRIMARY KEY,
                article_id INTEGER NOT NULL,
                table_name TEXT NOT NULL,
                market TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(article_id, table_name, market)
            );

            CREATE TABLE IF NOT EXISTS article_edits (
                id INTEGER PRIMARY KEY,
                article_id INTEGER NOT NULL,
                table_name TEXT NOT NULL,
                field TEXT NOT NULL,
                old_value TEXT,
                new_value TEXT,
                editor TEXT,
                edited_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS weather (
                city TEXT PRIMARY KEY,
                current_temp INTEGER,
                current_conditions TEXT,
                forecast_high INTEGER,
                forecast_low INTEGER,
                forecast_conditions TEXT,
                detailed_forecast TEXT,
                precip_chance INTEGER,
                temperature_trend TEXT,
                bullet TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_article_edits_article ON article_edits(article_id, table_name);
            CREATE INDEX IF NOT EXISTS idx_article_markets_article ON article_markets(article_id, table_name);
            "#,
        )?;

        Ok(())
    }

    // --- Articles ---

    /// Insert or update by URL. Editorial flags (discarded/used) survive re-ingestion.
    pub fn upsert_article(&self, draft: &ArticleDraft) -> Result<Article> {
        {
            let conn = self.conn()?;
            conn.execute(
                &format!(
                    r#"
                    INSERT INTO {t} (url, source_url, source_name, source_city, title, content,
                                     published_at, fetched_at, location, market, is_local,
                                     priority, bullet, is_accessible, priority_floor)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                    ON CONFLICT(url) DO UPDATE SET
                        source_url = excluded.source_url,
                        source_name = excluded.source_name,
                        source_city = excluded.source_city,
                        title = excluded.title,
                        content = excluded.content,
                        published_at = excluded.published_at,
                        fetched_at = excluded.fetched_at,
                        location = excluded.location,
                        market = excluded.market,
                        is_local = excluded.is_local,
                        priority = excluded.priority,
                        bullet = excluded.bullet,
                        is_accessible = excluded.is_accessible,
                        priority_floor = excluded.priority_floor
                    "#,
                    t = draft.table.as_str()
                ),
                params![
                    draft.url,
                    draft.source_url,
                    draft.source_name,
                    draft.source_city,
                    draft.title,
                    draft.content,
                    draft.published_at.map(|d| d.to_rfc3339()),
                    draft.fetched_at.to_rfc3339(),
                    draft.location,
                    draft.market.as_ref().map(|m| m.as_str().to_string()),
                    draft.is_local,
                    draft.priority,
                    draft.bullet,
                    draft.is_accessible,
                    draft.priority_floor,
                ],
            )?;
        }

        self.get_article_by_url(draft.table, &draft.url)?
            .ok_or_else(|| Error::StorageUnavailable(format!("upserted row for {} vanished", draft.url)))
    }

    pub fn get_article(&self, table: ArticleTable, id: i64) -> Result<Option<Article>> {
        let article = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT {} FROM {} WHERE id = ?1", ARTICLE_COLUMNS, table.as_str()),
                params![id],
                |row| row_to_article(table, row),
            )
            .optional()?
        };

        article.map(|a| self.hydrate(a)).transpose()
    }

    pub fn get_article_by_url(&self, table: ArticleTable, url: &str) -> Result<Option<Article>> {
        let article = {
            let conn = self.conn()?;
            conn.query_row(
                &format!("SELECT {} FROM {} WHERE url = ?1", ARTICLE_COLUMNS, table.as_str()),
                params![url],
                |row| row_to_article(table, row),
            )
            .optional()?
        };

        article.map(|a| self.hydrate(a)).transpose()
    }

    /// Whether any row (including fan-out topics) came from this source URL.
    pub fn has_source_url(&self, table: ArticleTable, source_url: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE source_url = ?1", table.as_str()),
            params![source_url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn articles_by_source_url(
        &self,
        table: ArticleTable,
        source_url: &str,
    ) -> Result<Vec<Article>> {
        let articles = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} WHERE source_url = ?1 ORDER BY id",
                ARTICLE_COLUMNS,
                table.as_str()
            ))?;
            let rows = stmt.query_map(params![source_url], |row| row_to_article(table, row))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        articles.into_iter().map(|a| self.hydrate(a)).collect()
    }

    /// Rows matching `filter`, highest priority first, then newest.
    pub fn list_articles(&self, table: ArticleTable, filter: &ArticleFilter) -> Result<Vec<Article>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(market) = &filter.market {
            values.push(Value::Text(market.as_str().to_string()));
            clauses.push(format!("market = ?{}", values.len()));
        }
        if filter.local_only {
            clauses.push("is_local = 1".to_string());
        }
        if filter.accessible_only {
            clauses.push("is_accessible = 1".to_string());
        }
        if !filter.include_discarded {
            clauses.push("is_discarded = 0".to_string());
        }
        if filter.missing_market {
            clauses.push("market IS NULL".to_string());
        }
        if let Some(since) = filter.since {
            values.push(Value::Text(since.to_rfc3339()));
            clauses.push(format!("fetched_at >= ?{}", values.len()));
        }

        let mut sql = format!("SELECT {} FROM {}", ARTICLE_COLUMNS, table.as_str());
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY priority IS NULL, priority DESC, published_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let articles = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                row_to_article(table, row)
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        articles.into_iter().map(|a| self.hydrate(a)).collect()
    }

    /// Overwrite every mutable column of an existing row.
    pub fn save_article(&self, article: &Article) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            &format!(
                r#"
                UPDATE {t} SET
                    title = ?1, content = ?2, location = ?3, market = ?4, is_local = ?5,
                    priority = ?6, bullet = ?7, is_accessible = ?8, is_discarded = ?9,
                    is_used = ?10
                WHERE id = ?11
                "#,
                t = article.table.as_str()
            ),
            params![
                article.title,
                article.content,
                article.location,
                article.market.as_ref().map(|m| m.as_str().to_string()),
                article.is_local,
                article.priority,
                article.bullet,
                article.is_accessible,
                article.is_discarded,
                article.is_used,
                article.id,
            ],
        )?;

        if updated == 0 {
            return Err(Error::NotFound {
                id: article.id,
                table: article.table,
            });
        }
        Ok(())
    }

    pub fn set_market(&self, table: ArticleTable, id: i64, market: &MarketName) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("UPDATE {} SET market = ?1 WHERE id = ?2", table.as_str()),
            params![market.as_str(), id],
        )?;
        Ok(())
    }

    fn hydrate(&self, mut article: Article) -> Result<Article> {
        article.additional_markets = self.additional_markets(article.table, article.id)?;
        Ok(article)
    }

    // --- Additional markets ---

    pub fn additional_markets(&self, table: ArticleTable, article_id: i64) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT market FROM article_markets WHERE article_id = ?1 AND table_name = ?2 ORDER BY id",
        )?;
        let markets = stmt.query_map(params![article_id, table.as_str()], |row| row.get(0))?;
        markets
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Returns `true` when a row was inserted, `false` if it already existed.
    pub fn add_market(&self, table: ArticleTable, article_id: i64, market: &str) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO article_markets (article_id, table_name, market, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![article_id, table.as_str(), market, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    /// Returns `true` when a row was deleted.
    pub fn remove_market(&self, table: ArticleTable, article_id: i64, market: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM article_markets WHERE article_id = ?1 AND table_name = ?2 AND market = ?3",
            params![article_id, table.as_str(), market],
        )?;
        Ok(deleted > 0)
    }

    // --- Edit ledger ---

    /// Append all changes in one transaction with a shared timestamp.
    pub fn append_edits(
        &self,
        table: ArticleTable,
        article_id: i64,
        changes: &[FieldChange],
        editor: Option<&str>,
        edited_at: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO article_edits (article_id, table_name, field, old_value, new_value, editor, edited_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for change in changes {
                stmt.execute(params![
                    article_id,
                    table.as_str(),
                    change.field,
                    change.old_value,
                    change.new_value,
                    editor,
                    edited_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(changes.len())
    }

    /// Makes every later ledger write fail.
    #[cfg(test)]
    pub(crate) fn drop_edit_ledger(&self) -> Result<()> {
        self.conn()?.execute_batch("DROP TABLE article_edits")?;
        Ok(())
    }

    pub fn edits_for(&self, table: ArticleTable, article_id: i64) -> Result<Vec<EditRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, article_id, field, old_value, new_value, editor, edited_at
            FROM article_edits
            WHERE article_id = ?1 AND table_name = ?2
            ORDER BY edited_at DESC, id DESC
            "#,
        )?;

        let edits = stmt.query_map(params![article_id, table.as_str()], |row| {
            Ok(EditRecord {
                id: row.get(0)?,
                article_id: row.get(1)?,
                table,
                field: row.get(2)?,
                old_value: row.get(3)?,
                new_value: row.get(4)?,
                editor: row.get(5)?,
                edited_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
            })
        })?;

        edits
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // --- Weather ---

    pub fn upsert_weather(&self, snapshot: &WeatherSnapshot) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO weather (city, current_temp, current_conditions, forecast_high, forecast_low,
                                 forecast_conditions, detailed_forecast, precip_chance,
                                 temperature_trend, bullet, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(city) DO UPDATE SET
                current_temp = excluded.current_temp,
                current_conditions = excluded.current_conditions,
                forecast_high = excluded.forecast_high,
                forecast_low = excluded.forecast_low,
                forecast_conditions = excluded.forecast_conditions,
                detailed_forecast = excluded.detailed_forecast,
                precip_chance = excluded.precip_chance,
                temperature_trend = excluded.temperature_trend,
                bullet = excluded.bullet,
                updated_at = excluded.updated_at
            "#,
            params![
                snapshot.city,
                snapshot.current_temp,
                snapshot.current_conditions,
                snapshot.forecast_high,
                snapshot.forecast_low,
                snapshot.forecast_conditions,
                snapshot.detailed_forecast,
                snapshot.precip_chance,
                snapshot.temperature_trend,
                snapshot.bullet,
                snapshot.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_weather(&self, city: &str) -> Result<Option<WeatherSnapshot>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM weather WHERE city = ?1",
            params![city],
            row_to_weather,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_weather(&self) -> Result<Vec<WeatherSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM weather ORDER BY city")?;
        let rows = stmt.query_map([], row_to_weather)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_article(table: ArticleTable, row: &Row<'_>) -> rusqlite::Result<Article> {
    let published_at = row
        .get::<_, Option<String>>(7)?
        .map(|s| parse_timestamp(7, &s))
        .transpose()?;
    let fetched_at = parse_timestamp(8, &row.get::<_, String>(8)?)?;

    Ok(Article {
        id: row.get(0)?,
        table,
        url: row.get(1)?,
        source_url: row.get(2)?,
        source_name: row.get(3)?,
        source_city: row.get(4)?,
        title: row.get(5)?,
        content: row.get(6)?,
        published_at,
        fetched_at,
        location: row.get(9)?,
        market: row.get::<_, Option<String>>(10)?.map(MarketName::from),
        is_local: row.get(11)?,
        priority: row.get(12)?,
        bullet: row.get(13)?,
        is_accessible: row.get(14)?,
        is_discarded: row.get(15)?,
        is_used: row.get(16)?,
        priority_floor: row.get(17)?,
        additional_markets: Vec::new(),
    })
}

fn row_to_weather(row: &Row<'_>) -> rusqlite::Result<WeatherSnapshot> {
    Ok(WeatherSnapshot {
        city: row.get("city")?,
        current_temp: row.get("current_temp")?,
        current_conditions: row.get("current_conditions")?,
        forecast_high: row.get("forecast_high")?,
        forecast_low: row.get("forecast_low")?,
        forecast_conditions: row.get("forecast_conditions")?,
        detailed_forecast: row.get("detailed_forecast")?,
        precip_chance: row.get("precip_chance")?,
        temperature_trend: row.get("temperature_trend")?,
        bullet: row.get("bullet")?,
        updated_at: parse_timestamp(10, &row.get::<_, String>("updated_at")?)?,
    })
}
