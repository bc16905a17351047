use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::article::ArticleTable;

/// One append-only audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub id: i64,
    pub article_id: i64,
    pub table: ArticleTable,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub editor: Option<String>,
    pub edited_at: DateTime<Utc>,
}

/// A before/after pair for one field, already stringified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldChange {
    pub fn new<O, N>(field: &str, old_value: Option<O>, new_value: Option<N>) -> Self
    where
        O: ToString,
        N: ToString,
    {
        Self {
            field: field.to_string(),
            old_value: old_value.map(|v| v.to_string()),
            new_value: new_value.map(|v| v.to_string()),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.old_value == self.new_value
    }
}
