//! Append-only field-level audit trail for manual article edits.

use chrono::Utc;

use crate::error::Result;
use crate::models::{ArticleTable, EditRecord, FieldChange};
use crate::storage::Storage;

pub struct EditLedger<'a> {
    storage: &'a Storage,
}

impl<'a> EditLedger<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Record one field change. No-op changes write nothing.
    ///
    /// Never fails the caller: a ledger write error is logged and reported as
    /// `false`, and the primary update stands.
    pub fn record(
        &self,
        article_id: i64,
        table: ArticleTable,
        field: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        editor: Option<&str>,
    ) -> bool {
        let change = FieldChange::new(field, old_value, new_value);
        self.record_all(article_id, table, &[change], editor) > 0
    }

    /// Record several changes from one update under a shared timestamp.
    /// Returns how many rows were written.
    pub fn record_all(
        &self,
        article_id: i64,
        table: ArticleTable,
        changes: &[FieldChange],
        editor: Option<&str>,
    ) -> usize {
        let effective: Vec<FieldChange> = changes
            .iter()
            .filter(|c| !c.is_noop())
            .cloned()
            .collect();

        if effective.is_empty() {
            return 0;
        }

        match self
            .storage
            .append_edits(table, article_id, &effective, editor, Utc::now())
        {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(
                    "Failed to ledger {} change(s) for {} {}: {}",
                    effective.len(),
                    table,
                    article_id,
                    e
                );
                0
            }
        }
    }

    pub fn history(&self, article_id: i64, table: ArticleTable) -> Result<Vec<EditRecord>> {
        self.storage.edits_for(table, article_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_priority_writes_nothing() {
        let storage = Storage::in_memory().unwrap();
        let ledger = EditLedger::new(&storage);

        let wrote = ledger.record(1, ArticleTable::Articles, "priority", Some("3"), Some("3"), None);
        assert!(!wrote);
        assert!(ledger.history(1, ArticleTable::Articles).unwrap().is_empty());
    }

    #[test]
    fn test_changed_priority_writes_one_row() {
        let storage = Storage::in_memory().unwrap();
        let ledger = EditLedger::new(&storage);

        let change = FieldChange::new("priority", Some(3u8), Some(5u8));
        let written = ledger.record_all(1, ArticleTable::Articles, &[change], Some("editor@desk"));
        assert_eq!(written, 1);

        let history = ledger.history(1, ArticleTable::Articles).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].field, "priority");
        assert_eq!(history[0].old_value.as_deref(), Some("3"));
        assert_eq!(history[0].new_value.as_deref(), Some("5"));
        assert_eq!(history[0].editor.as_deref(), Some("editor@desk"));
    }

    #[test]
    fn test_batch_shares_timestamp_and_skips_noops() {
        let storage = Storage::in_memory().unwrap();
        let ledger = EditLedger::new(&storage);

        let changes = vec![
            FieldChange::new("priority", Some(2u8), Some(4u8)),
            FieldChange::new("is_local", Some(true), Some(true)),
            FieldChange::new::<&str, &str>("bullet", None, Some("New summary.")),
        ];
        assert_eq!(ledger.record_all(9, ArticleTable::FirstPartyArticles, &changes, None), 2);

        let history = ledger.history(9, ArticleTable::FirstPartyArticles).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].edited_at, history[1].edited_at);
        assert!(ledger.history(9, ArticleTable::Articles).unwrap().is_empty());
    }

    #[test]
    fn test_null_and_empty_are_distinct() {
        let storage = Storage::in_memory().unwrap();
        let ledger = EditLedger::new(&storage);

        assert!(ledger.record(3, ArticleTable::Articles, "bullet", None, Some(""), None));
        let history = ledger.history(3, ArticleTable::Articles).unwrap();
        assert_eq!(history[0].old_value, None);
        assert_eq!(history[0].new_value.as_deref(), Some(""));
    }

    #[test]
    fn test_write_failure_reports_zero() {
        let storage = Storage::in_memory().unwrap();
        storage.drop_edit_ledger().unwrap();
        let ledger = EditLedger::new(&storage);

        let change = FieldChange::new("priority", Some(3u8), Some(5u8));
        assert_eq!(ledger.record_all(1, ArticleTable::Articles, &[change], None), 0);
        assert!(!ledger.record(1, ArticleTable::Articles, "bullet", None, Some("x"), None));
    }
}
