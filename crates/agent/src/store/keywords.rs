// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::params;

use crate::error::EngineError;

use super::schema::NO_ITEM_SCOPE;
use super::Store;

#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub account_id: String,
    pub keyword: String,
    pub reply_template: String,
    /// `None` means a global rule (no item scope).
    pub item_id: Option<String>,
}

impl Store {
    pub fn add_keyword_rule(
        &self,
        account_id: &str,
        keyword: &str,
        reply_template: &str,
        item_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO keywords (account_id, keyword, reply_template, item_id) VALUES (?1, ?2, ?3, ?4)",
            params![account_id, keyword, reply_template, item_id.unwrap_or(NO_ITEM_SCOPE)],
        )?;
        Ok(())
    }

    /// Ordered by keyword length descending, matching §4.2's contract.
    pub fn get_keywords_with_item(&self, account_id: &str) -> Result<Vec<KeywordRule>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT account_id, keyword, reply_template, item_id FROM keywords
             WHERE account_id = ?1
             ORDER BY length(keyword) DESC, keyword ASC",
        )?;
        let rows = stmt.query_map(params![account_id], |row| {
            let item_id: String = row.get(3)?;
            Ok(KeywordRule {
                account_id: row.get(0)?,
                keyword: row.get(1)?,
                reply_template: row.get(2)?,
                item_id: if item_id.is_empty() { None } else { Some(item_id) },
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_keyword_first() {
        let store = Store::open_in_memory().unwrap();
        store.add_keyword_rule("acc1", "发货", "稍等", None).unwrap();
        store.add_keyword_rule("acc1", "什么时候发货", "马上安排", None).unwrap();
        let rules = store.get_keywords_with_item("acc1").unwrap();
        assert_eq!(rules[0].keyword, "什么时候发货");
        assert_eq!(rules[1].keyword, "发货");
    }

    #[test]
    fn item_scoped_round_trips() {
        let store = Store::open_in_memory().unwrap();
        store.add_keyword_rule("acc1", "key", "reply", Some("item-1")).unwrap();
        let rules = store.get_keywords_with_item("acc1").unwrap();
        assert_eq!(rules[0].item_id.as_deref(), Some("item-1"));
    }
}
