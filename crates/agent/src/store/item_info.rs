// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;

use super::Store;

#[derive(Debug, Clone)]
pub struct ItemInfo {
    pub account_id: String,
    pub item_id: String,
    pub title: String,
    pub price: String,
    pub detail_text: String,
    pub is_multi_spec: bool,
}

impl Store {
    /// Persists only when both `title` and `detail_text` are non-empty, per §3.
    pub fn batch_save_item_basic_info(&self, items: &[ItemInfo]) -> Result<(), EngineError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for item in items {
            if item.title.is_empty() || item.detail_text.is_empty() {
                continue;
            }
            tx.execute(
                "INSERT OR REPLACE INTO item_info (account_id, item_id, title, price, detail_text, is_multi_spec)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.account_id,
                    item.item_id,
                    item.title,
                    item.price,
                    item.detail_text,
                    item.is_multi_spec as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Updates only the detail field, preserving title/price, per §4.2.
    pub fn update_item_detail(&self, account_id: &str, item_id: &str, text: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE item_info SET detail_text = ?1 WHERE account_id = ?2 AND item_id = ?3",
            params![text, account_id, item_id],
        )?;
        Ok(())
    }

    pub fn get_item_info(&self, account_id: &str, item_id: &str) -> Result<Option<ItemInfo>, EngineError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT account_id, item_id, title, price, detail_text, is_multi_spec FROM item_info
             WHERE account_id = ?1 AND item_id = ?2",
            params![account_id, item_id],
            |row| {
                Ok(ItemInfo {
                    account_id: row.get(0)?,
                    item_id: row.get(1)?,
                    title: row.get(2)?,
                    price: row.get(3)?,
                    detail_text: row.get(4)?,
                    is_multi_spec: row.get::<_, i64>(5)? != 0,
                })
            },
        )
        .optional()
        .map_err(EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_rows_missing_title_or_detail() {
        let store = Store::open_in_memory().unwrap();
        let items = vec![
            ItemInfo {
                account_id: "acc1".into(),
                item_id: "1".into(),
                title: "".into(),
                price: "10".into(),
                detail_text: "detail".into(),
                is_multi_spec: false,
            },
            ItemInfo {
                account_id: "acc1".into(),
                item_id: "2".into(),
                title: "title".into(),
                price: "10".into(),
                detail_text: "detail".into(),
                is_multi_spec: false,
            },
        ];
        store.batch_save_item_basic_info(&items).unwrap();
        assert!(store.get_item_info("acc1", "1").unwrap().is_none());
        assert!(store.get_item_info("acc1", "2").unwrap().is_some());
    }

    #[test]
    fn update_item_detail_preserves_title() {
        let store = Store::open_in_memory().unwrap();
        let items = vec![ItemInfo {
            account_id: "acc1".into(),
            item_id: "1".into(),
            title: "iPhone 15".into(),
            price: "5000".into(),
            detail_text: "old detail".into(),
            is_multi_spec: false,
        }];
        store.batch_save_item_basic_info(&items).unwrap();
        store.update_item_detail("acc1", "1", "new detail").unwrap();
        let info = store.get_item_info("acc1", "1").unwrap().unwrap();
        assert_eq!(info.title, "iPhone 15");
        assert_eq!(info.detail_text, "new detail");
    }
}
