// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::params;

use crate::error::EngineError;

use super::Store;

#[derive(Debug, Clone)]
pub struct DeliveryRule {
    pub id: i64,
    pub owner_user_id: String,
    pub keyword: String,
    pub card_id: String,
    pub delivery_count_used: i64,
}

fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveryRule> {
    Ok(DeliveryRule {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        keyword: row.get(2)?,
        card_id: row.get(3)?,
        delivery_count_used: row.get(4)?,
    })
}

impl Store {
    pub fn add_delivery_rule(&self, owner_user_id: &str, keyword: &str, card_id: &str) -> Result<i64, EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO delivery_rules (owner_user_id, keyword, card_id) VALUES (?1, ?2, ?3)",
            params![owner_user_id, keyword, card_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Rules whose `keyword` is contained in `search_text`, filtered to cards
    /// flagged multi-spec with an exact `(spec_name, spec_value)` match,
    /// sorted longest-keyword-first. Tie-break by rule id ascending is
    /// implicit: SQLite preserves insertion order for equal sort keys here
    /// because `id` is the table's rowid and ORDER BY is stable on ties only
    /// when the secondary key is explicit, so `id ASC` is listed explicitly.
    pub fn get_delivery_rules_by_keyword_and_spec(
        &self,
        search_text: &str,
        spec_name: &str,
        spec_value: &str,
    ) -> Result<Vec<DeliveryRule>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.owner_user_id, r.keyword, r.card_id, r.delivery_count_used FROM delivery_rules r
             JOIN cards c ON c.id = r.card_id
             WHERE c.is_multi_spec = 1 AND c.spec_name = ?1 AND c.spec_value = ?2
             ORDER BY length(r.keyword) DESC, r.id ASC",
        )?;
        let rows = stmt.query_map(params![spec_name, spec_value], row_to_rule)?;
        let all = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(EngineError::from)?;
        Ok(all.into_iter().filter(|r| search_text.contains(&r.keyword)).collect())
    }

    /// Rules whose `keyword` is contained in `search_text`, restricted to
    /// single-spec (non-multi-spec) cards, sorted longest-keyword-first.
    pub fn get_delivery_rules_by_keyword(&self, search_text: &str) -> Result<Vec<DeliveryRule>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT r.id, r.owner_user_id, r.keyword, r.card_id, r.delivery_count_used FROM delivery_rules r
             JOIN cards c ON c.id = r.card_id
             WHERE c.is_multi_spec = 0
             ORDER BY length(r.keyword) DESC, r.id ASC",
        )?;
        let rows = stmt.query_map([], row_to_rule)?;
        let all = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(EngineError::from)?;
        Ok(all.into_iter().filter(|r| search_text.contains(&r.keyword)).collect())
    }

    pub fn increment_delivery_times(&self, rule_id: i64) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE delivery_rules SET delivery_count_used = delivery_count_used + 1 WHERE id = ?1",
            params![rule_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::cards::{Card, CardKind};
    use super::*;

    fn generic_card(id: &str) -> Card {
        Card {
            id: id.to_owned(),
            owner_user_id: "owner".to_owned(),
            name: "generic".to_owned(),
            kind: CardKind::Text,
            payload: "KEY".to_owned(),
            description: None,
            delay_seconds: 0,
            is_multi_spec: false,
            spec_name: None,
            spec_value: None,
        }
    }

    fn multi_spec_card(id: &str, spec_name: &str, spec_value: &str) -> Card {
        Card {
            id: id.to_owned(),
            owner_user_id: "owner".to_owned(),
            name: "multi".to_owned(),
            kind: CardKind::Text,
            payload: "KEY-128G".to_owned(),
            description: None,
            delay_seconds: 0,
            is_multi_spec: true,
            spec_name: Some(spec_name.to_owned()),
            spec_value: Some(spec_value.to_owned()),
        }
    }

    #[test]
    fn multi_spec_rule_wins_over_generic() {
        let store = Store::open_in_memory().unwrap();
        store.save_card(&generic_card("generic")).unwrap();
        store.save_card(&multi_spec_card("ms", "容量", "128G")).unwrap();
        store.add_delivery_rule("owner", "iPhone", "generic").unwrap();
        store.add_delivery_rule("owner", "iPhone", "ms").unwrap();

        let spec_matches = store.get_delivery_rules_by_keyword_and_spec("iPhone 15", "容量", "128G").unwrap();
        assert_eq!(spec_matches.len(), 1);
        assert_eq!(spec_matches[0].card_id, "ms");
    }

    #[test]
    fn generic_rule_used_when_no_spec_obtainable() {
        let store = Store::open_in_memory().unwrap();
        store.save_card(&generic_card("generic")).unwrap();
        store.add_delivery_rule("owner", "iPhone", "generic").unwrap();

        let generic_matches = store.get_delivery_rules_by_keyword("iPhone 15").unwrap();
        assert_eq!(generic_matches.len(), 1);
        assert_eq!(generic_matches[0].card_id, "generic");
    }

    #[test]
    fn increment_delivery_times_persists() {
        let store = Store::open_in_memory().unwrap();
        store.save_card(&generic_card("generic")).unwrap();
        let rule_id = store.add_delivery_rule("owner", "iPhone", "generic").unwrap();
        store.increment_delivery_times(rule_id).unwrap();
        let matches = store.get_delivery_rules_by_keyword("iPhone 15").unwrap();
        assert_eq!(matches[0].delivery_count_used, 1);
    }
}
