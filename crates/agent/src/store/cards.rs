// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;

use super::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    Api,
    Text,
    Data,
}

impl CardKind {
    fn as_str(&self) -> &'static str {
        match self {
            CardKind::Api => "api",
            CardKind::Text => "text",
            CardKind::Data => "data",
        }
    }

    fn from_str(s: &str) -> CardKind {
        match s {
            "api" => CardKind::Api,
            "data" => CardKind::Data,
            _ => CardKind::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Card {
    pub id: String,
    pub owner_user_id: String,
    pub name: String,
    pub kind: CardKind,
    pub payload: String,
    pub description: Option<String>,
    pub delay_seconds: u64,
    pub is_multi_spec: bool,
    pub spec_name: Option<String>,
    pub spec_value: Option<String>,
}

fn row_to_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    let kind: String = row.get(3)?;
    Ok(Card {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        name: row.get(2)?,
        kind: CardKind::from_str(&kind),
        payload: row.get(4)?,
        description: row.get(5)?,
        delay_seconds: row.get::<_, i64>(6)? as u64,
        is_multi_spec: row.get::<_, i64>(7)? != 0,
        spec_name: row.get(8)?,
        spec_value: row.get(9)?,
    })
}

const CARD_COLUMNS: &str =
    "id, owner_user_id, name, kind, payload, description, delay_seconds, is_multi_spec, spec_name, spec_value";

impl Store {
    pub fn save_card(&self, card: &Card) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO cards
                (id, owner_user_id, name, kind, payload, description, delay_seconds, is_multi_spec, spec_name, spec_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                card.id,
                card.owner_user_id,
                card.name,
                card.kind.as_str(),
                card.payload,
                card.description,
                card.delay_seconds as i64,
                card.is_multi_spec as i64,
                card.spec_name,
                card.spec_value,
            ],
        )?;
        Ok(())
    }

    pub fn get_card(&self, card_id: &str) -> Result<Option<Card>, EngineError> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
            params![card_id],
            row_to_card,
        )
        .optional()
        .map_err(EngineError::from)
    }

    /// Atomically pops the head row of a `data` card's FIFO payload. Empty
    /// payload (or no rows) fails soft with `Ok(None)`, matching §4.2's
    /// "fails-soft with nil when empty". Satisfies P8 under concurrent callers
    /// because the read-pop-write happens inside one SQLite transaction while
    /// holding the store's single connection lock.
    pub fn consume_batch_data(&self, card_id: &str) -> Result<Option<String>, EngineError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let payload: Option<String> = tx
            .query_row("SELECT payload FROM cards WHERE id = ?1", params![card_id], |row| row.get(0))
            .optional()?;

        let Some(payload) = payload else {
            tx.commit()?;
            return Ok(None);
        };

        let mut lines: Vec<&str> = payload.lines().filter(|l| !l.is_empty()).collect();
        if lines.is_empty() {
            tx.commit()?;
            return Ok(None);
        }

        let head = lines.remove(0).to_owned();
        let remainder = lines.join("\n");
        tx.execute("UPDATE cards SET payload = ?1 WHERE id = ?2", params![remainder, card_id])?;
        tx.commit()?;
        Ok(Some(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_card(id: &str, payload: &str) -> Card {
        Card {
            id: id.to_owned(),
            owner_user_id: "owner".to_owned(),
            name: "test card".to_owned(),
            kind: CardKind::Data,
            payload: payload.to_owned(),
            description: None,
            delay_seconds: 0,
            is_multi_spec: false,
            spec_name: None,
            spec_value: None,
        }
    }

    #[test]
    fn consume_batch_data_pops_fifo_head() {
        let store = Store::open_in_memory().unwrap();
        store.save_card(&sample_card("c1", "k1\nk2")).unwrap();

        assert_eq!(store.consume_batch_data("c1").unwrap().as_deref(), Some("k1"));
        assert_eq!(store.consume_batch_data("c1").unwrap().as_deref(), Some("k2"));
        assert_eq!(store.consume_batch_data("c1").unwrap(), None);
    }

    #[test]
    fn consume_batch_data_concurrent_yields_distinct_rows() {
        // P8: N workers on a card with K rows yield min(N,K) distinct rows.
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.save_card(&sample_card("c1", "k1\nk2\nk3")).unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || store.consume_batch_data("c1").unwrap()));
        }

        let mut results: Vec<String> = handles.into_iter().filter_map(|h| h.join().unwrap()).collect();
        results.sort();
        assert_eq!(results, vec!["k1".to_owned(), "k2".to_owned(), "k3".to_owned()]);

        let card = store.get_card("c1").unwrap().unwrap();
        assert!(card.payload.is_empty());
    }
}
