// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only order-status event log (§3 `[FULL]`). Durably satisfies §4.5
//! step 4's "log and stop" for order-status frames.

use rusqlite::params;

use crate::error::EngineError;

use super::Store;

impl Store {
    pub fn log_order_status_event(
        &self,
        account_id: &str,
        order_id: &str,
        status_text: &str,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO order_status_events (account_id, order_id, status_text) VALUES (?1, ?2, ?3)",
            params![account_id, order_id, status_text],
        )?;
        Ok(())
    }

    pub fn count_order_status_events(&self, account_id: &str) -> Result<i64, EngineError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM order_status_events WHERE account_id = ?1",
            params![account_id],
            |row| row.get(0),
        )
        .map_err(EngineError::from)
    }
}
