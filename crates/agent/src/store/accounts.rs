// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;

use super::Store;

#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub owner_user_id: String,
    pub cookie_blob: String,
    pub enabled: bool,
    pub auto_confirm_enabled: bool,
}

impl Store {
    /// Idempotent cookie save. Never rewrites `owner_user_id` when `owner_user_id`
    /// is `None` — satisfies P6 (cookie owner preservation).
    pub fn save_cookie(
        &self,
        account_id: &str,
        blob: &str,
        owner_user_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        let existing: Option<String> = conn
            .query_row(
                "SELECT owner_user_id FROM accounts WHERE id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(current_owner) => {
                let owner = owner_user_id.unwrap_or(&current_owner);
                conn.execute(
                    "UPDATE accounts SET cookie_blob = ?1, owner_user_id = ?2, updated_at = datetime('now') WHERE id = ?3",
                    params![blob, owner, account_id],
                )?;
            }
            None => {
                let owner = owner_user_id.unwrap_or_default();
                conn.execute(
                    "INSERT INTO accounts (id, owner_user_id, cookie_blob, enabled) VALUES (?1, ?2, ?3, 1)",
                    params![account_id, owner, blob],
                )?;
            }
        }
        Ok(())
    }

    pub fn get_account(&self, account_id: &str) -> Result<Option<Account>, EngineError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, owner_user_id, cookie_blob, enabled, auto_confirm_enabled FROM accounts WHERE id = ?1",
            params![account_id],
            |row| {
                Ok(Account {
                    id: row.get(0)?,
                    owner_user_id: row.get(1)?,
                    cookie_blob: row.get(2)?,
                    enabled: row.get::<_, i64>(3)? != 0,
                    auto_confirm_enabled: row.get::<_, i64>(4)? != 0,
                })
            },
        )
        .optional()
        .map_err(EngineError::from)
    }

    pub fn list_enabled_accounts(&self) -> Result<Vec<Account>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, owner_user_id, cookie_blob, enabled, auto_confirm_enabled FROM accounts WHERE enabled = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                owner_user_id: row.get(1)?,
                cookie_blob: row.get(2)?,
                enabled: row.get::<_, i64>(3)? != 0,
                auto_confirm_enabled: row.get::<_, i64>(4)? != 0,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(EngineError::from)
    }

    pub fn set_account_enabled(&self, account_id: &str, enabled: bool) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE accounts SET enabled = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![enabled as i64, account_id],
        )?;
        Ok(())
    }

    pub fn remove_account(&self, account_id: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM accounts WHERE id = ?1", params![account_id])?;
        Ok(())
    }
}
