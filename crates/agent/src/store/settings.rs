// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default-reply and AI-settings rows (§4.6 steps 4-5). One row per
//! account; absence means the feature is unconfigured, not an error.

use rusqlite::{params, OptionalExtension};

use crate::error::EngineError;

use super::Store;

#[derive(Debug, Clone)]
pub struct DefaultReply {
    pub reply_text: String,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct AiSettings {
    pub enabled: bool,
    pub model_name: Option<String>,
    pub system_prompt: Option<String>,
}

impl Store {
    pub fn save_default_reply(&self, account_id: &str, reply_text: &str, enabled: bool) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO default_replies (account_id, reply_text, enabled) VALUES (?1, ?2, ?3)",
            params![account_id, reply_text, enabled as i64],
        )?;
        Ok(())
    }

    pub fn get_default_reply(&self, account_id: &str) -> Result<Option<DefaultReply>, EngineError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT reply_text, enabled FROM default_replies WHERE account_id = ?1",
            params![account_id],
            |row| Ok(DefaultReply { reply_text: row.get(0)?, enabled: row.get::<_, i64>(1)? != 0 }),
        )
        .optional()
        .map_err(EngineError::from)
    }

    pub fn save_ai_settings(
        &self,
        account_id: &str,
        enabled: bool,
        model_name: Option<&str>,
        system_prompt: Option<&str>,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO ai_settings (account_id, enabled, model_name, system_prompt)
             VALUES (?1, ?2, ?3, ?4)",
            params![account_id, enabled as i64, model_name, system_prompt],
        )?;
        Ok(())
    }

    pub fn get_ai_settings(&self, account_id: &str) -> Result<Option<AiSettings>, EngineError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT enabled, model_name, system_prompt FROM ai_settings WHERE account_id = ?1",
            params![account_id],
            |row| {
                Ok(AiSettings {
                    enabled: row.get::<_, i64>(0)? != 0,
                    model_name: row.get(1)?,
                    system_prompt: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(EngineError::from)
    }
}
