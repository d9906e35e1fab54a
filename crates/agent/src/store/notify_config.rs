// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification channel rows and event-kind bindings (§3 `[FULL]`). `config_json`
//! is opaque to the core — only C9's contract interprets it.

use rusqlite::params;

use crate::error::EngineError;

use super::Store;

#[derive(Debug, Clone)]
pub struct NotificationChannel {
    pub id: String,
    pub owner_user_id: String,
    pub channel_type: String,
    pub config_json: String,
    pub enabled: bool,
}

impl Store {
    pub fn save_notification_channel(&self, channel: &NotificationChannel) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO notification_channels (id, owner_user_id, channel_type, config_json, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                channel.id,
                channel.owner_user_id,
                channel.channel_type,
                channel.config_json,
                channel.enabled as i64
            ],
        )?;
        Ok(())
    }

    pub fn bind_notification_channel(
        &self,
        owner_user_id: &str,
        event_kind: &str,
        channel_id: &str,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO notification_bindings (owner_user_id, event_kind, channel_id) VALUES (?1, ?2, ?3)",
            params![owner_user_id, event_kind, channel_id],
        )?;
        Ok(())
    }

    /// Channels bound to `event_kind` for `owner_user_id`, enabled only.
    pub fn channels_for_event(
        &self,
        owner_user_id: &str,
        event_kind: &str,
    ) -> Result<Vec<NotificationChannel>, EngineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.owner_user_id, c.channel_type, c.config_json, c.enabled
             FROM notification_channels c
             JOIN notification_bindings b ON b.channel_id = c.id
             WHERE b.owner_user_id = ?1 AND b.event_kind = ?2 AND c.enabled = 1",
        )?;
        let rows = stmt.query_map(params![owner_user_id, event_kind], |row| {
            Ok(NotificationChannel {
                id: row.get(0)?,
                owner_user_id: row.get(1)?,
                channel_type: row.get(2)?,
                config_json: row.get(3)?,
                enabled: row.get::<_, i64>(4)? != 0,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(EngineError::from)
    }
}
