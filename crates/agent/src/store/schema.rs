// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database schema. Called once at startup by `Store::open()` after WAL is
//! enabled. Adding a column: append an idempotent `ALTER TABLE ... ADD
//! COLUMN` at the end of `run_migrations()` — never edit existing DDL.

use rusqlite::Connection;

use crate::error::EngineError;

/// Sentinel stored in `keywords.item_id` / `keywords.item_id_key` to stand in
/// for "no item scope" (`{∅}` in §3). SQLite's `UNIQUE` treats distinct
/// `NULL`s as non-equal, which would let duplicate global rules slip past a
/// composite uniqueness constraint, so the column is never actually `NULL`.
pub const NO_ITEM_SCOPE: &str = "";

pub(crate) fn run_migrations(conn: &Connection) -> Result<(), EngineError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            owner_user_id TEXT NOT NULL,
            cookie_blob TEXT NOT NULL DEFAULT '',
            enabled INTEGER NOT NULL DEFAULT 1,
            auto_confirm_enabled INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS keywords (
            account_id TEXT NOT NULL,
            keyword TEXT NOT NULL,
            reply_template TEXT NOT NULL,
            item_id TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (account_id, keyword, item_id)
        );

        CREATE INDEX IF NOT EXISTS idx_keywords_account
            ON keywords(account_id, length(keyword) DESC);

        CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            owner_user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'text',
            payload TEXT NOT NULL DEFAULT '',
            description TEXT,
            delay_seconds INTEGER NOT NULL DEFAULT 0,
            is_multi_spec INTEGER NOT NULL DEFAULT 0,
            spec_name TEXT,
            spec_value TEXT
        );

        CREATE TABLE IF NOT EXISTS delivery_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_user_id TEXT NOT NULL,
            keyword TEXT NOT NULL,
            card_id TEXT NOT NULL,
            delivery_count_used INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (card_id) REFERENCES cards(id)
        );

        CREATE INDEX IF NOT EXISTS idx_delivery_rules_owner
            ON delivery_rules(owner_user_id, length(keyword) DESC);

        CREATE TABLE IF NOT EXISTS item_info (
            account_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            price TEXT NOT NULL DEFAULT '',
            detail_text TEXT NOT NULL DEFAULT '',
            is_multi_spec INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (account_id, item_id)
        );

        CREATE TABLE IF NOT EXISTS default_replies (
            account_id TEXT PRIMARY KEY,
            reply_text TEXT NOT NULL DEFAULT '',
            enabled INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS ai_settings (
            account_id TEXT PRIMARY KEY,
            enabled INTEGER NOT NULL DEFAULT 0,
            model_name TEXT,
            system_prompt TEXT
        );

        CREATE TABLE IF NOT EXISTS notification_channels (
            id TEXT PRIMARY KEY,
            owner_user_id TEXT NOT NULL,
            channel_type TEXT NOT NULL,
            config_json TEXT NOT NULL DEFAULT '{}',
            enabled INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS notification_bindings (
            owner_user_id TEXT NOT NULL,
            event_kind TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            PRIMARY KEY (owner_user_id, event_kind, channel_id)
        );

        CREATE TABLE IF NOT EXISTS order_status_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            order_id TEXT NOT NULL,
            status_text TEXT NOT NULL,
            observed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_order_status_events_account
            ON order_status_events(account_id, order_id);

        -- Generic per-account key/value settings. No [MODULE] operation in
        -- this crate reads or writes it (see DESIGN.md); schema presence
        -- only, kept for forward compatibility with the persisted-state
        -- layout named in §6.
        CREATE TABLE IF NOT EXISTS user_settings (
            account_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (account_id, key)
        );
        ",
    )
    .map_err(EngineError::from)
}
