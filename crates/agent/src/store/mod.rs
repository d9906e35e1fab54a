// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent store (C2).
//!
//! Module layout:
//!   accounts      — cookie/account CRUD, owner-preserving refresh
//!   keywords      — keyword rule CRUD + lookup ordered by length
//!   cards         — card CRUD, atomic data-card consumption
//!   delivery      — delivery rule CRUD + spec-aware lookup
//!   item_info     — product info upsert
//!   notify_config — notification channels + event bindings (opaque to C2)
//!   order_status  — append-only order-status event log
//!   settings      — per-account default-reply and AI-settings rows

mod accounts;
mod cards;
mod delivery;
mod item_info;
mod keywords;
mod notify_config;
mod order_status;
mod schema;
mod settings;

pub use accounts::Account;
pub use cards::{Card, CardKind};
pub use delivery::DeliveryRule;
pub use item_info::ItemInfo;
pub use keywords::KeywordRule;
pub use notify_config::NotificationChannel;
pub use schema::NO_ITEM_SCOPE;
pub use settings::{AiSettings, DefaultReply};

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::EngineError;

/// Thread-safe SQLite-backed store. A single connection behind one mutex
/// serializes every call, reads included (stronger than the spec's
/// "serialized by account ID" — see SPEC_FULL §5 note). WAL is still worth
/// enabling for crash-safety and so a concurrent external reader (e.g. a
/// `sqlite3` CLI inspection) doesn't block on the writer.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, EngineError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;").ok();
        schema::run_migrations(&conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }
}
