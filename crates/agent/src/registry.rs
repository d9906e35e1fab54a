// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account registry (C8) — tracks which accounts are enabled and owns their
//! running `Session` handles: an `RwLock<HashMap<..>>` keyed by account id,
//! with enable/disable/remove/reload/list/get over the set of live sessions.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api_client::{ApiClient, TokenState};
use crate::config::EngineConfig;
use crate::crypto::Crypto;
use crate::fulfillment::{ApiCardTransport, HttpApiCardTransport};
use crate::notifier::Notifier;
use crate::reply::HttpExternalReplyApi;
use crate::session;
use crate::state::{OutboundFrame, Session, SessionState};
use crate::store::Store;

/// A running account entry: the live `Session` plus the task handle for its
/// engine loop, so `disable`/`remove` can cancel and join it.
struct Entry {
    session: Arc<Session>,
    task: tokio::task::JoinHandle<()>,
}

/// Serializable snapshot for status reporting (§4.8 "admin API" analog).
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatus {
    pub account_id: String,
    pub state: String,
}

/// Tracks all enabled accounts' live sessions.
pub struct AccountRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    config: Arc<EngineConfig>,
    store: Arc<Store>,
    crypto: Arc<dyn Crypto>,
    notifier: Arc<dyn Notifier>,
    api_card_transport: Arc<dyn ApiCardTransport>,
}

impl AccountRegistry {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<Store>,
        crypto: Arc<dyn Crypto>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        AccountRegistry {
            entries: RwLock::new(HashMap::new()),
            config,
            store,
            crypto,
            notifier,
            api_card_transport: Arc::new(HttpApiCardTransport::new()),
        }
    }

    /// Starts a session for `account_id` if not already running (§4.8
    /// "enable"). Returns `false` if the account was already enabled.
    pub async fn enable(&self, account_id: &str) -> Result<bool, crate::error::EngineError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(account_id) {
            return Ok(false);
        }

        let account = self
            .store
            .get_account(account_id)?
            .ok_or_else(|| crate::error::EngineError::Internal(format!("unknown account {account_id}")))?;

        let tokens = Arc::new(TokenState::new());
        let api_client = Arc::new(ApiClient::new(
            self.config.api_base_url.clone(),
            account_id.to_owned(),
            crate::crypto::device_id(&account.owner_user_id),
            Arc::clone(&self.crypto),
            Arc::clone(&tokens),
            Arc::clone(&self.store),
            self.config.token_refresh_interval(),
        ));

        let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundFrame>(256);

        let external_reply_api = match (self.config.auto_fetch_enabled, &self.config.auto_fetch_api_url) {
            (true, Some(url)) => {
                Some(Arc::new(HttpExternalReplyApi::new(url.clone())) as Arc<dyn crate::reply::ExternalReplyApi>)
            }
            _ => None,
        };

        let session = Arc::new(Session {
            account_id: account_id.to_owned(),
            owner_user_id: account.owner_user_id.clone(),
            self_id: account.owner_user_id.clone(),
            device_id: crate::crypto::device_id(&account.owner_user_id),
            state: tokio::sync::RwLock::new(SessionState::Idle),
            tokens,
            last_heartbeat_sent_at: Default::default(),
            last_heartbeat_ack_at: Default::default(),
            restart_flag: Default::default(),
            cooldowns: crate::cooldown::CooldownLedger::new(),
            cancel: CancellationToken::new(),
            outbound_tx,
            crypto: Arc::clone(&self.crypto),
            api_client,
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            external_reply_api,
            api_card_transport: Arc::clone(&self.api_card_transport),
        });

        let task_session = Arc::clone(&session);
        let task_config = Arc::clone(&self.config);
        let task = tokio::spawn(async move { session::run(task_session, task_config, outbound_rx).await });

        entries.insert(account_id.to_owned(), Entry { session, task });
        tracing::info!(account_id, "account enabled");
        Ok(true)
    }

    /// Cancels and removes a running session (§4.8 "disable"). Returns
    /// `false` if the account was not running.
    pub async fn disable(&self, account_id: &str) -> bool {
        let entry = self.entries.write().await.remove(account_id);
        match entry {
            Some(entry) => {
                entry.session.cancel.cancel();
                let _ = entry.task.await;
                tracing::info!(account_id, "account disabled");
                true
            }
            None => false,
        }
    }

    /// Removes the account's row from the store after disabling it, if
    /// running (§4.8 "remove").
    pub async fn remove(&self, account_id: &str) -> Result<(), crate::error::EngineError> {
        self.disable(account_id).await;
        self.store.remove_account(account_id)
    }

    /// Enables every account currently marked enabled in the store (§4.8
    /// "reload", used at startup).
    pub async fn reload_from_store(&self) -> Result<(), crate::error::EngineError> {
        for account in self.store.list_enabled_accounts()? {
            if let Err(err) = self.enable(&account.id).await {
                tracing::warn!(account_id = %account.id, error = %err, "failed to enable account on reload");
            }
        }
        Ok(())
    }

    /// Lists all currently running accounts and their lifecycle state.
    pub async fn list(&self) -> Vec<AccountStatus> {
        let entries = self.entries.read().await;
        let mut statuses = Vec::with_capacity(entries.len());
        for (account_id, entry) in entries.iter() {
            let state = entry.session.current_state().await;
            statuses.push(AccountStatus { account_id: account_id.clone(), state: format!("{state:?}") });
        }
        statuses
    }

    /// Returns the live `Session` handle for a running account, if any.
    pub async fn get(&self, account_id: &str) -> Option<Arc<Session>> {
        self.entries.read().await.get(account_id).map(|e| Arc::clone(&e.session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::FakeCrypto;

    /// A short connect timeout and backoff so `disable()`'s join doesn't
    /// stall the test suite while the session's own connect loop (which has
    /// no real socket to reach in this environment) unwinds.
    fn config() -> Arc<EngineConfig> {
        let mut config = EngineConfig::test_default();
        config.ws_connect_timeout_secs = 1;
        config.reconnect_backoff_initial_ms = 10;
        Arc::new(config)
    }

    #[tokio::test]
    async fn enable_is_idempotent_and_list_reports_state() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.save_cookie("acc1", "cookie", Some("user1")).unwrap();

        let registry = AccountRegistry::new(config(), store, Arc::new(FakeCrypto), Arc::new(crate::notifier::NullNotifier));
        assert!(registry.enable("acc1").await.unwrap());
        assert!(!registry.enable("acc1").await.unwrap());

        let statuses = registry.list().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].account_id, "acc1");

        assert!(registry.disable("acc1").await);
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn enable_unknown_account_fails() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = AccountRegistry::new(config(), store, Arc::new(FakeCrypto), Arc::new(crate::notifier::NullNotifier));
        assert!(registry.enable("ghost").await.is_err());
    }
}
