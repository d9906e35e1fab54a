// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! xianyu-agent: multi-account automated reply and auto-delivery engine
//! for a second-hand marketplace account's message stream.

pub mod api_client;
pub mod config;
pub mod cooldown;
pub mod crypto;
pub mod demux;
pub mod dispatch;
pub mod error;
pub mod fulfillment;
pub mod item_id;
pub mod notifier;
pub mod order_id;
pub mod registry;
pub mod reply;
pub mod session;
pub mod state;
pub mod store;
pub mod wire;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::crypto::{Crypto, MarketplaceCrypto};
use crate::notifier::{NullNotifier, Notifier};
use crate::registry::AccountRegistry;
use crate::store::Store;

/// Process-wide context threaded through components (§9 "Module-level
/// singletons... Replace with explicit context passing"). Constructed once
/// at startup by [`run`].
pub struct Engine {
    pub config: Arc<EngineConfig>,
    pub store: Arc<Store>,
    pub crypto: Arc<dyn Crypto>,
    pub notifier: Arc<dyn Notifier>,
    pub registry: Arc<AccountRegistry>,
    pub shutdown: CancellationToken,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, error::EngineError> {
        let config = Arc::new(config);
        let store = Arc::new(Store::open(&config.database_path)?);
        let crypto: Arc<dyn Crypto> = Arc::new(MarketplaceCrypto);
        let notifier: Arc<dyn Notifier> = Arc::new(NullNotifier);
        let registry = Arc::new(AccountRegistry::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&crypto),
            Arc::clone(&notifier),
        ));

        Ok(Engine { config, store, crypto, notifier, registry, shutdown: CancellationToken::new() })
    }
}

/// Runs the engine until `shutdown` is cancelled (Ctrl-C from `main`).
pub async fn run(config: EngineConfig) -> anyhow::Result<()> {
    let engine = Engine::new(config)?;

    engine.registry.reload_from_store().await?;
    tracing::info!("xianyu-agent started");

    let shutdown = engine.shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    engine.shutdown.cancelled().await;
    tracing::info!("xianyu-agent shutting down");

    for status in engine.registry.list().await {
        engine.registry.disable(&status.account_id).await;
    }

    Ok(())
}
