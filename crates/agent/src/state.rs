// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory Session state (§3): the per-account handle shared between the
//! connection loop, the outbound queue, and callers that need to observe or
//! tear down a running session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api_client::{ApiClient, TokenState};
use crate::cooldown::CooldownLedger;
use crate::crypto::Crypto;
use crate::fulfillment::ApiCardTransport;
use crate::notifier::Notifier;
use crate::reply::ExternalReplyApi;
use crate::store::Store;

/// Session lifecycle state (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Registering,
    Active,
    Refreshing,
    Reconnecting,
    Stopped,
}

/// An outbound frame queued for the writer task. Outbound writes from C6/C7
/// are never given direct socket access — they funnel through this queue
/// (§9 "do not expose the socket directly to C6/C7").
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub path: &'static str,
    pub body: serde_json::Value,
}

/// A registered account's live Session (§3). Created on enable, destroyed on
/// disable or permanent failure.
pub struct Session {
    pub account_id: String,
    pub owner_user_id: String,
    pub self_id: String,
    pub device_id: String,
    pub state: RwLock<SessionState>,
    pub tokens: Arc<TokenState>,
    pub last_heartbeat_sent_at: AtomicU64,
    pub last_heartbeat_ack_at: AtomicU64,
    pub restart_flag: AtomicBool,
    pub cooldowns: CooldownLedger,
    pub cancel: CancellationToken,
    pub outbound_tx: mpsc::Sender<OutboundFrame>,
    pub crypto: Arc<dyn Crypto>,
    pub api_client: Arc<ApiClient>,
    pub store: Arc<Store>,
    pub notifier: Arc<dyn Notifier>,
    /// External reply API collaborator (§4.6 step 1), `None` when
    /// `auto_fetch_enabled` is off or no URL is configured.
    pub external_reply_api: Option<Arc<dyn ExternalReplyApi>>,
    pub api_card_transport: Arc<dyn ApiCardTransport>,
}

impl Session {
    pub async fn set_state(&self, next: SessionState) {
        *self.state.write().await = next;
    }

    pub async fn current_state(&self) -> SessionState {
        *self.state.read().await
    }

    pub fn note_heartbeat_sent(&self, now_ms: u64) {
        self.last_heartbeat_sent_at.store(now_ms, Ordering::SeqCst);
    }

    pub fn note_heartbeat_ack(&self, now_ms: u64) {
        self.last_heartbeat_ack_at.store(now_ms, Ordering::SeqCst);
    }

    /// `true` if the account's terminal/disable flag has been set (§4.4
    /// cancellation — checked by all three subtasks each iteration).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
