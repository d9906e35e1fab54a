// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifier fan-out (C9). Contract only — channel transports (QQ, email,
//! DingTalk, webhook, telegram) are out of scope (§1); this crate ships a
//! `NullNotifier` for production and a `RecordingNotifier` test double.
//! Per-category cooldown gating is the core's responsibility (the
//! `CooldownLedger`, §3), not the `Notifier` implementation's.

use serde_json::Value;

use crate::cooldown::CooldownLedger;
use crate::error::EngineError;
use crate::store::Store;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel_type: &str, channel_config: &Value, message: &str) -> anyhow::Result<bool>;
}

/// Production default: logs and acknowledges. Real channel transports plug
/// in behind the same trait without touching the core.
pub struct NullNotifier;

#[async_trait::async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, channel_type: &str, _channel_config: &Value, message: &str) -> anyhow::Result<bool> {
        tracing::info!(channel_type, message, "notification dispatched (no transport configured)");
        Ok(true)
    }
}

#[cfg(test)]
pub struct RecordingNotifier {
    pub sent: parking_lot::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier { sent: parking_lot::Mutex::new(Vec::new()) }
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, channel_type: &str, _channel_config: &Value, message: &str) -> anyhow::Result<bool> {
        self.sent.lock().push((channel_type.to_owned(), message.to_owned()));
        Ok(true)
    }
}

/// Event categories gated by the cooldown ledger (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    InboundMessage,
    DeliveryOutcome,
    TokenHealth,
}

impl NotificationKind {
    pub fn cooldown_key(&self) -> &'static str {
        match self {
            NotificationKind::InboundMessage => "inbound_message",
            NotificationKind::DeliveryOutcome => "delivery_outcome",
            NotificationKind::TokenHealth => "token_health",
        }
    }
}

/// Fans a notification out to every channel bound to `kind` for
/// `owner_user_id` (§4.9). `InboundMessage`/`DeliveryOutcome` fire on every
/// call ("per call" in §1); `TokenHealth` is gated by the ledger's 5-minute
/// window so a flapping connection doesn't page anyone repeatedly.
pub async fn dispatch(
    notifier: &dyn Notifier,
    ledger: &CooldownLedger,
    store: &Store,
    owner_user_id: &str,
    kind: NotificationKind,
    message: &str,
) -> Result<(), EngineError> {
    if kind == NotificationKind::TokenHealth && ledger.notification_on_cooldown(kind.cooldown_key()) {
        return Ok(());
    }

    let channels = store.channels_for_event(owner_user_id, kind.cooldown_key())?;
    for channel in channels {
        let config: Value = serde_json::from_str(&channel.config_json).unwrap_or(Value::Null);
        if let Err(err) = notifier.send(&channel.channel_type, &config, message).await {
            tracing::debug!(channel_id = %channel.id, error = %err, "notifier channel send failed");
        }
    }

    if kind == NotificationKind::TokenHealth {
        ledger.mark_notified(kind.cooldown_key());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::store::{NotificationChannel, Store};

    #[tokio::test]
    async fn recording_notifier_captures_calls() {
        let notifier = RecordingNotifier::new();
        notifier.send("webhook", &json!({}), "hello").await.unwrap();
        assert_eq!(notifier.sent.lock().len(), 1);
    }

    fn bind_webhook(store: &Store, owner_user_id: &str, event_kind: &str) {
        store
            .save_notification_channel(&NotificationChannel {
                id: "chan1".into(),
                owner_user_id: owner_user_id.into(),
                channel_type: "webhook".into(),
                config_json: "{}".into(),
                enabled: true,
            })
            .unwrap();
        store.bind_notification_channel(owner_user_id, event_kind, "chan1").unwrap();
    }

    #[tokio::test]
    async fn inbound_message_is_not_cooldown_gated() {
        let store = Store::open_in_memory().unwrap();
        bind_webhook(&store, "owner1", "inbound_message");
        let ledger = CooldownLedger::new();
        let notifier = RecordingNotifier::new();

        dispatch(&notifier, &ledger, &store, "owner1", NotificationKind::InboundMessage, "hi").await.unwrap();
        dispatch(&notifier, &ledger, &store, "owner1", NotificationKind::InboundMessage, "hi again").await.unwrap();

        assert_eq!(notifier.sent.lock().len(), 2);
    }

    #[tokio::test]
    async fn token_health_is_cooldown_gated() {
        let store = Store::open_in_memory().unwrap();
        bind_webhook(&store, "owner1", "token_health");
        let ledger = CooldownLedger::new();
        let notifier = RecordingNotifier::new();

        dispatch(&notifier, &ledger, &store, "owner1", NotificationKind::TokenHealth, "down").await.unwrap();
        dispatch(&notifier, &ledger, &store, "owner1", NotificationKind::TokenHealth, "down again").await.unwrap();

        assert_eq!(notifier.sent.lock().len(), 1);
    }
}
