// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live-traffic dispatch (§4.5 step 4): routes a classified frame from C5 to
//! the reply selector (C6), delivery pipeline (C7), and notifier (C9), and
//! sends outbound chat frames for whatever C6/C7 produce.

use std::time::Duration;

use base64::Engine;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::demux;
use crate::fulfillment::{self, DeliveryFailure};
use crate::notifier::{self, NotificationKind};
use crate::order_id;
use crate::reply::{self, ReplyContext};
use crate::state::{OutboundFrame, Session};
use crate::wire::{outbound, ChatFrame, Classified};

/// Handles one classified frame. `HeartbeatAck` is handled by the caller
/// before this is reached (it needs the raw recv timestamp); everything else
/// lands here.
pub async fn handle(session: &Session, classified: Classified) {
    match classified {
        Classified::HeartbeatAck
        | Classified::SystemPrompt
        | Classified::SelfSent
        | Classified::IgnoredSentinel
        | Classified::Unclassified(_) => {}

        Classified::OrderStatus { status_text } => {
            if let Err(err) = session.store.log_order_status_event(&session.account_id, "", &status_text) {
                tracing::warn!(account_id = %session.account_id, error = %err, "failed to log order status event");
            }
        }

        Classified::Chat(chat) => handle_chat(session, chat).await,

        Classified::CardChat(chat) => {
            if demux::is_bargain_claimed(&chat.sender_name) {
                run_delivery(session, &chat, Some(chat.sender_id.clone())).await;
            }
        }

        Classified::AutoDeliveryTrigger(chat) => {
            run_delivery(session, &chat, None).await;
        }
    }
}

async fn handle_chat(session: &Session, chat: ChatFrame) {
    let ctx = ReplyContext {
        account_id: &session.account_id,
        owner_user_id: &session.owner_user_id,
        sender_id: &chat.sender_id,
        sender_name: &chat.sender_name,
        text: &chat.text,
        chat_id: &chat.chat_id,
        item_id: &chat.item_id,
    };

    let ai_settings = session.store.get_ai_settings(&session.account_id).ok().flatten();
    let ai_enabled = ai_settings.as_ref().is_some_and(|s| s.enabled);
    let item_info_text = session
        .store
        .get_item_info(&session.account_id, &chat.item_id)
        .ok()
        .flatten()
        .map(|info| format!("{} {}", info.title, info.detail_text));

    let mut reply = reply::select_reply(
        &session.store,
        &ctx,
        session.external_reply_api.as_deref(),
        None, // AI engine: out of scope (§1), never configured
        ai_enabled,
        item_info_text.as_deref(),
    )
    .await;

    if reply.is_none() {
        if let Ok(Some(default)) = session.store.get_default_reply(&session.account_id) {
            reply = reply::default_reply(Some(&default.reply_text), default.enabled, &ctx);
        }
    }

    if let Some(reply_text) = &reply {
        send_chat_message(&session.outbound_tx, &chat.chat_id, &chat.sender_id, &chat.item_id, reply_text).await;
    }

    notify(session, NotificationKind::InboundMessage, &format!("{}: {}", chat.sender_name, chat.text)).await;
}

async fn run_delivery(session: &Session, chat: &ChatFrame, bargain_buyer_id: Option<String>) {
    if let Some(buyer_id) = &bargain_buyer_id {
        if let Some(order_id) = order_id::extract_order_id(&chat.raw) {
            sleep(Duration::from_secs(2)).await;
            if let Err(err) =
                fulfillment::Freeshipping::freeshipping(session.api_client.as_ref(), &order_id, &chat.item_id, buyer_id)
                    .await
            {
                tracing::warn!(account_id = %session.account_id, error = %err, "freeshipping call failed");
            }
        }
    }

    let auto_confirm_enabled = session
        .store
        .get_account(&session.account_id)
        .ok()
        .flatten()
        .is_some_and(|account| account.auto_confirm_enabled);

    let outbound_tx = session.outbound_tx.clone();
    let chat_id = chat.chat_id.clone();
    let sender_id = chat.sender_id.clone();
    let item_id = chat.item_id.clone();

    let result = fulfillment::run_delivery(
        &session.store,
        &session.cooldowns,
        &session.account_id,
        &session.owner_user_id,
        &chat.item_id,
        &chat.raw,
        auto_confirm_enabled,
        Some(session.api_client.as_ref() as &dyn fulfillment::ProductDetailApi),
        None, // multi-spec order detail: sealed headless-browser collaborator (§9)
        session.api_client.as_ref(),
        Some(session.api_card_transport.as_ref()),
        move |message| Box::pin(send_chat_message_result(outbound_tx, chat_id, sender_id, item_id, message)),
    )
    .await;

    match result {
        Ok(outcome) => {
            let summary =
                format!("delivery sent for order {}", outcome.order_id.as_deref().unwrap_or("unknown"));
            notify(session, NotificationKind::DeliveryOutcome, &summary).await;
        }
        Err(DeliveryFailure::NoMatchingRule) => {
            notify(session, NotificationKind::DeliveryOutcome, "delivery failed: no matching rule").await;
        }
        Err(DeliveryFailure::NoOrderId) | Err(DeliveryFailure::OnCooldown) => {}
    }
}

async fn notify(session: &Session, kind: NotificationKind, message: &str) {
    if let Err(err) = notifier::dispatch(
        session.notifier.as_ref(),
        &session.cooldowns,
        &session.store,
        &session.owner_user_id,
        kind,
        message,
    )
    .await
    {
        tracing::debug!(account_id = %session.account_id, error = %err, "notification dispatch failed");
    }
}

async fn send_chat_message(
    outbound_tx: &mpsc::Sender<OutboundFrame>,
    chat_id: &str,
    receiver_id: &str,
    item_id: &str,
    text: &str,
) {
    let create_body = json!({ "toUserId": receiver_id, "itemId": item_id, "mid": crate::crypto::mid() });
    let _ = outbound_tx.send(OutboundFrame { path: outbound::CREATE_CHAT, body: create_body }).await;

    let content = base64::engine::general_purpose::STANDARD
        .encode(serde_json::to_vec(&json!({ "contentType": 1, "text": { "text": text } })).unwrap_or_default());
    let send_body = json!({
        "chatId": chat_id,
        "receiverId": receiver_id,
        "content": { "custom": { "data": content } },
        "mid": crate::crypto::mid(),
    });
    let _ = outbound_tx.send(OutboundFrame { path: outbound::SEND_MESSAGE, body: send_body }).await;
}

/// `run_delivery`'s `send` callback needs an `anyhow::Result`; the outbound
/// queue is best-effort elsewhere, but here a closed channel should count as
/// delivery failure so the cooldown isn't marked for a message nobody got.
async fn send_chat_message_result(
    outbound_tx: mpsc::Sender<OutboundFrame>,
    chat_id: String,
    receiver_id: String,
    item_id: String,
    text: String,
) -> anyhow::Result<()> {
    let create_body = json!({ "toUserId": receiver_id, "itemId": item_id, "mid": crate::crypto::mid() });
    outbound_tx
        .send(OutboundFrame { path: outbound::CREATE_CHAT, body: create_body })
        .await
        .map_err(|_| anyhow::anyhow!("outbound queue closed"))?;

    let content = base64::engine::general_purpose::STANDARD
        .encode(serde_json::to_vec(&json!({ "contentType": 1, "text": { "text": text } })).unwrap_or_default());
    let send_body = json!({
        "chatId": chat_id,
        "receiverId": receiver_id,
        "content": { "custom": { "data": content } },
        "mid": crate::crypto::mid(),
    });
    outbound_tx
        .send(OutboundFrame { path: outbound::SEND_MESSAGE, body: send_body })
        .await
        .map_err(|_| anyhow::anyhow!("outbound queue closed"))
}
