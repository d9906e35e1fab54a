// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound demultiplexer (C5). Ack first, decode, classify — never
//! disconnects on a malformed frame (§7 "Decode/decrypt... drop the frame").

use base64::Engine;
use serde_json::Value;

use crate::crypto::Crypto;
use crate::error::EngineError;
use crate::item_id;
use crate::wire::{AckFrame, ChatFrame, Classified, RawFrame};

/// Known Chinese order-status strings logged by §4.5 step 4 / §3 `[FULL]`.
const ORDER_STATUS_STRINGS: &[&str] = &["等待买家付款", "交易关闭", "等待卖家发货"];

/// Self-generated sentinel messages silently ignored, never routed to C6/C7
/// (SPEC_FULL §4.5 `[FULL]`).
const IGNORED_SENTINEL_PREFIXES: &[&str] = &["[我已拍下，待付款]", "[你关闭了订单，钱款已原路退返]"];
const IGNORED_SENTINEL_SUFFIX: &str = "发来一条消息";

const CARD_CHAT_MARKER: &str = "[卡片消息]";
const BARGAIN_CARD_TITLE: &str = "我已小刀，待刀成";

pub const AUTO_DELIVERY_TRIGGERS: &[&str] =
    &["[我已付款，等待你发货]", "[已付款，待发货]", "我已付款，等待你发货", "[记得及时发货]"];

/// Builds the ack frame for an inbound frame. Ack is best-effort; callers
/// ignore send failures (§4.5 step 1).
pub fn build_ack(frame: &RawFrame) -> AckFrame {
    AckFrame::for_headers(&frame.headers)
}

/// Decodes and classifies the `syncPushPackage` body of `frame`. Returns
/// `Ok(None)` for frames that are not a `syncPushPackage` (§4.5 step 2) —
/// these are not an error, just nothing further to do.
pub fn classify(
    frame: &RawFrame,
    crypto: &dyn Crypto,
    self_id: &str,
    user_id: &str,
    now_secs: i64,
) -> Result<Option<Classified>, EngineError> {
    if !frame.is_sync_push_package() {
        return Ok(None);
    }

    let Some(encoded) = frame.sync_push_data() else {
        return Ok(None);
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| EngineError::Decode(e.to_string()))?;

    let body: Value = if let Ok(value) = serde_json::from_slice::<Value>(&decoded) {
        if is_system_prompt(&value) {
            return Ok(Some(Classified::SystemPrompt));
        }
        value
    } else {
        let plaintext = crypto.decrypt(&decoded)?;
        serde_json::from_slice(&plaintext)?
    };

    Ok(Some(classify_body(body, self_id, user_id, now_secs)))
}

fn is_system_prompt(value: &Value) -> bool {
    value.get("chatType").is_some()
        && value
            .get("operation")
            .and_then(|o| o.get("content"))
            .and_then(|c| c.get("sessionArouse"))
            .is_some()
}

fn classify_body(body: Value, self_id: &str, user_id: &str, now_secs: i64) -> Classified {
    if let Some(code) = body.get("code").and_then(Value::as_i64) {
        if code == 200 && body.get("body").is_none() {
            return Classified::HeartbeatAck;
        }
    }

    if let Some(status) = body
        .get("message")
        .and_then(|m| m.get("3"))
        .and_then(|m3| m3.get("redReminder"))
        .and_then(Value::as_str)
    {
        if ORDER_STATUS_STRINGS.contains(&status) {
            return Classified::OrderStatus { status_text: status.to_owned() };
        }
    }

    let Some(m10) = body.get("message").and_then(|m| m.get("1")).and_then(|m1| m1.get("10")) else {
        return Classified::Unclassified(body);
    };
    let Some(text) = m10.get("reminderContent").and_then(Value::as_str) else {
        return Classified::Unclassified(body);
    };

    let sender_id =
        m10.get("senderUserId").and_then(Value::as_str).unwrap_or_default().to_owned();
    let sender_name = m10
        .get("senderNick")
        .or_else(|| m10.get("reminderTitle"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let reminder_url = m10.get("reminderUrl").and_then(Value::as_str);
    let item_id = item_id::extract_item_id(reminder_url, &body, user_id, now_secs);

    let chat_id = body
        .get("message")
        .and_then(|m| m.get("1"))
        .and_then(|m1| m1.get("2"))
        .and_then(Value::as_str)
        .map(|raw| raw.split('@').next().unwrap_or(raw).to_owned())
        .unwrap_or_default();
    let create_time_ms = body
        .get("message")
        .and_then(|m| m.get("1"))
        .and_then(|m1| m1.get("5"))
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let chat = ChatFrame {
        sender_id: sender_id.clone(),
        sender_name,
        chat_id,
        item_id,
        text: text.to_owned(),
        create_time_ms,
        raw: m10.clone(),
    };

    if sender_id == self_id {
        return Classified::SelfSent;
    }

    if IGNORED_SENTINEL_PREFIXES.iter().any(|s| chat.text == *s) || chat.text.ends_with(IGNORED_SENTINEL_SUFFIX) {
        return Classified::IgnoredSentinel;
    }

    if chat.text == CARD_CHAT_MARKER {
        return Classified::CardChat(chat);
    }

    if AUTO_DELIVERY_TRIGGERS.contains(&chat.text.as_str()) {
        return Classified::AutoDeliveryTrigger(chat);
    }

    Classified::Chat(chat)
}

/// `true` when a card-chat's embedded title is the "bargain claimed" sentinel
/// (§4.5 card-chat branch).
pub fn is_bargain_claimed(card_title: &str) -> bool {
    card_title == BARGAIN_CARD_TITLE
}
