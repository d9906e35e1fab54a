// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire frame shapes (§6, §9 "Dynamic dictionary traversal"). The inbound
//! protocol is deeply nested, loosely-typed JSON with short integer string
//! keys. Rather than one big `#[serde(untagged)]` enum over the whole frame,
//! decode cheaply into [`FrameHeaders`] + a raw `serde_json::Value` body
//! first, then probe that body structurally — the discriminating fields are
//! several levels deep and their *presence*, not a single tag, decides the
//! classification (§4.5).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Headers present on every inbound/outbound frame.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FrameHeaders {
    pub mid: Option<String>,
    pub sid: Option<String>,
    #[serde(rename = "app-key")]
    pub app_key: Option<String>,
    pub ua: Option<String>,
    pub dt: Option<String>,
}

/// A raw inbound frame: headers plus an opaque body, decoded eagerly because
/// the ack only needs the headers.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    pub headers: FrameHeaders,
    #[serde(default)]
    pub body: Option<Value>,
}

impl RawFrame {
    /// `true` when `body.syncPushPackage` is present.
    pub fn is_sync_push_package(&self) -> bool {
        self.body
            .as_ref()
            .and_then(|b| b.get("syncPushPackage"))
            .is_some()
    }

    /// The base64 blob at `body.syncPushPackage.data[0].data`, if present.
    pub fn sync_push_data(&self) -> Option<&str> {
        self.body
            .as_ref()?
            .get("syncPushPackage")?
            .get("data")?
            .get(0)?
            .get("data")?
            .as_str()
    }
}

/// An ack frame mirroring the inbound headers with `code=200` (§4.5 step 1).
#[derive(Debug, Clone, Serialize)]
pub struct AckFrame {
    pub headers: FrameHeaders,
    pub code: u32,
}

impl AckFrame {
    pub fn for_headers(headers: &FrameHeaders) -> Self {
        AckFrame { headers: headers.clone(), code: 200 }
    }
}

/// Classification result for a decoded `syncPushPackage` body (§4.5 step 4).
#[derive(Debug, Clone)]
pub enum Classified {
    HeartbeatAck,
    SystemPrompt,
    OrderStatus { status_text: String },
    SelfSent,
    /// A self-generated placeholder that must be silently ignored (§5 `[FULL]`
    /// sentinels: `[我已拍下，待付款]`, `[你关闭了订单，钱款已原路退返]`, `*发来一条消息`).
    IgnoredSentinel,
    Chat(ChatFrame),
    CardChat(ChatFrame),
    AutoDeliveryTrigger(ChatFrame),
    Unclassified(Value),
}

/// Extracted fields for a chat-shaped message (§4.5, `message["1"]["10"]`).
#[derive(Debug, Clone)]
pub struct ChatFrame {
    pub sender_id: String,
    pub sender_name: String,
    pub chat_id: String,
    pub item_id: String,
    pub text: String,
    pub create_time_ms: i64,
    /// The raw `message["1"]["10"]` node, kept for C7's order-id extraction
    /// (§3) — its card/button shape varies by trigger type and is not worth
    /// a typed field here.
    pub raw: Value,
}

/// Outbound wire messages (§6). Payloads are constructed directly rather than
/// through typed structs further down the stack since each path name carries
/// its own ad hoc body shape.
pub mod outbound {
    pub const REGISTER: &str = "/reg";
    pub const ACK_DIFF: &str = "/r/SyncStatus/ackDiff";
    pub const HEARTBEAT: &str = "/!";
    pub const CREATE_CHAT: &str = "/r/SingleChatConversation/create";
    pub const SEND_MESSAGE: &str = "/r/MessageSend/sendByReceiverScope";
}
