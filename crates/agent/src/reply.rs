// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reply selector (C6). Precedence, first non-`nil` wins: external reply API
//! → keyword (product-scoped, then global) → AI → default (§4.6).

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::store::Store;

/// Context for a single inbound chat, passed down the precedence chain.
pub struct ReplyContext<'a> {
    pub account_id: &'a str,
    pub owner_user_id: &'a str,
    pub sender_id: &'a str,
    pub sender_name: &'a str,
    pub text: &'a str,
    pub chat_id: &'a str,
    pub item_id: &'a str,
}

/// External reply API and AI collaborators, kept as traits so callers can
/// supply fakes in tests (§1 "out of scope... interface only" for AI).
#[async_trait::async_trait]
pub trait ExternalReplyApi: Send + Sync {
    async fn reply(&self, ctx: &ReplyContext<'_>) -> Option<String>;
}

#[async_trait::async_trait]
pub trait AiEngine: Send + Sync {
    async fn generate(&self, ctx: &ReplyContext<'_>, item_info: Option<&str>) -> Option<String>;
}

#[derive(Deserialize)]
struct ExternalReplyResponse {
    code: i64,
    data: Option<ExternalReplyData>,
}

#[derive(Deserialize)]
struct ExternalReplyData {
    send_msg: Option<String>,
}

/// Production `ExternalReplyApi`: POSTs context to a configured URL, accepts
/// a reply only when `code == 200` and `data.send_msg` is present, within a
/// 10s timeout. Any failure falls through silently (§4.6 step 1).
pub struct HttpExternalReplyApi {
    client: reqwest::Client,
    url: String,
}

impl HttpExternalReplyApi {
    pub fn new(url: String) -> Self {
        Self { client: reqwest::Client::new(), url }
    }
}

#[async_trait::async_trait]
impl ExternalReplyApi for HttpExternalReplyApi {
    async fn reply(&self, ctx: &ReplyContext<'_>) -> Option<String> {
        let body = json!({
            "text": ctx.text,
            "chat_id": ctx.chat_id,
            "account_id": ctx.account_id,
            "sender_id": ctx.sender_id,
            "item_id": ctx.item_id,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .ok()?;
        let parsed: ExternalReplyResponse = response.json().await.ok()?;
        if parsed.code != 200 {
            return None;
        }
        parsed.data?.send_msg
    }
}

/// Selects a reply for an inbound chat, or `None` if no tier produces one.
pub async fn select_reply(
    store: &Store,
    ctx: &ReplyContext<'_>,
    external_api: Option<&dyn ExternalReplyApi>,
    ai: Option<&dyn AiEngine>,
    ai_enabled: bool,
    item_info_text: Option<&str>,
) -> Option<String> {
    if let Some(api) = external_api {
        if let Some(reply) = api.reply(ctx).await {
            return Some(interpolate(&reply, ctx));
        }
    }

    let keywords = store.get_keywords_with_item(ctx.account_id).ok()?;
    let lowered_text = ctx.text.to_lowercase();

    let product_scoped = keywords
        .iter()
        .filter(|k| k.item_id.as_deref() == Some(ctx.item_id))
        .find(|k| lowered_text.contains(&k.keyword.to_lowercase()));
    if let Some(rule) = product_scoped {
        return Some(interpolate(&rule.reply_template, ctx));
    }

    let global = keywords
        .iter()
        .filter(|k| k.item_id.is_none())
        .find(|k| lowered_text.contains(&k.keyword.to_lowercase()));
    if let Some(rule) = global {
        return Some(interpolate(&rule.reply_template, ctx));
    }

    if ai_enabled {
        if let Some(engine) = ai {
            if let Some(reply) = engine.generate(ctx, item_info_text).await {
                if !reply.is_empty() {
                    return Some(interpolate(&reply, ctx));
                }
            }
        }
    }

    None
}

/// Default-reply fallback (§4.6 step 5), kept separate since it needs no
/// keyword-match input.
pub fn default_reply(default_text: Option<&str>, enabled: bool, ctx: &ReplyContext<'_>) -> Option<String> {
    if !enabled {
        return None;
    }
    default_text.map(|text| interpolate(text, ctx))
}

/// Substitutes `{send_user_id}`, `{send_user_name}`, `{send_message}`. A
/// template with none of these placeholders degrades to itself unchanged —
/// there is no failure mode to "degrade" from since `str::replace` is total.
fn interpolate(template: &str, ctx: &ReplyContext<'_>) -> String {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("{send_user_id}", ctx.sender_id),
        ("{send_user_name}", ctx.sender_name),
        ("{send_message}", ctx.text),
    ]);
    let mut out = template.to_owned();
    for (placeholder, value) in vars {
        out = out.replace(placeholder, value);
    }
    out
}
