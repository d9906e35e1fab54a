// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery pipeline (C7). Trigger detection happens upstream in C5; this
//! module runs steps 1-11 of §4.7 once a trigger has been classified.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;

use crate::cooldown::CooldownLedger;
use crate::order_id::extract_order_id;
use crate::store::{Card, CardKind, Store};

/// Sealed collaborators for the marketplace's obfuscated client modules
/// (§9 "Encrypted client modules... treat these as sealed interfaces").
#[async_trait::async_trait]
pub trait OrderDetail: Send + Sync {
    /// Fetches `(spec_name, spec_value)` for a multi-spec order, if obtainable.
    async fn fetch(&self, order_id: &str) -> Option<(String, String)>;
}

#[async_trait::async_trait]
pub trait ShipConfirm: Send + Sync {
    async fn confirm_ship(&self, order_id: &str) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait Freeshipping: Send + Sync {
    async fn freeshipping(&self, order_id: &str, item_id: &str, buyer_id: &str) -> anyhow::Result<()>;
}

/// Fetches live product detail; on failure the caller falls back to C2.
#[async_trait::async_trait]
pub trait ProductDetailApi: Send + Sync {
    async fn detail(&self, item_id: &str) -> Option<(String, String)>;
}

/// Produces content for `type=api` cards by calling the card's configured
/// endpoint, with retry on 5xx/408 (§4.7 step 8).
#[async_trait::async_trait]
pub trait ApiCardTransport: Send + Sync {
    async fn fetch(&self, card: &Card) -> Result<Value, ApiCardError>;
}

#[derive(Debug)]
pub enum ApiCardError {
    Retryable,
    Fatal,
}

#[derive(Deserialize)]
struct ApiCardConfig {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
}

/// Production `ApiCardTransport`: the card's `payload` column holds a JSON
/// config of its own endpoint (`{url, method, headers, body}`), distinct
/// from the marketplace's signed API — no signing applies here.
pub struct HttpApiCardTransport {
    client: reqwest::Client,
}

impl HttpApiCardTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpApiCardTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ApiCardTransport for HttpApiCardTransport {
    async fn fetch(&self, card: &Card) -> Result<Value, ApiCardError> {
        let config: ApiCardConfig = serde_json::from_str(&card.payload).map_err(|_| ApiCardError::Fatal)?;
        let method = config.method.as_deref().unwrap_or("GET").to_ascii_uppercase();

        let mut request =
            if method == "POST" { self.client.post(&config.url) } else { self.client.get(&config.url) };
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &config.body {
            request = request.json(body);
        }

        let response = request.timeout(Duration::from_secs(10)).send().await.map_err(|_| ApiCardError::Retryable)?;
        let status = response.status();
        if status.is_server_error() || status.as_u16() == 408 {
            return Err(ApiCardError::Retryable);
        }
        if !status.is_success() {
            return Err(ApiCardError::Fatal);
        }
        response.json::<Value>().await.map_err(|_| ApiCardError::Fatal)
    }
}

pub struct DeliveryOutcome {
    pub order_id: Option<String>,
    pub sent_content: Option<String>,
    pub ship_confirmed: bool,
    pub rule_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    NoOrderId,
    OnCooldown,
    NoMatchingRule,
}

/// Runs the auto-delivery pipeline for one trigger (§4.7). `card_body` is the
/// decoded card payload the order id is extracted from (§3).
#[allow(clippy::too_many_arguments)]
pub async fn run_delivery(
    store: &Store,
    ledger: &CooldownLedger,
    account_id: &str,
    owner_user_id: &str,
    item_id: &str,
    card_body: &Value,
    auto_confirm_enabled: bool,
    product_detail_api: Option<&dyn ProductDetailApi>,
    order_detail: Option<&dyn OrderDetail>,
    ship_confirm: &dyn ShipConfirm,
    api_transport: Option<&dyn ApiCardTransport>,
    send: impl FnOnce(String) -> futures_util::future::BoxFuture<'static, anyhow::Result<()>>,
) -> Result<DeliveryOutcome, DeliveryFailure> {
    // Step 1: order id extraction. Absence suppresses ship confirmation and
    // delivery content, per source policy, but is not fatal to the call.
    let order_id = extract_order_id(card_body);

    if let Some(ref order_id) = order_id {
        // Step 2: cooldown check.
        if ledger.delivery_on_cooldown(order_id) {
            return Err(DeliveryFailure::OnCooldown);
        }
    }

    // Step 3: build search text.
    let search_text = build_search_text(store, account_id, item_id, product_detail_api).await;

    // Step 4: spec discovery.
    let spec = match (&order_id, order_detail) {
        (Some(order_id), Some(order_detail)) => {
            let item_info = store.get_item_info(account_id, item_id).ok().flatten();
            if item_info.as_ref().is_some_and(|i| i.is_multi_spec) {
                order_detail.fetch(order_id).await
            } else {
                None
            }
        }
        _ => None,
    };

    // Step 5: rule matching.
    let rule = match &spec {
        Some((spec_name, spec_value)) => {
            let mut matches = store
                .get_delivery_rules_by_keyword_and_spec(&search_text, spec_name, spec_value)
                .map_err(|_| DeliveryFailure::NoMatchingRule)?;
            if matches.is_empty() {
                matches = store
                    .get_delivery_rules_by_keyword(&search_text)
                    .map_err(|_| DeliveryFailure::NoMatchingRule)?;
            }
            matches.into_iter().next()
        }
        None => store
            .get_delivery_rules_by_keyword(&search_text)
            .map_err(|_| DeliveryFailure::NoMatchingRule)?
            .into_iter()
            .next(),
    };

    let Some(rule) = rule else {
        return Err(DeliveryFailure::NoMatchingRule);
    };

    let card = store.get_card(&rule.card_id).ok().flatten();

    // Step 6: delay.
    if let Some(ref card) = card {
        if card.delay_seconds > 0 {
            sleep(Duration::from_secs(card.delay_seconds)).await;
        }
    }

    // Step 7: ship confirmation.
    let mut ship_confirmed = false;
    if auto_confirm_enabled {
        if let Some(ref order_id) = order_id {
            if !ledger.is_confirmed(order_id) {
                if ship_confirm.confirm_ship(order_id).await.is_ok() {
                    ledger.mark_confirmed(order_id);
                    ship_confirmed = true;
                }
            }
        }
    }

    // Step 8: content production, only if order_id present.
    let mut sent_content = None;
    if let (Some(order_id), Some(card)) = (&order_id, &card) {
        let content = match card.kind {
            CardKind::Api => {
                if let Some(transport) = api_transport {
                    produce_api_content(transport, card).await
                } else {
                    None
                }
            }
            CardKind::Text => Some(card.payload.clone()),
            CardKind::Data => store.consume_batch_data(&card.id).ok().flatten(),
        };

        if let Some(content) = content {
            // Step 9: description interpolation.
            let message = match &card.description {
                Some(desc) if desc.contains("{DELIVERY_CONTENT}") => desc.replace("{DELIVERY_CONTENT}", &content),
                Some(desc) => format!("{desc}\n\n{content}"),
                None => content.clone(),
            };

            // Step 10: send.
            if send(message.clone()).await.is_ok() {
                ledger.mark_delivered(order_id);
                let _ = store.increment_delivery_times(rule.id);
                sent_content = Some(message);
            }
        }
    }

    Ok(DeliveryOutcome { order_id, sent_content, ship_confirmed, rule_id: Some(rule.id) })
}

async fn build_search_text(
    store: &Store,
    account_id: &str,
    item_id: &str,
    product_detail_api: Option<&dyn ProductDetailApi>,
) -> String {
    if let Some(api) = product_detail_api {
        if let Some((title, detail)) = api.detail(item_id).await {
            let _ = store.update_item_detail(account_id, item_id, &detail);
            return format!("{title} {detail}");
        }
    }

    if let Ok(Some(info)) = store.get_item_info(account_id, item_id) {
        if !info.title.is_empty() || !info.detail_text.is_empty() {
            return format!("{} {}", info.title, info.detail_text);
        }
    }

    item_id.to_owned()
}

async fn produce_api_content(transport: &dyn ApiCardTransport, card: &Card) -> Option<String> {
    const MAX_RETRIES: u32 = 4;
    let mut attempt = 0;
    loop {
        match transport.fetch(card).await {
            Ok(value) => {
                let content = value
                    .get("data")
                    .or_else(|| value.get("content"))
                    .or_else(|| value.get("card"))
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| value.to_string());
                return Some(content);
            }
            Err(ApiCardError::Retryable) if attempt < MAX_RETRIES => {
                attempt += 1;
                sleep(Duration::from_secs(2 * attempt as u64)).await;
            }
            Err(_) => return None,
        }
    }
}
