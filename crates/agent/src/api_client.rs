// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signed API client (C3). Token-aware HTTPS client with transparent refresh
//! and bounded retry: fixed 3 retries at 500ms spacing (§4.3 step 5) rather
//! than an exponential curve, since the caller already backs off at the
//! session level.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::sleep;

use crate::crypto::Crypto;
use crate::error::{classify_failure_text, EngineError};
use crate::store::Store;

const MAX_RETRIES: u32 = 3;
const RETRY_SPACING: Duration = Duration::from_millis(500);

/// Mutable token state for one account's API client. Shared with the
/// session engine so a background refresh and a call-time refresh observe
/// the same `current_token`.
pub struct TokenState {
    pub current_token: RwLock<Option<String>>,
    pub last_token_refresh_at: RwLock<Option<SystemTime>>,
}

impl TokenState {
    pub fn new() -> Self {
        TokenState { current_token: RwLock::new(None), last_token_refresh_at: RwLock::new(None) }
    }

    fn is_stale(&self, refresh_interval: Duration) -> bool {
        let token_missing = self.current_token.read().is_none();
        let stale = self
            .last_token_refresh_at
            .read()
            .map(|at| at.elapsed().unwrap_or(Duration::MAX) >= refresh_interval)
            .unwrap_or(true);
        token_missing || stale
    }
}

impl Default for TokenState {
    fn default() -> Self {
        Self::new()
    }
}

/// A successful signed-API response body.
pub type ApiResult = Result<Value, EngineError>;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    device_id: String,
    crypto: Arc<dyn Crypto>,
    tokens: Arc<TokenState>,
    store: Arc<Store>,
    refresh_interval: Duration,
}

impl ApiClient {
    pub fn new(
        base_url: String,
        account_id: String,
        device_id: String,
        crypto: Arc<dyn Crypto>,
        tokens: Arc<TokenState>,
        store: Arc<Store>,
        refresh_interval: Duration,
    ) -> Self {
        ApiClient {
            http: reqwest::Client::new(),
            base_url,
            account_id,
            device_id,
            crypto,
            tokens,
            store,
            refresh_interval,
        }
    }

    /// `call(api_name, body) → json`, implementing §4.3 steps 1-6.
    pub async fn call(&self, api_name: &str, body: &Value) -> ApiResult {
        if self.tokens.is_stale(self.refresh_interval) {
            self.refresh_token().await?;
        }

        let mut attempt = 0;
        loop {
            let token = self.tokens.current_token.read().clone().unwrap_or_default();
            let response = self.post_signed(api_name, &token, body).await?;

            match self.interpret_response(&response) {
                Ok(body) => return Ok(body),
                Err(err) if err.is_benign() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    self.refresh_token().await?;
                    sleep(RETRY_SPACING).await;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn post_signed(&self, api_name: &str, token: &str, body: &Value) -> Result<Value, EngineError> {
        let timestamp = now_ms();
        let serialized = serde_json::to_string(body)?;
        let sign = self.crypto.sign(timestamp, token, &serialized);
        let cookie = self.store.get_account(&self.account_id)?.map(|a| a.cookie_blob).unwrap_or_default();

        let response = self
            .http
            .post(format!("{}/{}", self.base_url, api_name))
            .query(&[("t", timestamp.to_string()), ("sign", sign), ("v", "1.0".to_owned()), ("api", api_name.to_owned())])
            .header("cookie", cookie)
            .json(body)
            .send()
            .await?;

        if let Some(set_cookie) = response.headers().get(reqwest::header::SET_COOKIE).cloned() {
            if let Ok(text) = set_cookie.to_str() {
                self.store.save_cookie(&self.account_id, text, None)?;
            }
        }

        response.json::<Value>().await.map_err(EngineError::from)
    }

    /// Interprets `ret` array success marker per §4.3 step 4, or classifies
    /// the failure per §7.
    fn interpret_response(&self, response: &Value) -> Result<Value, EngineError> {
        let success = response
            .get("ret")
            .and_then(Value::as_array)
            .is_some_and(|ret| ret.iter().any(|r| r.as_str().is_some_and(|s| s.contains("SUCCESS"))));

        if success {
            return Ok(response.clone());
        }

        let failure_text = response
            .get("ret")
            .and_then(Value::as_array)
            .and_then(|ret| ret.first())
            .and_then(Value::as_str)
            .unwrap_or("unknown failure");

        Err(classify_failure_text(failure_text))
    }

    /// Calls the login-token API and updates `current_token` +
    /// `last_token_refresh_at` (§4.3 "refresh_token()").
    pub async fn refresh_token(&self) -> Result<(), EngineError> {
        let timestamp = now_ms();
        let cookie = self.store.get_account(&self.account_id)?.map(|a| a.cookie_blob).unwrap_or_default();
        let sign = self.crypto.sign(timestamp, "", &self.device_id);

        let response = self
            .http
            .post(format!("{}/token/refresh", self.base_url))
            .query(&[("t", timestamp.to_string()), ("sign", sign), ("deviceId", self.device_id.clone())])
            .header("cookie", cookie)
            .send()
            .await?;

        let body: Value = response.json().await?;
        let token = body
            .get("data")
            .and_then(|d| d.get("accessToken"))
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::PersistentAuthFailure("refresh_token: missing accessToken".into()))?;

        *self.tokens.current_token.write() = Some(token.to_owned());
        *self.tokens.last_token_refresh_at.write() = Some(SystemTime::now());
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// C3 also plays the role of C7's live collaborators for the signed APIs
/// that back ship-confirm, freeshipping, and product detail — these are
/// ordinary signed calls through `call()`, unlike the truly sealed
/// collaborators (order-detail's headless-browser path, `Crypto::sign`).
#[async_trait::async_trait]
impl crate::fulfillment::ShipConfirm for ApiClient {
    async fn confirm_ship(&self, order_id: &str) -> anyhow::Result<()> {
        self.call("order.confirm_ship", &serde_json::json!({ "orderId": order_id }))
            .await
            .map(|_| ())
            .map_err(anyhow::Error::from)
    }
}

#[async_trait::async_trait]
impl crate::fulfillment::Freeshipping for ApiClient {
    async fn freeshipping(&self, order_id: &str, item_id: &str, buyer_id: &str) -> anyhow::Result<()> {
        self.call(
            "order.freeshipping",
            &serde_json::json!({ "orderId": order_id, "itemId": item_id, "buyerId": buyer_id }),
        )
        .await
        .map(|_| ())
        .map_err(anyhow::Error::from)
    }
}

#[async_trait::async_trait]
impl crate::fulfillment::ProductDetailApi for ApiClient {
    async fn detail(&self, item_id: &str) -> Option<(String, String)> {
        let response = self.call("item.detail", &serde_json::json!({ "itemId": item_id })).await.ok()?;
        let data = response.get("data")?;
        let title = data.get("title").and_then(Value::as_str)?.to_owned();
        let detail = data.get("detail").and_then(Value::as_str).unwrap_or_default().to_owned();
        Some((title, detail))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;
    use crate::crypto::FakeCrypto;

    #[test]
    fn token_state_is_stale_when_missing() {
        let state = TokenState::new();
        assert!(state.is_stale(Duration::from_secs(3600)));
    }

    #[test]
    fn token_state_fresh_after_set() {
        let state = TokenState::new();
        *state.current_token.write() = Some("tok".to_owned());
        *state.last_token_refresh_at.write() = Some(SystemTime::now());
        assert!(!state.is_stale(Duration::from_secs(3600)));
    }

    /// Fails once with a benign token-expiry marker, then succeeds — models
    /// the real marketplace reissuing a fresh token mid-call.
    struct BenignThenSuccess {
        calls: AtomicUsize,
    }

    impl BenignThenSuccess {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    impl Respond for BenignThenSuccess {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            if self.calls.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ret": ["FAIL_SYS_SESSION_EXPIRED::Session过期"] }))
            } else {
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ret": ["SUCCESS::调用成功"], "data": { "ok": true } }))
            }
        }
    }

    /// P5/S5: a benign expiry mid-call is retried transparently — the caller
    /// sees the eventual success, never the intermediate failure.
    #[tokio::test]
    async fn call_retries_transparently_on_benign_token_expiry() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "accessToken": "tok1" } })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/test.api"))
            .respond_with(BenignThenSuccess::new())
            .mount(&server)
            .await;

        let store = Arc::new(Store::open_in_memory().unwrap());
        store.save_cookie("acc1", "cookie", Some("user1")).unwrap();

        let client = ApiClient::new(
            server.uri(),
            "acc1".to_owned(),
            "device1".to_owned(),
            Arc::new(FakeCrypto),
            Arc::new(TokenState::new()),
            store,
            Duration::from_secs(3600),
        );

        let result = client.call("test.api", &json!({})).await.unwrap();
        assert_eq!(result["data"]["ok"], json!(true));
    }
}
