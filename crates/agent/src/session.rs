// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session engine (C4): one state machine per account — connect, register,
//! heartbeat, token refresh, reconnect. Reconnect backoff is exponential
//! with a ceiling (§4.4) rather than a fixed delay, to avoid a mass-reconnect
//! thundering herd across many accounts sharing the same outage.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;

use crate::config::EngineConfig;
use crate::crypto;
use crate::demux;
use crate::dispatch;
use crate::error::EngineError;
use crate::notifier::{self, NotificationKind};
use crate::state::{epoch_ms, OutboundFrame, Session, SessionState};
use crate::wire::{outbound, Classified, RawFrame};

/// Runs the session until cancellation. `outbound_rx` is the receiving end
/// of the channel whose sender lives on `session.outbound_tx`; it is created
/// alongside the `Session` by the registry (C8) since `mpsc::Receiver` is not
/// `Clone`. Spawns the three cooperating subtasks of §4.4 and awaits all of
/// them; any subtask exiting (other than via cancellation) triggers a
/// reconnect of the whole group.
pub async fn run(session: Arc<Session>, config: Arc<EngineConfig>, mut outbound_rx: mpsc::Receiver<OutboundFrame>) {
    session.set_state(SessionState::Idle).await;

    let mut backoff = config.reconnect_backoff_initial();

    while !session.is_cancelled() {
        session.set_state(SessionState::Connecting).await;

        match connect_and_run(&session, &config, &mut outbound_rx).await {
            Ok(()) => {
                // Graceful close (token-refresh-triggered reconnect): reset backoff.
                backoff = config.reconnect_backoff_initial();
            }
            Err(err) => {
                tracing::warn!(account_id = %session.account_id, error = %err, "session connection failed");
            }
        }

        if session.is_cancelled() {
            break;
        }

        session.set_state(SessionState::Reconnecting).await;
        sleep(backoff).await;
        backoff = (backoff * 2).min(config.reconnect_backoff_max());
    }

    session.set_state(SessionState::Stopped).await;
}

async fn connect_and_run(
    session: &Arc<Session>,
    config: &Arc<EngineConfig>,
    outbound_rx: &mut mpsc::Receiver<OutboundFrame>,
) -> Result<(), EngineError> {
    let (ws_stream, _) = tokio::time::timeout(
        config.ws_connect_timeout(),
        tokio_tungstenite::connect_async(config.ws_url.as_str()),
    )
    .await
    .map_err(|_| EngineError::Transient("ws connect timeout".into()))?
    .map_err(|e| EngineError::Transient(e.to_string()))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    session.set_state(SessionState::Registering).await;
    send_register(session, &mut ws_tx).await?;
    send_ack_diff(session, &mut ws_tx).await?;
    session.set_state(SessionState::Active).await;

    let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(session), config.clone()));
    let token_refresh = tokio::spawn(token_refresh_loop(Arc::clone(session), config.clone()));

    let result = tokio::select! {
        _ = session.cancel.cancelled() => Ok(()),

        outcome = recv_loop(session, &mut ws_rx) => outcome,

        _ = async {
            while let Some(frame) = outbound_rx.recv().await {
                let text = serde_json::to_string(&json!({ "path": frame.path, "body": frame.body })).unwrap_or_default();
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        } => Ok(()),

        _ = async {
            if session.restart_flag.swap(false, Ordering::SeqCst) {
                return;
            }
            std::future::pending::<()>().await
        } => Ok(()),
    };

    heartbeat.abort();
    token_refresh.abort();
    let _ = ws_tx.close().await;
    result
}

async fn send_register(
    session: &Session,
    ws_tx: &mut futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        Message,
    >,
) -> Result<(), EngineError> {
    let token = session.tokens.current_token.read().clone().unwrap_or_default();
    let body = json!({
        "appKey": "444e9908a51d1cb236a27862abc769c9",
        "token": token,
        "deviceId": session.device_id,
        "ua": "xianyu-agent/1.0",
        "mid": crypto::mid(),
    });
    let frame = json!({ "path": outbound::REGISTER, "body": body });
    ws_tx
        .send(Message::Text(frame.to_string().into()))
        .await
        .map_err(|e| EngineError::Transient(e.to_string()))
}

async fn send_ack_diff(
    session: &Session,
    ws_tx: &mut futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        Message,
    >,
) -> Result<(), EngineError> {
    let frame = json!({ "path": outbound::ACK_DIFF, "body": { "mid": crypto::mid(), "accountId": session.account_id } });
    ws_tx
        .send(Message::Text(frame.to_string().into()))
        .await
        .map_err(|e| EngineError::Transient(e.to_string()))
}

async fn recv_loop(
    session: &Arc<Session>,
    ws_rx: &mut futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
) -> Result<(), EngineError> {
    while let Some(message) = ws_rx.next().await {
        if session.is_cancelled() {
            return Ok(());
        }
        let message = message.map_err(|e| EngineError::Transient(e.to_string()))?;
        let Message::Text(text) = message else { continue };

        let Ok(frame) = serde_json::from_str::<RawFrame>(&text) else {
            tracing::debug!(account_id = %session.account_id, "dropping malformed frame");
            continue;
        };

        // Ack first (§4.5 step 1, §5 "ack frames MUST be sent before any
        // long-running handling begins"). Best-effort: ignore send failure.
        let ack = demux::build_ack(&frame);
        let _ = session
            .outbound_tx
            .try_send(OutboundFrame { path: "/ack", body: serde_json::to_value(&ack).unwrap_or_default() });

        match demux::classify(&frame, session.crypto.as_ref(), &session.self_id, &session.owner_user_id, (epoch_ms() / 1000) as i64) {
            Ok(Some(Classified::HeartbeatAck)) => {
                session.note_heartbeat_ack(epoch_ms());
            }
            Ok(Some(classified)) => {
                dispatch::handle(session, classified).await;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(account_id = %session.account_id, error = %err, "dropping frame");
            }
        }
    }
    Ok(())
}

async fn heartbeat_loop(session: Arc<Session>, config: Arc<EngineConfig>) {
    loop {
        if session.is_cancelled() {
            return;
        }
        sleep(config.heartbeat_interval()).await;
        if session.is_cancelled() {
            return;
        }

        let frame = OutboundFrame { path: outbound::HEARTBEAT, body: json!({ "mid": crypto::mid() }) };
        if session.outbound_tx.send(frame).await.is_err() {
            return;
        }
        session.note_heartbeat_sent(epoch_ms());

        let last_ack = session.last_heartbeat_ack_at.load(Ordering::SeqCst);
        let now = epoch_ms();
        if last_ack != 0 && now.saturating_sub(last_ack) > config.heartbeat_timeout().as_millis() as u64 {
            tracing::warn!(account_id = %session.account_id, "heartbeat ack timeout, forcing reconnect");
            session.cancel.cancel();
            return;
        }
    }
}

async fn token_refresh_loop(session: Arc<Session>, config: Arc<EngineConfig>) {
    loop {
        if session.is_cancelled() {
            return;
        }
        sleep(Duration::from_secs(60)).await;
        if session.is_cancelled() {
            return;
        }

        let stale = session
            .tokens
            .last_token_refresh_at
            .read()
            .map(|at| at.elapsed().unwrap_or(Duration::MAX) >= config.token_refresh_interval())
            .unwrap_or(true);

        if !stale {
            continue;
        }

        match session.api_client.refresh_token().await {
            Ok(()) => {
                session.restart_flag.store(true, Ordering::SeqCst);
                return;
            }
            Err(err) if err.is_benign() => {
                sleep(config.token_retry_interval()).await;
            }
            Err(err) => {
                tracing::warn!(account_id = %session.account_id, error = %err, "token refresh failed");
                if let Err(notify_err) = notifier::dispatch(
                    session.notifier.as_ref(),
                    &session.cooldowns,
                    &session.store,
                    &session.owner_user_id,
                    NotificationKind::TokenHealth,
                    &format!("token refresh failed: {err}"),
                )
                .await
                {
                    tracing::debug!(account_id = %session.account_id, error = %notify_err, "token health notification failed");
                }
                sleep(config.token_retry_interval()).await;
            }
        }
    }
}
