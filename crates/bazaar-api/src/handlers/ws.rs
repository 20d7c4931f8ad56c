//! WebSocket upgrade handler.
//!
//! Each socket runs one reader task and one writer task. The writer drains
//! the hub's outbound buffer and sends periodic pings; the reader handles
//! client frames. When either side ends, or the hub closes the connection,
//! both stop and the connection is unregistered.

use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use bazaar_auth::{AuthContext, Requirement};
use bazaar_core::error::AppError;
use bazaar_core::types::ConnectionId;
use bazaar_realtime::{InboundMessage, OutboundMessage, Registration};

use crate::error::{ApiResult, status_for};
use crate::extractors::RequestCancel;
use crate::state::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Access token for clients that cannot set headers.
    pub token: Option<String>,
}

/// GET /ws: WebSocket upgrade
///
/// Credentials come from the `Authorization` header, or `?token=` for
/// browsers. They are checked before the upgrade.
pub async fn ws_handler(
    State(state): State<AppState>,
    cancel: RequestCancel,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let ctx = match (header, query.token.as_deref()) {
        (Some(header), _) => {
            state
                .gate
                .authenticate_header(&cancel, Some(header), Requirement::authenticated())
                .await?
        }
        (None, Some(token)) => {
            state
                .gate
                .authenticate(&cancel, token, Requirement::authenticated())
                .await?
        }
        (None, None) => return Err(AppError::unauthorized("Missing access token").into()),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(state, ctx, socket)))
}

/// Runs an established connection until either side closes it.
async fn handle_socket(state: AppState, ctx: AuthContext, socket: WebSocket) {
    let Registration {
        conn_id,
        mut outbound,
        closed,
    } = match state.hub.register(ctx.user_id).await {
        Ok(registration) => registration,
        Err(e) => {
            warn!(user_id = %ctx.user_id, error = %e, "WebSocket registration failed");
            return;
        }
    };
    let user_id = ctx.user_id;
    info!(
        conn_id = %conn_id,
        user_id = %user_id,
        session_id = %ctx.session_id,
        "WebSocket connection established"
    );

    let (mut sink, mut stream) = socket.split();

    let cancel = state.shutdown.child_token();
    if let Err(e) = state.notifications.publish_unread_count(&cancel, user_id).await {
        debug!(conn_id = %conn_id, error = %e, "Initial unread count unavailable");
    }

    // Writer
    let ping_every = Duration::from_secs(state.config.realtime.ping_interval_seconds.max(1));
    let writer_closed = closed.clone();
    let mut writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_every);
        ticker.tick().await;
        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    if sink.send(Message::Text(message.to_json().into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let ping = OutboundMessage::ping().to_json();
                    if sink.send(Message::Text(ping.into())).await.is_err() {
                        break;
                    }
                }
                _ = writer_closed.cancelled() => {
                    while let Ok(message) = outbound.try_recv() {
                        if sink.send(Message::Text(message.to_json().into())).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // Reader
    let reader_state = state.clone();
    let reader_closed = closed.clone();
    let mut reader = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reader_closed.cancelled() => break,
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&reader_state, &ctx, conn_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(conn_id = %conn_id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => {
            closed.cancel();
            let _ = writer.await;
        }
    }

    state.hub.unregister(user_id, conn_id);
    info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connection closed");
}

/// Handles one client frame.
async fn handle_inbound(state: &AppState, ctx: &AuthContext, conn_id: ConnectionId, text: &str) {
    let message = match serde_json::from_str::<InboundMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(conn_id = %conn_id, error = %e, "Malformed client frame");
            state.hub.send(
                ctx.user_id,
                OutboundMessage::Error {
                    code: "INVALID_MESSAGE".into(),
                    message: "Unrecognized message".into(),
                },
            );
            return;
        }
    };

    let cancel = state.shutdown.child_token();
    let result = match message {
        InboundMessage::Ack { message_id } => {
            debug!(conn_id = %conn_id, notification_id = %message_id, "Notification acknowledged");
            Ok(())
        }
        InboundMessage::Read { notification_id } => state
            .notifications
            .mark_read(&cancel, ctx.user_id, notification_id)
            .await
            .map(|_| ()),
        InboundMessage::ReadAll => state
            .notifications
            .mark_all_read(&cancel, ctx.user_id)
            .await
            .map(|_| ()),
        InboundMessage::Ping => {
            state.hub.send(ctx.user_id, OutboundMessage::ping());
            Ok(())
        }
    };

    if let Err(e) = result {
        let (_, code) = status_for(e.kind);
        let message = if e.kind.is_internal() {
            warn!(conn_id = %conn_id, error = %e, "Client frame failed");
            "An internal error occurred".to_string()
        } else {
            e.message
        };
        state.hub.send(
            ctx.user_id,
            OutboundMessage::Error {
                code: code.to_string(),
                message,
            },
        );
    }
}
