//! The Event Gateway's connection half: WebSocket upgrade and message pump
//!
//! The Gateway does not authenticate per message - it trusts the identity
//! established once at upgrade (spec §4.4). It validates payload shape and
//! answers malformed frames with `error { message: "bad payload" }` without
//! ever reaching the Matchmaker.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{extract_bearer_token, verify_token, AuthError};
use crate::matchmaking::error::MatchmakerError;
use crate::matchmaking::Command;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters accepted on the WebSocket upgrade
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer token, for clients that cannot set an Authorization header
    pub token: Option<String>,
}

/// WebSocket upgrade handler: verifies the bearer token before upgrading
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, AuthError> {
    let token = match headers.get("Authorization") {
        Some(value) => {
            let header_str = value.to_str().map_err(|_| AuthError::InvalidFormat)?;
            extract_bearer_token(header_str)
                .ok_or(AuthError::InvalidFormat)?
                .to_string()
        }
        None => query.token.ok_or(AuthError::MissingHeader)?,
    };

    let user_id = verify_token(&token, &state.config.ws_auth_secret).map_err(|e| {
        error!(error = %e, "WebSocket auth failed");
        e
    })?;

    info!(user_id = %user_id, "WebSocket upgrade for authenticated user");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, state)))
}

/// Drive one upgraded WebSocket connection end to end: register a personal
/// reply channel with the Matchmaker, then pump inbound frames into
/// `Command`s and outbound `ServerMsg`s back onto the socket.
async fn handle_socket(socket: WebSocket, user_id: Uuid, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(user_id = %user_id, %connection_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMsg>();
    let rate_limiter = PlayerRateLimiter::new();

    let writer_user_id = user_id;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = reply_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(user_id = %writer_user_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(user_id = %user_id, "rate limited inbound frame");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        dispatch(
                            &state,
                            user_id,
                            connection_id,
                            client_msg,
                            reply_tx.clone(),
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "malformed client frame");
                        let _ = reply_tx.send(ServerMsg::Error {
                            message: MatchmakerError::BadPayload.to_string(),
                        });
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "received binary frame, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.matchmaker.send(Command::Disconnect { connection_id }).await;
    writer_handle.abort();

    info!(user_id = %user_id, %connection_id, "WebSocket connection closed");
}

/// Translate one inbound `ClientMsg` into the matching Matchmaker `Command`
/// (spec §4.4's event table).
async fn dispatch(
    state: &AppState,
    user_id: Uuid,
    connection_id: Uuid,
    msg: ClientMsg,
    reply: mpsc::UnboundedSender<ServerMsg>,
) {
    let command = match msg {
        ClientMsg::JoinQueue { user_id: claimed, username } => {
            let _ = claimed; // the Gateway trusts the upgrade-time identity, not the payload
            Command::JoinQueue {
                player_id: user_id,
                display_name: username,
                connection_id,
                reply,
            }
        }
        ClientMsg::LeaveQueue { .. } => Command::LeaveQueue {
            player_id: user_id,
            reply,
        },
        ClientMsg::PlayerReady { match_id, .. } => Command::MarkReady {
            player_id: user_id,
            match_id,
            reply,
        },
        ClientMsg::Tap { match_id, timestamp, .. } => Command::SubmitTap {
            player_id: user_id,
            match_id,
            client_timestamp_ms: timestamp,
            reply,
        },
    };

    state.matchmaker.send(command).await;
}

async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
