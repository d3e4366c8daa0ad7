mod audience;
pub mod handlers;
mod host;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::AppState;
use crate::types::Role;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
    /// Participant token of a returning audience member
    pub token: Option<String>,
}

/// A socket send failed; the connection loop ends
#[derive(Debug, thiserror::Error)]
#[error("WebSocket transport disconnected")]
pub struct TransportDisconnected;

type WsSender = SplitSink<WebSocket, Message>;

/// Role requested in the upgrade query; anything unknown is audience
pub(crate) fn parse_role(role: Option<&str>) -> Role {
    match role {
        Some("host") => Role::Host,
        Some("presenter") => Role::Presenter,
        _ => Role::Audience,
    }
}

/// WebSocket upgrade handler. Host and presenter roles are gated by
/// `auth::privileged_ws_auth_middleware` before reaching here.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection request: role={:?}, has_token={}",
        params.role,
        params.token.is_some()
    );

    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn send(sender: &mut WsSender, msg: &ServerMessage) -> Result<(), TransportDisconnected> {
    let json = serde_json::to_string(msg).map_err(|e| {
        tracing::error!("Failed to serialize message: {}", e);
        TransportDisconnected
    })?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| TransportDisconnected)
}

/// Authoritative snapshot for this connection, or an error message if the
/// store is unreachable
async fn state_message(state: &AppState, role: Role, token: Option<&str>) -> ServerMessage {
    match state.state_for_token(role, token).await {
        Ok(snapshot) => ServerMessage::State(snapshot),
        Err(e) => ServerMessage::error(&e),
    }
}

/// Receive from an optional channel; pending forever when absent
async fn recv_optional(
    rx: &mut Option<tokio::sync::broadcast::Receiver<ServerMessage>>,
) -> Result<ServerMessage, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let role = parse_role(params.role.as_deref());
    let mut participant_token = params.token;
    tracing::info!("WebSocket connected with role: {:?}", role);

    match run_connection(socket, role, &mut participant_token, &state).await {
        Ok(()) => tracing::info!("WebSocket connection closed for role: {:?}", role),
        Err(e) => tracing::info!("{} (role: {:?})", e, role),
    }
}

async fn run_connection(
    socket: WebSocket,
    role: Role,
    participant_token: &mut Option<String>,
    state: &Arc<AppState>,
) -> Result<(), TransportDisconnected> {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing committed in between is lost
    let mut broadcast_rx = state.broadcast.subscribe();
    let live_tally = role.sees_live_tally();
    let mut presenter_rx = live_tally.then(|| state.presenter_broadcast.subscribe());

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        role,
        server_now: state.clock.now(),
    };
    send(&mut sender, &welcome).await?;
    let snapshot = state_message(state, role, participant_token.as_deref()).await;
    send(&mut sender, &snapshot).await?;

    loop {
        tokio::select! {
            msg = broadcast_rx.recv() => match msg {
                Ok(ServerMessage::TallyDelta { .. }) if live_tally => {
                    // Already delivered on the presenter stream
                }
                Ok(msg) => send(&mut sender, &msg).await?,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Client lagged by {} messages, resyncing", missed);
                    let snapshot = state_message(state, role, participant_token.as_deref()).await;
                    send(&mut sender, &snapshot).await?;
                }
                Err(RecvError::Closed) => return Ok(()),
            },

            msg = recv_optional(&mut presenter_rx) => match msg {
                Ok(msg) => send(&mut sender, &msg).await?,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Presenter lagged by {} tally updates, resyncing", missed);
                    let snapshot = state_message(state, role, None).await;
                    send(&mut sender, &snapshot).await?;
                }
                Err(RecvError::Closed) => return Ok(()),
            },

            ws_msg = receiver.next() => match ws_msg {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("Received message: {}", text);
                    let response = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            if let ClientMessage::Resume { participant_token: ref token } = client_msg {
                                *participant_token = Some(token.clone());
                            }
                            handlers::handle_message(client_msg, &role, state).await
                        }
                        Err(e) => {
                            tracing::warn!("Failed to parse client message: {}", e);
                            Some(ServerMessage::Error {
                                code: "PARSE_ERROR".to_string(),
                                msg: format!("Invalid message format: {}", e),
                            })
                        }
                    };
                    if let Some(response) = response {
                        if let ServerMessage::Registered { participant_token: ref token, .. } = response {
                            *participant_token = Some(token.clone());
                        }
                        send(&mut sender, &response).await?;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    sender
                        .send(Message::Pong(data))
                        .await
                        .map_err(|_| TransportDisconnected)?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!("WebSocket error: {}", e);
                    return Err(TransportDisconnected);
                }
            },
        }
    }
}
