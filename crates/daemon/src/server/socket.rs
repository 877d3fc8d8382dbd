//! WebSocket transport attaching a browser connection to a session.

use std::borrow::Cow;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use shellbridge_protocol::{close_code, ClientFrame, REASON_INVALID_SESSION};

use crate::session::{Attachment, Outbound};

use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub(super) struct SocketParams {
    sid: Option<String>,
}

pub(super) async fn terminal_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<SocketParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.sid))
}

fn close_message(code: u16, reason: impl Into<Cow<'static, str>>) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, sid: Option<String>) {
    let attached = sid
        .as_deref()
        .and_then(|sid| state.registry.get(sid))
        .and_then(|session| session.attach().ok().map(|attachment| (session, attachment)));

    let Some((session, attachment)) = attached else {
        tracing::debug!(sid = ?sid, "Rejected terminal connection");
        let _ = socket
            .send(close_message(close_code::POLICY_VIOLATION, REASON_INVALID_SESSION))
            .await;
        return;
    };

    let Attachment {
        client_id,
        mut outbound,
    } = attachment;
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Session -> WebSocket
            item = outbound.recv() => {
                match item {
                    Some(Outbound::Message(message)) => {
                        let json = match message.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to encode message");
                                continue;
                            }
                        };
                        if ws_tx.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = ws_tx.send(close_message(code, reason)).await;
                        let _ = ws_tx.flush().await;
                        break;
                    }
                    None => break,
                }
            }

            // WebSocket -> session
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        session.handle_frame(client_id, ClientFrame::parse(&text));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let text = String::from_utf8_lossy(&data);
                        session.handle_frame(client_id, ClientFrame::parse(&text));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ping/Pong handled automatically
                    Some(Err(e)) => {
                        tracing::debug!(client_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    session.detach(client_id);
}
