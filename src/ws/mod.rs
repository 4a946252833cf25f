//! Transport shell (§4.H): Axum WebSocket upgrade, the join handshake, and
//! the per-connection reader/writer tasks that translate between JSON wire
//! frames and `RoomEvent`s (§9: "dynamic dispatch on incoming messages").

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::RoomError;
use crate::protocol::{JoinRequest, ServerToClient};
use crate::room::manager::RoomDirectory;
use crate::room::RoomEvent;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);
const MISSED_PONGS_BEFORE_DROP: u32 = 6;

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<RoomDirectory>,
}

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.directory))
}

async fn handle_socket(socket: WebSocket, directory: Arc<RoomDirectory>) {
    let (mut sink, mut stream) = socket.split();

    let first_frame = match timeout(JOIN_TIMEOUT, stream.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        _ => {
            let _ = sink.close().await;
            return;
        }
    };

    let request: JoinRequest = match serde_json::from_str(&first_frame) {
        Ok(r) => r,
        Err(e) => {
            send_error(&mut sink, format!("invalid join request: {e}")).await;
            return;
        }
    };

    let handle = match request {
        JoinRequest::CreateRoom { .. } => match directory.create_room() {
            Ok(h) => h,
            Err(e) => {
                send_error(&mut sink, e.to_string()).await;
                return;
            }
        },
        JoinRequest::JoinRoom { ref room_code, .. } => match directory.get_room(room_code) {
            Some(h) => h,
            None => {
                send_error(&mut sink, RoomError::RoomNotFound.to_string()).await;
                return;
            }
        },
    };
    let nickname = match request {
        JoinRequest::CreateRoom { nickname } | JoinRequest::JoinRoom { nickname, .. } => nickname,
    };

    let session_id = Uuid::new_v4();
    let (reply_tx, reply_rx) = oneshot::channel();
    if handle
        .tx
        .send(RoomEvent::Join { session_id, nickname, reply: reply_tx })
        .is_err()
    {
        send_error(&mut sink, "room is no longer available").await;
        return;
    }

    let ack = match reply_rx.await {
        Ok(Ok(ack)) => ack,
        Ok(Err(e)) => {
            send_error(&mut sink, e.to_string()).await;
            return;
        }
        Err(_) => {
            send_error(&mut sink, "room is no longer available").await;
            return;
        }
    };
    let mut outbound_rx = ack.outbound_rx;

    // Drives both the game-message stream and the keepalive ping ticker, so
    // both share the one sink half (the read half owns the other).
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        ping_interval.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                maybe_msg = outbound_rx.recv() => {
                    match maybe_msg {
                        Some(msg) => {
                            let Ok(json) = serde_json::to_string(&msg) else { continue };
                            if sink.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let room_tx = handle.tx.clone();
    let mut missed_pongs = 0u32;
    let mut consented_close = false;

    loop {
        match timeout(KEEPALIVE_INTERVAL, stream.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                missed_pongs = 0;
                match serde_json::from_str(&text) {
                    Ok(msg) => {
                        let _ = room_tx.send(RoomEvent::Client(session_id, msg));
                    }
                    Err(_) => continue,
                }
            }
            Ok(Some(Ok(Message::Pong(_)))) => {
                missed_pongs = 0;
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                consented_close = true;
                break;
            }
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {
                missed_pongs += 1;
                if missed_pongs >= MISSED_PONGS_BEFORE_DROP {
                    break;
                }
            }
        }
    }

    let _ = room_tx.send(RoomEvent::Disconnect { session_id, consented: consented_close });
    writer.abort();
}

async fn send_error(
    sink: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    message: impl Into<String>,
) {
    if let Ok(json) = serde_json::to_string(&ServerToClient::Error { message: message.into() }) {
        let _ = sink.send(Message::Text(json)).await;
    }
    let _ = sink.close().await;
}
