use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::game_loop::{GameBroadcast, GameCommand};
use crate::protocol::{ClientMsg, ServerMsg};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
    pub broadcast_tx: broadcast::Sender<GameBroadcast>,
    pub next_client_id: Arc<AtomicU32>,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let my_id = app_state.next_client_id.fetch_add(1, Ordering::Relaxed);
    tracing::info!("Client {} connected", my_id);

    // Subscribe before anything can be announced for this client, so a
    // start broadcast cannot slip past between ready and the first recv.
    let mut broadcast_rx = app_state.broadcast_tx.subscribe();

    // Which room this connection belongs to, learned from the start
    // broadcast that names it.
    let mut my_room: Option<u32> = None;
    let mut sent_ready = false;

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Unknown or malformed messages are dropped; the
                        // browser client treats the socket as fire-and-forget.
                        if let Ok(client_msg) = serde_json::from_str::<ClientMsg>(&text) {
                            match client_msg {
                                ClientMsg::Ready => {
                                    if sent_ready {
                                        tracing::debug!("Client {} repeated ready", my_id);
                                        continue;
                                    }
                                    let (resp_tx, resp_rx) = oneshot::channel();
                                    if app_state.game_tx.send(GameCommand::Ready {
                                        client_id: my_id,
                                        response: resp_tx,
                                    }).await.is_err() {
                                        tracing::error!("Failed to send Ready command");
                                        break;
                                    }
                                    let assigned = match resp_rx.await {
                                        Ok(assigned) => assigned,
                                        Err(_) => {
                                            tracing::error!("No seat assignment for client {}", my_id);
                                            break;
                                        }
                                    };
                                    sent_ready = true;
                                    let json = serde_json::to_string(
                                        &ServerMsg::PlayerAssigned(assigned),
                                    ).unwrap();
                                    if sink.send(Message::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                                ClientMsg::PaddleMove(msg) => {
                                    let _ = app_state.game_tx.send(GameCommand::PaddleMove {
                                        client_id: my_id,
                                        msg,
                                    }).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client (broadcast)
            result = broadcast_rx.recv() => {
                match result {
                    Ok(broadcast) => {
                        let json = match &broadcast {
                            GameBroadcast::MatchStarted { room_id, players, msg } => {
                                if !players.contains(&my_id) {
                                    continue; // Someone else's room filled
                                }
                                my_room = Some(*room_id);
                                serde_json::to_string(&ServerMsg::StartGame(msg.clone()))
                            }
                            GameBroadcast::GameState { room_id, msg } => {
                                if my_room != Some(*room_id) {
                                    continue;
                                }
                                serde_json::to_string(&ServerMsg::GameState(msg.clone()))
                            }
                            GameBroadcast::PaddleRelay { to, msg } => {
                                if *to != my_id {
                                    continue; // The sender sees its own paddle locally
                                }
                                serde_json::to_string(&ServerMsg::PaddleMove(msg.clone()))
                            }
                            GameBroadcast::RoomClosed { room_id, msg } => {
                                if my_room != Some(*room_id) {
                                    continue;
                                }
                                let json = serde_json::to_string(
                                    &ServerMsg::RoomClosed(msg.clone()),
                                ).unwrap();
                                let _ = sink.send(Message::Text(json.into())).await;
                                tracing::info!("Client {} dropped with room {}", my_id, room_id);
                                break;
                            }
                        };

                        if let Ok(json) = json {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Client {} lagged by {} messages", my_id, n);
                        // Continue - each state frame supersedes the last
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .game_tx
        .send(GameCommand::Disconnect { client_id: my_id })
        .await;
    tracing::info!("Client {} disconnected", my_id);
}
