//! WebSocket transport.
//!
//! Each socket is split: a writer task drains the session's outbox and pings
//! every [`HEARTBEAT_INTERVAL`], while the reader feeds text frames to the
//! [`Connection`] in arrival order.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::constants::HEARTBEAT_INTERVAL;
use crate::hub::Hub;
use crate::protocol::ServerMessage;

pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, hub))
}

async fn serve_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut conn = Connection::open(hub, tx).await;
    let session = conn.session();

    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match msg.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode server message");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => conn.receive(&text).await,
            Ok(Message::Binary(_)) => {
                tracing::debug!(session = %session.short(), "binary frame ignored");
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                tracing::warn!(session = %session.short(), error = %e, "websocket error");
                break;
            }
        }
    }

    conn.close().await;
    writer.abort();
}
