//! Event WebSocket: summary snapshots and sync results.

use crate::state::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use commlog_types::WsServerMessage;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Push the current snapshot, then every new snapshot and sync event until
/// the client goes away.
pub async fn handle_global_websocket(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut snapshots = state.aggregates.stream();
    let mut sync_events = state.engine.subscribe();

    tracing::info!(target: "commlog::ws", "Event WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                snapshot = snapshots.next() => match snapshot {
                    Some(summaries) => WsServerMessage::Summaries {
                        summaries: summaries.as_ref().clone(),
                    },
                    None => break,
                },
                event = sync_events.recv() => match event {
                    Ok(event) => WsServerMessage::Sync { event },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(target: "commlog::ws", "Client lagged by {} sync events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!(target: "commlog::ws", "Failed to encode message: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound traffic is only keepalive; pongs are answered by axum.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Close(_) = msg {
                tracing::debug!(target: "commlog::ws", "Client closed connection");
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::info!(target: "commlog::ws", "Event WebSocket client disconnected");
    Ok(())
}
