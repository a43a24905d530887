//! Live job event stream over WebSocket.
//!
//! A socket observes exactly one job. It gets the timeline snapshot first,
//! then every log and timeline event until either side goes away.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::time::interval;
use tracing::{debug, info, warn};

use reel_models::{JobId, WsMessage};

use crate::metrics;
use crate::state::AppState;

const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

type WsSender = SplitSink<WebSocket, Message>;

/// GET /ws/:job_id
pub async fn ws_job(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    metrics::record_ws_connection();
    ws.on_upgrade(move |socket| handle_job_socket(socket, state, JobId::from_string(job_id)))
}

async fn send_json(sender: &mut WsSender, msg: &WsMessage) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize ws message: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(json)).await?;
    metrics::record_ws_message_sent(msg.message_type().as_str());
    Ok(())
}

async fn handle_job_socket(socket: WebSocket, state: AppState, job_id: JobId) {
    let (mut sender, mut receiver) = socket.split();

    let (observer_id, mut events) = match state.engine.subscribe_channel(&job_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            debug!(job_id = %job_id, "Rejecting ws subscription: {}", e);
            let _ = send_json(&mut sender, &WsMessage::error(e.to_string())).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!(job_id = %job_id, observer = %observer_id, "WebSocket observer connected");

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(msg) => {
                        if send_json(&mut sender, &msg).await.is_err() {
                            return;
                        }
                    }
                    // dropped by the hub
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        return;
                    }
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.engine.unsubscribe(&job_id, observer_id).await;
    info!(job_id = %job_id, observer = %observer_id, "WebSocket observer disconnected");
}
