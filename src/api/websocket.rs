//! WebSocket handler for real-time notifications
//!
//! Pushes:
//! - `{"type":"notification","data":{...}}` for every notification stored
//!   for the connected user
//! - `{"type":"unread","count":n}` on connect and then periodically

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::extract::AuthUser;
use crate::db::Notification;
use crate::error::ApiError;
use crate::AppState;

const UNREAD_INTERVAL: Duration = Duration::from_secs(30);

/// Browsers cannot set headers on WebSocket requests, so the user id may
/// also be passed as `?user_id=`
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsFrame<'a> {
    Notification { data: &'a Notification },
    Unread { count: i64 },
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Query(params): Query<WsParams>,
) -> Response {
    let user_id = match user.map(|AuthUser(id)| id).or(params.user_id) {
        Some(id) => id,
        None => return ApiError::Unauthorized("missing x-user-id header".to_string()).into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

fn encode(frame: &WsFrame<'_>) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            error!("Failed to serialize WebSocket frame: {}", e);
            None
        }
    }
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut notifications = state.notifier.hub().subscribe(user_id);

    info!("WebSocket client connected for user {}", user_id);

    let state_clone = Arc::clone(&state);
    let mut send_task = tokio::spawn(async move {
        // first tick fires immediately, giving the client its initial count
        let mut ticker = interval(UNREAD_INTERVAL);

        loop {
            let frame = tokio::select! {
                _ = ticker.tick() => {
                    match state_clone.db.unread_notification_count(user_id).await {
                        Ok(count) => encode(&WsFrame::Unread { count }),
                        Err(e) => {
                            warn!("Unread count failed for {}: {}", user_id, e);
                            None
                        }
                    }
                }
                received = notifications.recv() => match received {
                    Ok(notification) => encode(&WsFrame::Notification { data: &notification }),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("WebSocket for {} lagged, skipped {} notification(s)", user_id, skipped);
                        None
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if let Some(message) = frame {
                if sender.send(message).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming messages (pings, close)
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!("Received WebSocket message: {}", text);
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket client requested close");
                    break;
                }
                Err(e) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("WebSocket client disconnected for user {}", user_id);
}
