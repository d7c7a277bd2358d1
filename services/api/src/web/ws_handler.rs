//! services/api/src/web/ws_handler.rs
//!
//! This is the entry point and control loop for a dashboard's live attendance
//! WebSocket. It pushes new records as they are stored and, when asked, drives
//! token rotation for the session.

use crate::{
    error::ErrorResponse,
    web::{
        protocol::{send_message, ClientMessage, ServerMessage},
        rest::AttendanceRecordResponse,
        rotation_task::rotation_process,
        state::AppState,
    },
};
use attendance_core::Notification;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::SplitSink, StreamExt};
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Upgrades to a WebSocket for a known session.
pub async fn live_attendance_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, ErrorResponse> {
    app_state.sessions.session(session_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, session_id)))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, session_id: Uuid) {
    info!("Live attendance connection opened for session {}", session_id);

    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    // --- 1. Initialization Phase ---
    let drive_rotation = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => {
            match serde_json::from_str::<ClientMessage>(init_json.as_str()) {
                Ok(ClientMessage::Init { drive_rotation }) => drive_rotation,
                Err(e) => {
                    warn!("First message was not a valid Init message: {}", e);
                    let msg = ServerMessage::Error {
                        message: "Expected an init message.".to_string(),
                    };
                    send_message(&ws_sender, &msg).await;
                    return;
                }
            }
        }
        _ => {
            info!("Client disconnected before sending Init message.");
            return;
        }
    };

    // Subscribe before reading the snapshot so nothing stored in between is lost;
    // anything delivered twice is dropped by `seq`.
    let mut subscription = app_state.channel.subscribe(session_id);
    let Some(mut last_seq) = send_snapshot(&app_state, session_id, &ws_sender).await else {
        return;
    };

    let cancellation_token = CancellationToken::new();
    let rotation_handle: Option<JoinHandle<()>> = drive_rotation.then(|| {
        let sessions = app_state.sessions.clone();
        let interval = app_state.config.rotation_interval;
        let ws_sender = ws_sender.clone();
        let token = cancellation_token.clone();
        tokio::spawn(async move {
            let outcome = rotation_process(sessions, session_id, interval, ws_sender, token).await;
            info!("Rotation for session {} finished: {:?}", session_id, outcome);
        })
    });

    // A dashboard that drives rotation learns about the end from the rotation
    // task; any other one polls the session on the same cadence.
    let mut session_watch = tokio::time::interval(app_state.config.rotation_interval);
    session_watch.set_missed_tick_behavior(MissedTickBehavior::Delay);
    session_watch.reset();

    // --- 2. Main Loop ---
    loop {
        tokio::select! {
            _ = session_watch.tick(), if !drive_rotation => {
                match app_state.sessions.session(session_id).await {
                    Ok(session) if session.is_active => {}
                    Ok(_) => {
                        info!("Session {} ended, closing live feed.", session_id);
                        send_message(&ws_sender, &ServerMessage::SessionEnded { session_id }).await;
                        break;
                    }
                    Err(e) => warn!("Failed to check session {}: {}", session_id, e),
                }
            }
            notification = subscription.next() => match notification {
                Some(Notification::Record(record)) => {
                    if record.seq <= last_seq {
                        continue;
                    }
                    last_seq = record.seq;
                    let msg = ServerMessage::AttendanceRecorded {
                        record: AttendanceRecordResponse::from(record),
                    };
                    if !send_message(&ws_sender, &msg).await {
                        break;
                    }
                }
                Some(Notification::Missed(missed)) => {
                    warn!(
                        "Live feed for session {} fell behind by {}, re-sending snapshot",
                        session_id, missed
                    );
                    match send_snapshot(&app_state, session_id, &ws_sender).await {
                        Some(seq) => last_seq = last_seq.max(seq),
                        None => break,
                    }
                }
                None => {
                    error!("Live feed for session {} closed.", session_id);
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::Init { .. }) => {
                            warn!("Received subsequent Init message, which is ignored.");
                        }
                        Err(e) => warn!("Failed to deserialize client message: {}", e),
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
        }
    }

    // --- 3. Cleanup ---
    cancellation_token.cancel();
    if let Some(handle) = rotation_handle {
        handle.abort();
    }
    info!("Live attendance connection closed for session {}", session_id);
}

/// Sends the full list and returns the highest `seq` in it, or `None` when the
/// connection should close.
async fn send_snapshot(
    app_state: &AppState,
    session_id: Uuid,
    ws_sender: &WsSender,
) -> Option<i64> {
    match app_state.register.records(session_id).await {
        Ok(records) => {
            let last_seq = records.last().map(|record| record.seq).unwrap_or(0);
            let msg = ServerMessage::Snapshot {
                session_id,
                records: records.into_iter().map(AttendanceRecordResponse::from).collect(),
            };
            send_message(ws_sender, &msg).await.then_some(last_seq)
        }
        Err(e) => {
            error!("Failed to load attendance for session {}: {}", session_id, e);
            let msg = ServerMessage::Error {
                message: "Failed to load attendance.".to_string(),
            };
            send_message(ws_sender, &msg).await;
            None
        }
    }
}
