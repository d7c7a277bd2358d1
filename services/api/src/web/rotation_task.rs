//! services/api/src/web/rotation_task.rs
//!
//! The dashboard-driven rotation loop. A dashboard connection that asks to drive
//! rotation runs one of these; the Session Manager never rotates on its own.

use crate::web::protocol::{send_message, ServerMessage};
use attendance_core::{AttendanceError, SessionManager};
use axum::extract::ws::Message;
use futures::Sink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Why a rotation loop stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum RotationOutcome {
    Cancelled,
    SessionEnded,
    ClientGone,
    Failed,
}

/// Rotates the token right away, so a reloaded dashboard never shows a stale
/// code, then once per `interval` until cancelled or the session ends.
pub async fn rotation_process<S>(
    sessions: SessionManager,
    session_id: Uuid,
    interval: Duration,
    ws_sender: Arc<Mutex<S>>,
    cancellation_token: CancellationToken,
) -> RotationOutcome
where
    S: Sink<Message> + Unpin,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Rotation started for session {} every {:?}", session_id, interval);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Rotation for session {} cancelled.", session_id);
                return RotationOutcome::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        match sessions.rotate_token(session_id).await {
            Ok(token) => {
                let msg = ServerMessage::TokenRotated { session_id, token };
                if !send_message(&ws_sender, &msg).await {
                    return RotationOutcome::ClientGone;
                }
            }
            Err(AttendanceError::InvalidState(_) | AttendanceError::NotFound(_)) => {
                info!("Session {} is no longer active, rotation stopped.", session_id);
                send_message(&ws_sender, &ServerMessage::SessionEnded { session_id }).await;
                return RotationOutcome::SessionEnded;
            }
            // The current token stays valid; try again on the next tick.
            Err(e) if e.is_retryable() => {
                warn!("Rotation for session {} failed, will retry: {}", session_id, e);
            }
            Err(e) => {
                error!("Rotation for session {} failed: {}", session_id, e);
                let msg = ServerMessage::Error {
                    message: "Token rotation failed.".to_string(),
                };
                send_message(&ws_sender, &msg).await;
                return RotationOutcome::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendance_core::{MemoryStore, NotificationChannel};
    use futures::channel::mpsc;
    use futures::StreamExt;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemoryStore::new(NotificationChannel::new())))
    }

    fn decode(msg: Message) -> serde_json::Value {
        match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).expect("json"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn rotates_immediately_on_start() {
        let sessions = manager();
        let session = sessions.start_session("Ms. Rao").await.expect("start");
        let (tx, mut rx) = mpsc::unbounded::<Message>();
        let token = CancellationToken::new();

        let task = tokio::spawn(rotation_process(
            sessions.clone(),
            session.id,
            Duration::from_secs(3600),
            Arc::new(Mutex::new(tx)),
            token.clone(),
        ));

        let first = decode(rx.next().await.expect("first rotation"));
        assert_eq!(first["type"], "token_rotated");
        assert_ne!(first["token"], session.token.as_str());
        let current = sessions.session(session.id).await.expect("session");
        assert_eq!(first["token"], current.token.as_str());

        token.cancel();
        assert_eq!(task.await.expect("join"), RotationOutcome::Cancelled);
    }

    #[tokio::test]
    async fn stops_when_the_session_ends() {
        let sessions = manager();
        let session = sessions.start_session("Ms. Rao").await.expect("start");
        let (tx, mut rx) = mpsc::unbounded::<Message>();

        let task = tokio::spawn(rotation_process(
            sessions.clone(),
            session.id,
            Duration::from_millis(20),
            Arc::new(Mutex::new(tx)),
            CancellationToken::new(),
        ));
        rx.next().await.expect("first rotation");

        sessions.end_session(session.id).await.expect("end");
        assert_eq!(task.await.expect("join"), RotationOutcome::SessionEnded);

        let mut last = None;
        while let Ok(Some(msg)) = rx.try_next() {
            last = Some(decode(msg));
        }
        assert_eq!(last.expect("final message")["type"], "session_ended");
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let sessions = manager();
        let session = sessions.start_session("Ms. Rao").await.expect("start");
        let (tx, mut rx) = mpsc::unbounded::<Message>();
        let token = CancellationToken::new();

        let task = tokio::spawn(rotation_process(
            sessions.clone(),
            session.id,
            Duration::from_secs(3600),
            Arc::new(Mutex::new(tx)),
            token.clone(),
        ));
        rx.next().await.expect("first rotation");
        token.cancel();

        assert_eq!(task.await.expect("join"), RotationOutcome::Cancelled);
        assert!(sessions.session(session.id).await.expect("session").is_active);
    }

    #[tokio::test]
    async fn a_disconnected_client_stops_the_loop() {
        let sessions = manager();
        let session = sessions.start_session("Ms. Rao").await.expect("start");
        let (tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);

        let outcome = rotation_process(
            sessions,
            session.id,
            Duration::from_millis(20),
            Arc::new(Mutex::new(tx)),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome, RotationOutcome::ClientGone);
    }
}
