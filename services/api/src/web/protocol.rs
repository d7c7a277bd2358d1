//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the teacher dashboard and the
//! API server for the live attendance view.

use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use crate::web::rest::AttendanceRecordResponse;

//=========================================================================================
// Messages Sent FROM the Client (Dashboard) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first message on the connection. A dashboard that drives
    /// rotation gets a fresh token immediately and then on every interval.
    Init {
        #[serde(default)]
        drive_rotation: bool,
    },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Dashboard)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full attendance list, in insertion order. Sent after `init` and
    /// again whenever live delivery fell behind.
    Snapshot {
        session_id: Uuid,
        records: Vec<AttendanceRecordResponse>,
    },

    /// A record stored after the last snapshot.
    AttendanceRecorded { record: AttendanceRecordResponse },

    /// The QR code must now show `token`.
    TokenRotated { session_id: Uuid, token: String },

    /// The session is no longer active. Rotation has stopped, and a passive
    /// dashboard's connection closes after this message.
    SessionEnded { session_id: Uuid },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}

/// Serializes `msg` and sends it as a text frame. Returns `false` once the
/// client is gone.
pub async fn send_message<S>(sender: &Arc<Mutex<S>>, msg: &ServerMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    sender.lock().await.send(Message::Text(json.into())).await.is_ok()
}
