//! services/api/src/adapters/feed.rs
//!
//! Relays PostgreSQL `NOTIFY` events for new attendance rows into the in-process
//! `NotificationChannel`. The insert transaction emits the event itself, so
//! events arrive in commit order, which is insertion order.

use crate::adapters::db::DbAdapter;
use attendance_core::{AttendanceRecord, NotificationChannel};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The `LISTEN/NOTIFY` channel attendance inserts are announced on.
pub const ATTENDANCE_CHANNEL: &str = "attendance_inserted";

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// The JSON payload of an insert notification. It carries only the row's key:
/// `NOTIFY` payloads are capped at 8000 bytes, so the relay re-reads the row.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertNotice {
    pub id: Uuid,
    pub session_id: Uuid,
    pub seq: i64,
}

impl From<&AttendanceRecord> for InsertNotice {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            id: record.id,
            session_id: record.session_id,
            seq: record.seq,
        }
    }
}

/// Listens for insert notifications until cancelled and publishes each record.
///
/// Notifications sent while the listener connection is down are lost; live
/// subscribers recover them with a full re-fetch.
pub async fn relay_inserts(
    pool: PgPool,
    channel: NotificationChannel,
    cancellation_token: CancellationToken,
) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(&pool).await?;
    let db = DbAdapter::new(pool);
    listener.listen(ATTENDANCE_CHANNEL).await?;
    info!("Listening for attendance inserts on '{}'", ATTENDANCE_CHANNEL);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Attendance insert relay stopped.");
                return Ok(());
            }
            received = listener.recv() => match received {
                Ok(notification) => {
                    match serde_json::from_str::<InsertNotice>(notification.payload()) {
                        Ok(notice) => publish_inserted(&db, &channel, notice).await,
                        Err(e) => warn!("Malformed insert notification: {}", e),
                    }
                }
                Err(e) => {
                    error!("Attendance insert listener failed: {}", e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}

/// Notifications are handled one at a time, so records are published in the
/// order their inserts committed.
async fn publish_inserted(db: &DbAdapter, channel: &NotificationChannel, notice: InsertNotice) {
    match db.find_attendance_by_id(notice.id).await {
        Ok(Some(record)) => {
            channel.publish(&record);
        }
        Ok(None) => warn!(
            "Attendance {} (seq {}) of session {} vanished before it was relayed.",
            notice.id, notice.seq, notice.session_id
        ),
        Err(e) => error!("Failed to load attendance {} for relay: {}", notice.id, e),
    }
}
