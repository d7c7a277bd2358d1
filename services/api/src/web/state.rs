//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every HTTP handler and WebSocket
//! connection.

use crate::config::Config;
use attendance_core::{
    AttendanceRegister, AttendanceStore, MemoryStore, NotificationChannel, SelfieRequired,
    SessionManager, SessionStore,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionManager,
    pub register: AttendanceRegister,
    /// The live feed the storage adapter publishes new records into.
    pub channel: NotificationChannel,
}

impl AppState {
    /// Wires the core services over `store`, which must publish its inserts
    /// into `channel`.
    pub fn new<S>(config: Arc<Config>, store: Arc<S>, channel: NotificationChannel) -> Self
    where
        S: SessionStore + AttendanceStore + 'static,
    {
        let sessions = SessionManager::new(store.clone());
        let mut register = AttendanceRegister::new(sessions.clone(), store);
        if config.require_selfie {
            register = register.with_classifier(Arc::new(SelfieRequired));
        }
        Self {
            config,
            sessions,
            register,
            channel,
        }
    }

    /// State backed by the in-memory store, for running without a database.
    pub fn in_memory(config: Arc<Config>) -> Self {
        let channel = NotificationChannel::with_buffer(config.notify_buffer);
        let store = Arc::new(MemoryStore::new(channel.clone()));
        Self::new(config, store, channel)
    }
}
