use async_trait::async_trait;
use attendance_core::{
    AttendanceError, MemoryStore, NewSession, NotificationChannel, PortError, PortResult, Session,
    SessionManager, SessionStore, UniqueConstraint,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn manager() -> (SessionManager, MemoryStore) {
    let store = MemoryStore::new(NotificationChannel::new());
    (SessionManager::new(Arc::new(store.clone())), store)
}

#[tokio::test]
async fn start_session_issues_an_active_token() {
    let (sessions, _) = manager();

    let session = sessions.start_session("Ms. Rao").await.expect("start");
    assert!(session.is_active);
    assert_eq!(session.owner, "Ms. Rao");
    assert!(session.token.starts_with("PP-"));
    assert!(session.ended_at.is_none());

    let active = sessions.active_session("Ms. Rao").await.expect("lookup");
    assert_eq!(active.map(|s| s.id), Some(session.id));
}

#[tokio::test]
async fn starting_again_deactivates_the_previous_session() {
    let (sessions, _) = manager();

    let first = sessions.start_session("Ms. Rao").await.expect("first");
    let second = sessions.start_session("Ms. Rao").await.expect("second");
    assert_ne!(first.id, second.id);

    let first = sessions.session(first.id).await.expect("first again");
    assert!(!first.is_active);
    assert!(first.ended_at.is_some());

    let active = sessions.active_session("Ms. Rao").await.expect("lookup");
    assert_eq!(active.map(|s| s.id), Some(second.id));
}

#[tokio::test]
async fn owners_have_independent_active_sessions() {
    let (sessions, _) = manager();

    let rao = sessions.start_session("Ms. Rao").await.expect("rao");
    let iyer = sessions.start_session("Mr. Iyer").await.expect("iyer");

    assert!(sessions.session(rao.id).await.expect("rao").is_active);
    assert!(sessions.session(iyer.id).await.expect("iyer").is_active);
    assert_ne!(rao.token, iyer.token);
}

#[tokio::test]
async fn blank_owner_is_rejected() {
    let (sessions, _) = manager();
    let err = sessions.start_session("   ").await.unwrap_err();
    assert!(matches!(err, AttendanceError::InvalidSubmission(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_leave_exactly_one_active_session() {
    let (sessions, _) = manager();

    let handles = (0..16).map(|_| {
        let sessions = sessions.clone();
        tokio::spawn(async move { sessions.start_session("Ms. Rao").await })
    });
    let started: Vec<Session> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("join").expect("start"))
        .collect();

    let mut active = 0;
    for session in &started {
        if sessions.session(session.id).await.expect("session").is_active {
            active += 1;
        }
    }
    assert_eq!(active, 1);
}

#[tokio::test]
async fn end_session_is_idempotent() {
    let (sessions, _) = manager();
    let session = sessions.start_session("Ms. Rao").await.expect("start");

    let ended = sessions.end_session(session.id).await.expect("end");
    assert!(!ended.is_active);
    let ended_at = ended.ended_at;
    assert!(ended_at.is_some());

    let again = sessions.end_session(session.id).await.expect("end again");
    assert!(!again.is_active);
    assert_eq!(again.ended_at, ended_at);

    assert!(sessions.active_session("Ms. Rao").await.expect("lookup").is_none());
}

#[tokio::test]
async fn ending_an_unknown_session_is_not_found() {
    let (sessions, _) = manager();
    let id = Uuid::new_v4();
    assert_eq!(
        sessions.end_session(id).await.unwrap_err(),
        AttendanceError::NotFound(id)
    );
}

#[tokio::test]
async fn rotate_replaces_the_token() {
    let (sessions, _) = manager();
    let session = sessions.start_session("Ms. Rao").await.expect("start");

    let mut previous = session.token.clone();
    for _ in 0..10 {
        let token = sessions.rotate_token(session.id).await.expect("rotate");
        assert_ne!(token, previous);

        assert!(sessions
            .session_for_token(&previous)
            .await
            .expect("old lookup")
            .is_none());
        let current = sessions
            .session_for_token(&token)
            .await
            .expect("new lookup")
            .expect("token unlocks the session");
        assert_eq!(current.id, session.id);
        previous = token;
    }
}

#[tokio::test]
async fn rotate_on_ended_or_unknown_session_fails() {
    let (sessions, _) = manager();
    let session = sessions.start_session("Ms. Rao").await.expect("start");
    sessions.end_session(session.id).await.expect("end");

    assert_eq!(
        sessions.rotate_token(session.id).await.unwrap_err(),
        AttendanceError::InvalidState(session.id)
    );

    let unknown = Uuid::new_v4();
    assert_eq!(
        sessions.rotate_token(unknown).await.unwrap_err(),
        AttendanceError::NotFound(unknown)
    );
}

/// Reports a token collision for the first `collisions` activations.
struct CollidingStore {
    inner: MemoryStore,
    collisions: AtomicUsize,
}

#[async_trait]
impl SessionStore for CollidingStore {
    async fn activate_session(&self, session: NewSession) -> PortResult<Session> {
        let remaining = self.collisions.load(Ordering::SeqCst);
        if remaining > 0 {
            self.collisions.store(remaining - 1, Ordering::SeqCst);
            return Err(PortError::UniqueViolation(UniqueConstraint::ActiveToken));
        }
        self.inner.activate_session(session).await
    }

    async fn deactivate_session(&self, id: Uuid) -> PortResult<Option<Session>> {
        self.inner.deactivate_session(id).await
    }

    async fn replace_token(&self, id: Uuid, token: &str) -> PortResult<Option<Session>> {
        self.inner.replace_token(id, token).await
    }

    async fn find_session(&self, id: Uuid) -> PortResult<Option<Session>> {
        self.inner.find_session(id).await
    }

    async fn find_active_session(&self, owner: &str) -> PortResult<Option<Session>> {
        self.inner.find_active_session(owner).await
    }

    async fn find_active_by_token(&self, token: &str) -> PortResult<Option<Session>> {
        self.inner.find_active_by_token(token).await
    }
}

#[tokio::test]
async fn start_retries_after_token_collisions() {
    let store = CollidingStore {
        inner: MemoryStore::new(NotificationChannel::new()),
        collisions: AtomicUsize::new(2),
    };
    let sessions = SessionManager::new(Arc::new(store));
    let session = sessions.start_session("Ms. Rao").await.expect("start");
    assert!(session.is_active);
}

#[tokio::test]
async fn start_gives_up_after_repeated_collisions() {
    let store = CollidingStore {
        inner: MemoryStore::new(NotificationChannel::new()),
        collisions: AtomicUsize::new(usize::MAX),
    };
    let sessions = SessionManager::new(Arc::new(store));
    let err = sessions.start_session("Ms. Rao").await.unwrap_err();
    assert!(matches!(err, AttendanceError::StorageFailure(_)));
    assert!(err.is_retryable());
}

struct UnreachableStore;

#[async_trait]
impl SessionStore for UnreachableStore {
    async fn activate_session(&self, _: NewSession) -> PortResult<Session> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn deactivate_session(&self, _: Uuid) -> PortResult<Option<Session>> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn replace_token(&self, _: Uuid, _: &str) -> PortResult<Option<Session>> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn find_session(&self, _: Uuid) -> PortResult<Option<Session>> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn find_active_session(&self, _: &str) -> PortResult<Option<Session>> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }

    async fn find_active_by_token(&self, _: &str) -> PortResult<Option<Session>> {
        Err(PortError::Unexpected("connection refused".to_string()))
    }
}

#[tokio::test]
async fn storage_outage_is_a_retryable_failure() {
    let sessions = SessionManager::new(Arc::new(UnreachableStore));

    for err in [
        sessions.start_session("Ms. Rao").await.unwrap_err(),
        sessions.end_session(Uuid::new_v4()).await.unwrap_err(),
        sessions.rotate_token(Uuid::new_v4()).await.unwrap_err(),
    ] {
        assert!(matches!(err, AttendanceError::StorageFailure(_)), "{:?}", err);
        assert!(err.is_retryable());
    }
}
