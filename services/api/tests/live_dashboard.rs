use attendance_api::config::Config;
use attendance_api::web::{build_router, AppState};
use attendance_core::Submission;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(config: Config) -> (SocketAddr, Arc<AppState>) {
    let state = Arc::new(AppState::in_memory(Arc::new(config)));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(state.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });
    (addr, state)
}

async fn connect(addr: SocketAddr, session_id: Uuid, drive_rotation: bool) -> Client {
    let url = format!("ws://{}/sessions/{}/live", addr, session_id);
    let (mut ws, _) = connect_async(url).await.expect("connect");
    let init = json!({ "type": "init", "drive_rotation": drive_rotation });
    ws.send(Message::Text(init.to_string())).await.expect("init");
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no message within 5s")
            .expect("connection closed")
            .expect("websocket error");
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().expect("text")).expect("json");
        }
    }
}

fn rolls_and_seqs(records: &Value) -> Vec<(String, i64)> {
    records
        .as_array()
        .expect("records")
        .iter()
        .map(|r| {
            (
                r["roll_number"].as_str().expect("roll").to_string(),
                r["seq"].as_i64().expect("seq"),
            )
        })
        .collect()
}

#[tokio::test]
async fn snapshot_comes_first_then_new_records_in_order() {
    let (addr, state) = serve(Config::default()).await;
    let session = state.sessions.start_session("Ms. Rao").await.expect("start");
    for roll in ["CS2024001", "CS2024002"] {
        state
            .register
            .submit(Submission::new(&session.token, "Early Bird", roll))
            .await
            .expect("submit");
    }

    let mut ws = connect(addr, session.id, false).await;
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["session_id"], session.id.to_string());
    let before = rolls_and_seqs(&snapshot["records"]);
    assert_eq!(
        before.iter().map(|(roll, _)| roll.as_str()).collect::<Vec<_>>(),
        vec!["CS2024001", "CS2024002"]
    );

    for roll in ["CS2024003", "CS2024004", "CS2024005"] {
        state
            .register
            .submit(Submission::new(&session.token, "On Time", roll))
            .await
            .expect("submit");
    }
    // Rejected submissions produce nothing on the feed.
    state
        .register
        .submit(Submission::new(&session.token, "On Time", "CS2024003"))
        .await
        .unwrap_err();

    let mut last_seq = before.last().map(|(_, seq)| *seq).expect("seq");
    let mut live = Vec::new();
    for _ in 0..3 {
        let msg = next_json(&mut ws).await;
        assert_eq!(msg["type"], "attendance_recorded");
        let seq = msg["record"]["seq"].as_i64().expect("seq");
        assert!(seq > last_seq, "{} after {}", seq, last_seq);
        last_seq = seq;
        live.push(msg["record"]["roll_number"].as_str().expect("roll").to_string());
    }
    assert_eq!(live, vec!["CS2024003", "CS2024004", "CS2024005"]);
    assert!(timeout(Duration::from_millis(200), ws.next()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn records_stored_while_connecting_arrive_exactly_once() {
    let (addr, state) = serve(Config::default()).await;
    let session = state.sessions.start_session("Ms. Rao").await.expect("start");

    let register = state.register.clone();
    let token = session.token.clone();
    let writer = tokio::spawn(async move {
        for i in 0..30 {
            register
                .submit(Submission::new(&token, format!("Student {}", i), format!("R{:02}", i)))
                .await
                .expect("submit");
            sleep(Duration::from_millis(2)).await;
        }
    });

    let mut ws = connect(addr, session.id, false).await;
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");

    let mut seen: Vec<(String, i64)> = rolls_and_seqs(&snapshot["records"]);
    while seen.len() < 30 {
        let msg = next_json(&mut ws).await;
        match msg["type"].as_str() {
            Some("attendance_recorded") => seen.push((
                msg["record"]["roll_number"].as_str().expect("roll").to_string(),
                msg["record"]["seq"].as_i64().expect("seq"),
            )),
            Some("snapshot") => seen = rolls_and_seqs(&msg["records"]),
            other => panic!("unexpected message: {:?}", other),
        }
    }
    writer.await.expect("writer");

    assert!(seen.windows(2).all(|pair| pair[0].1 < pair[1].1), "{:?}", seen);
    let distinct: HashSet<&str> = seen.iter().map(|(roll, _)| roll.as_str()).collect();
    assert_eq!(distinct.len(), 30);
    assert!(timeout(Duration::from_millis(200), ws.next()).await.is_err());
}

#[tokio::test]
async fn driving_dashboard_rotates_right_away() {
    let (addr, state) = serve(Config::default()).await;
    let session = state.sessions.start_session("Ms. Rao").await.expect("start");

    let mut ws = connect(addr, session.id, true).await;
    let mut rotated = None;
    for _ in 0..2 {
        let msg = next_json(&mut ws).await;
        if msg["type"] == "token_rotated" {
            rotated = Some(msg);
            break;
        }
        assert_eq!(msg["type"], "snapshot");
    }
    let rotated = rotated.expect("token_rotated");
    let token = rotated["token"].as_str().expect("token");
    assert_ne!(token, session.token);
    assert_eq!(
        state.sessions.session(session.id).await.expect("session").token,
        token
    );

    let stale = state
        .register
        .submit(Submission::new(&session.token, "Priya Sharma", "CS2024001"))
        .await;
    assert!(stale.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rotation_stops_when_the_dashboard_disconnects() {
    let (addr, state) = serve(Config {
        rotation_interval: Duration::from_millis(50),
        ..Config::default()
    })
    .await;
    let session = state.sessions.start_session("Ms. Rao").await.expect("start");

    let mut ws = connect(addr, session.id, true).await;
    let mut rotations = 0;
    while rotations < 2 {
        if next_json(&mut ws).await["type"] == "token_rotated" {
            rotations += 1;
        }
    }
    ws.close(None).await.expect("close");
    sleep(Duration::from_millis(200)).await;

    let settled = state.sessions.session(session.id).await.expect("session").token;
    sleep(Duration::from_millis(300)).await;
    let later = state.sessions.session(session.id).await.expect("session").token;
    assert_eq!(settled, later);
}

#[tokio::test]
async fn passive_dashboard_is_told_when_the_session_ends() {
    let (addr, state) = serve(Config {
        rotation_interval: Duration::from_millis(50),
        ..Config::default()
    })
    .await;
    let session = state.sessions.start_session("Ms. Rao").await.expect("start");

    let mut ws = connect(addr, session.id, false).await;
    assert_eq!(next_json(&mut ws).await["type"], "snapshot");

    state.sessions.end_session(session.id).await.expect("end");
    let ended = next_json(&mut ws).await;
    assert_eq!(ended["type"], "session_ended");
    assert_eq!(ended["session_id"], session.id.to_string());
}

#[tokio::test]
async fn unknown_session_is_refused_before_upgrade() {
    let (addr, _) = serve(Config::default()).await;
    let url = format!("ws://{}/sessions/{}/live", addr, Uuid::new_v4());
    match connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 404)
        }
        other => panic!("expected a 404, got {:?}", other.map(|(_, r)| r.status())),
    }
}
