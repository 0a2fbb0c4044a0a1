use chat_server::AppState;
use chatload_core::shutdown::Shutdown;
use chatload_core::{Config, Connector, Orchestrator, Outcome, StatisticsCalculator, WsConnector};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(chat_server::serve(listener, AppState::default()));
    addr
}

async fn round_trip(addr: SocketAddr, room: u32, frame: &str) -> serde_json::Value {
    let (mut ws, _) = connect_async(format!("ws://{addr}/chat/{room}"))
        .await
        .expect("connect");
    ws.send(Message::text(frame.to_owned())).await.expect("send");
    let reply = loop {
        match ws.next().await.expect("reply").expect("frame") {
            Message::Text(text) => break text.as_str().to_owned(),
            _ => continue,
        }
    };
    let _ = ws.close(None).await;
    serde_json::from_str(&reply).expect("reply is json")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_load_run_against_reference_server() {
    let addr = start_server().await;

    let mut config = Config::default();
    config.target.base_url = format!("ws://{addr}/chat/");
    config.target.ack_timeout_ms = 2_000;
    config.load.total_messages = 300;
    config.load.queue_capacity = 32;
    config.load.rooms = 5;
    config.load.seed = Some(99);
    config.warmup.threads = 4;
    config.warmup.messages_per_thread = 25;
    config.main_phase.threads = 8;
    config.worker.poll_timeout_ms = 200;

    let connector = Arc::new(WsConnector::new(config.target.base_url.clone()));
    let report = tokio::time::timeout(
        Duration::from_secs(30),
        Orchestrator::new(config, connector, Shutdown::never()).run(),
    )
    .await
    .expect("run finishes");

    assert_eq!(report.warmup.counters.succeeded, 100);
    assert_eq!(report.main.as_ref().map(|m| m.counters.succeeded), Some(200));

    let overall = report.overall.counters;
    assert_eq!(overall.succeeded, 300);
    assert_eq!(overall.failed, 0);
    assert_eq!(overall.connections, 12);
    assert_eq!(report.records.len(), 300);
    assert_eq!(report.records.count(Outcome::Ok), 300);

    let stats = StatisticsCalculator::new(&report.records).report();
    assert_eq!(stats.records, 300);
    assert_eq!(stats.rooms.len(), 5);
    assert!(stats.latency.p50_ms <= stats.latency.p99_ms);
    assert!(!stats.buckets.is_empty());
}

#[tokio::test]
async fn test_generated_messages_are_accepted() {
    let addr = start_server().await;
    let mut generator = chatload_core::MessageGenerator::new(3, chatload_core::ContentPool::new(4), Some(5));

    for _ in 0..20 {
        let item = generator.next_item().unwrap();
        let reply = round_trip(addr, item.room_id, &item.payload).await;
        assert_eq!(reply["status"], "OK", "rejected {}: {}", item.payload, reply);
        assert_eq!(reply["originalMessage"]["username"], item.username.as_str());
    }
}

#[tokio::test]
async fn test_error_replies() {
    let addr = start_server().await;

    let reply = round_trip(addr, 1, "{broken").await;
    assert_eq!(reply["status"], "ERROR");
    assert_eq!(reply["error"], "Invalid JSON format");

    let reply = round_trip(
        addr,
        1,
        r#"{"userId":"0","username":"user0","message":"hi","timestamp":"2025-01-01T00:00:00Z","messageType":"TEXT"}"#,
    )
    .await;
    assert_eq!(reply["status"], "ERROR");
    assert_eq!(reply["error"], "userId must be between 1 and 100000");
}

#[tokio::test]
async fn test_health_counts_open_sessions() {
    let addr = start_server().await;
    let connector = WsConnector::new(format!("ws://{addr}/chat/"));
    let _a = connector.open(1).await.expect("open room 1");
    let _b = connector.open(2).await.expect("open room 2");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let health: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("health request")
        .json()
        .await
        .expect("health json");

    assert_eq!(health["status"], "UP");
    assert_eq!(health["connections"], 2);
    assert_eq!(health["rooms"], 2);
}
