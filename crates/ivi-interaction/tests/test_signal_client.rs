use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{SinkExt, StreamExt};
use ivi_core::config::SignalConfig;
use ivi_core::signal::{ConnectionState, SignalRecord, SignalValue};
use ivi_core::{IviError, Result};
use ivi_interaction::{SignalClient, SignalConnector, SignalHandler, SignalTransport};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Update(String, SignalRecord),
    Connection(ConnectionState),
    Error(String),
}

struct RecordingHandler {
    events: mpsc::UnboundedSender<Event>,
}

impl SignalHandler for RecordingHandler {
    fn on_update(&self, path: &str, record: SignalRecord) {
        let _ = self.events.send(Event::Update(path.to_string(), record));
    }

    fn on_connection_change(&self, state: ConnectionState) {
        let _ = self.events.send(Event::Connection(state));
    }

    fn on_error(&self, message: &str) {
        let _ = self.events.send(Event::Error(message.to_string()));
    }
}

/// Server side of one accepted in-memory connection.
struct ServerEnd {
    from_client: fmpsc::UnboundedReceiver<String>,
    to_client: fmpsc::UnboundedSender<Result<String>>,
}

impl ServerEnd {
    async fn recv_json(&mut self) -> Value {
        let frame = self.from_client.next().await.expect("client frame");
        serde_json::from_str(&frame).expect("client frame is JSON")
    }

    fn push(&self, frame: &str) {
        self.to_client
            .unbounded_send(Ok(frame.to_string()))
            .expect("client still reading");
    }
}

/// Hands every accepted connection to the test. Refuses the first
/// `refusals` attempts.
struct MockConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    attempts: AtomicUsize,
    refusals: usize,
}

#[async_trait]
impl SignalConnector for MockConnector {
    async fn open(&self, _url: &str) -> Result<SignalTransport> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.refusals {
            return Err(IviError::transport("connection refused"));
        }
        let (client_tx, from_client) = fmpsc::unbounded::<String>();
        let (to_client, client_rx) = fmpsc::unbounded::<Result<String>>();
        let _ = self.accepted.send(ServerEnd {
            from_client,
            to_client,
        });
        let sink = client_tx.sink_map_err(|err| IviError::transport(err.to_string()));
        Ok(SignalTransport::new(Box::pin(sink), Box::pin(client_rx)))
    }
}

struct Harness {
    client: SignalClient,
    connector: Arc<MockConnector>,
    events: mpsc::UnboundedReceiver<Event>,
    accepted: mpsc::UnboundedReceiver<ServerEnd>,
}

fn harness(refusals: usize) -> Harness {
    let config = SignalConfig {
        url: "ws://test".to_string(),
        initial_backoff_ms: 1_000,
        max_backoff_ms: 4_000,
    };
    let (events_tx, events) = mpsc::unbounded_channel();
    let (accepted_tx, accepted) = mpsc::unbounded_channel();
    let connector = Arc::new(MockConnector {
        accepted: accepted_tx,
        attempts: AtomicUsize::new(0),
        refusals,
    });
    let handler = Arc::new(RecordingHandler { events: events_tx });
    let client = SignalClient::new(&config, connector.clone(), handler);
    Harness {
        client,
        connector,
        events,
        accepted,
    }
}

async fn next_connection_event(events: &mut mpsc::UnboundedReceiver<Event>) -> ConnectionState {
    loop {
        match events.recv().await.expect("handler alive") {
            Event::Connection(state) => return state,
            _ => continue,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reconnect_resubscribes_after_backoff() {
    let mut h = harness(0);
    h.client.connect();
    assert_eq!(next_connection_event(&mut h.events).await, ConnectionState::Connecting);

    let mut server = h.accepted.recv().await.unwrap();
    assert_eq!(next_connection_event(&mut h.events).await, ConnectionState::Connected);

    h.client.subscribe(["Vehicle.Speed", "Vehicle.TraveledDistance"]);
    let first = server.recv_json().await;
    let second = server.recv_json().await;
    assert_eq!(first["action"], "subscribe");
    assert_eq!(first["path"], "Vehicle.Speed");
    assert_eq!(second["path"], "Vehicle.TraveledDistance");

    server.push(r#"{"action":"subscribe","subscriptionId":"s1"}"#);
    server.push(r#"{"action":"subscribe","subscriptionId":"s2"}"#);

    // Server drops the connection.
    let dropped_at = Instant::now();
    drop(server);
    assert_eq!(next_connection_event(&mut h.events).await, ConnectionState::Connecting);

    let mut server = h.accepted.recv().await.unwrap();
    assert!(dropped_at.elapsed() >= Duration::from_millis(1_000));
    assert_eq!(next_connection_event(&mut h.events).await, ConnectionState::Connected);

    let mut paths = vec![
        server.recv_json().await["path"].as_str().unwrap().to_string(),
        server.recv_json().await["path"].as_str().unwrap().to_string(),
    ];
    paths.sort();
    assert_eq!(paths, vec!["Vehicle.Speed", "Vehicle.TraveledDistance"]);
    assert!(
        h.client
            .subscriptions()
            .iter()
            .all(|s| s.subscription_id.is_none())
    );
    assert_eq!(h.client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_refused_connections_back_off_exponentially() {
    let mut h = harness(3);
    let started = Instant::now();
    h.client.connect();

    let _server = h.accepted.recv().await.unwrap();
    // 1s + 2s + 4s between the refused attempts.
    assert!(started.elapsed() >= Duration::from_millis(7_000));
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 4);

    let mut errors = 0;
    loop {
        match h.events.recv().await.unwrap() {
            Event::Error(_) => errors += 1,
            Event::Connection(ConnectionState::Connected) => break,
            _ => {}
        }
    }
    assert_eq!(errors, 3);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_resets_after_successful_connect() {
    // Two refusals grow the delay to 4s; the connect that follows resets it.
    let mut h = harness(2);
    h.client.subscribe(["Vehicle.Speed", "Vehicle.TraveledDistance"]);
    h.client.connect();

    let server = h.accepted.recv().await.unwrap();
    loop {
        if h.events.recv().await.unwrap() == Event::Connection(ConnectionState::Connected) {
            break;
        }
    }

    let dropped_at = Instant::now();
    drop(server);
    let mut server = h.accepted.recv().await.unwrap();
    let waited = dropped_at.elapsed();
    assert!(waited >= Duration::from_millis(1_000));
    assert!(waited < Duration::from_millis(1_500), "waited {waited:?}");

    let mut paths = vec![
        server.recv_json().await["path"].as_str().unwrap().to_string(),
        server.recv_json().await["path"].as_str().unwrap().to_string(),
    ];
    paths.sort();
    assert_eq!(paths, vec!["Vehicle.Speed", "Vehicle.TraveledDistance"]);
}

#[tokio::test(start_paused = true)]
async fn test_push_update_reaches_handler() {
    let mut h = harness(0);
    h.client.subscribe(["Vehicle.Speed"]);
    h.client.connect();
    let mut server = h.accepted.recv().await.unwrap();
    assert_eq!(server.recv_json().await["path"], "Vehicle.Speed");

    server.push(r#"{"action":"subscribe","subscriptionId":"s1"}"#);
    server.push(
        r#"{"action":"subscription","subscriptionId":"s1","data":{"path":"Vehicle.Speed","dp":{"value":"95","ts":"2025-01-01T00:00:00Z"}}}"#,
    );

    loop {
        if let Event::Update(path, record) = h.events.recv().await.unwrap() {
            assert_eq!(path, "Vehicle.Speed");
            assert_eq!(record.value, SignalValue::Number(95.0));
            assert_eq!(record.timestamp, "2025-01-01T00:00:00Z");
            break;
        }
    }
    assert_eq!(
        h.client.subscriptions()[0].subscription_id.as_deref(),
        Some("s1")
    );
}

#[tokio::test]
async fn test_set_while_disconnected_fails_without_sending() {
    let mut h = harness(0);
    let result = h.client.set("Vehicle.Body.Horn.IsActive", true);

    assert!(result.unwrap_err().is_not_connected());
    assert!(matches!(h.events.try_recv(), Ok(Event::Error(_))));
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_get_round_trip_and_server_error() {
    let mut h = harness(0);
    h.client.connect();
    let mut server = h.accepted.recv().await.unwrap();

    let client = &h.client;
    let (record, _) = tokio::join!(client.get("Vehicle.Speed"), async {
        let request = server.recv_json().await;
        assert_eq!(request["action"], "get");
        server.push(&format!(
            r#"{{"action":"get","requestId":"{}","data":{{"path":"Vehicle.Speed","dp":{{"value":"42"}}}}}}"#,
            request["requestId"].as_str().unwrap()
        ));
    });
    assert_eq!(record.unwrap().value, SignalValue::Number(42.0));

    let (result, _) = tokio::join!(client.get("Vehicle.Nope"), async {
        let request = server.recv_json().await;
        server.push(&format!(
            r#"{{"action":"get","requestId":"{}","error":{{"number":404,"reason":"invalid_path","message":"The specified data path does not exist."}}}}"#,
            request["requestId"].as_str().unwrap()
        ));
    });
    assert!(result.unwrap_err().is_protocol());
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_get() {
    let mut h = harness(0);
    h.client.connect();
    let mut server = h.accepted.recv().await.unwrap();

    let client = &h.client;
    let (result, _) = tokio::join!(client.get("Vehicle.Speed"), async {
        assert_eq!(server.recv_json().await["action"], "get");
        client.disconnect();
    });
    assert!(result.unwrap_err().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_reconnecting() {
    let mut h = harness(0);
    h.client.subscribe(["Vehicle.Speed"]);
    h.client.connect();
    let _server = h.accepted.recv().await.unwrap();
    assert_eq!(next_connection_event(&mut h.events).await, ConnectionState::Connecting);
    assert_eq!(next_connection_event(&mut h.events).await, ConnectionState::Connected);

    h.client.disconnect();
    assert_eq!(next_connection_event(&mut h.events).await, ConnectionState::Disconnected);
    assert!(h.client.subscriptions().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.accepted.try_recv().is_err());
    assert_eq!(h.connector.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}
