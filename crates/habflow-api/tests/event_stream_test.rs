#![allow(clippy::unwrap_used)]
// Integration tests for the reconnecting `EventStream` using wiremock.

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use secrecy::SecretString;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use habflow_api::{
    ConnectionConfig, EventKind, EventStream, StreamSignal, StreamState, StreamTuning, TopicScope,
    TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn tuning(reconnect_ms: u64, retry_ms: u64) -> StreamTuning {
    StreamTuning {
        jitter_min: Duration::ZERO,
        jitter_max: Duration::ZERO,
        reconnect_delay: Duration::from_millis(reconnect_ms),
        retry_interval: Duration::from_millis(retry_ms),
    }
}

fn stream_for(server: &MockServer, tuning: StreamTuning) -> EventStream {
    EventStream::with_client(
        reqwest::Client::new(),
        format!("{}/rest/events?topics=openhab/items", server.uri()),
        "openhab/items/".into(),
        tuning,
    )
}

async fn next_signal(rx: &mut mpsc::Receiver<StreamSignal>) -> StreamSignal {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a stream signal")
        .expect("signal channel closed")
}

fn sse_frame(topic: &str, kind: &str, payload: &serde_json::Value) -> String {
    let data = json!({
        "topic": topic,
        "type": kind,
        "payload": payload.to_string(),
    });
    format!("event: message\ndata: {data}\n\n")
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_events_are_decoded_and_forwarded() {
    let server = MockServer::start().await;

    let mut body = sse_frame(
        "openhab/items/Kitchen_Light/statechanged",
        "ItemStateChangedEvent",
        &json!({ "type": "OnOff", "value": "ON", "oldType": "OnOff", "oldValue": "OFF" }),
    );
    body.push_str("data: this is not json\n\n");
    body.push_str(&sse_frame(
        "openhab/items/Temp/state",
        "ItemStateEvent",
        &json!({ "type": "Decimal", "value": "21.5" }),
    ));

    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .and(header("accept", "text/event-stream"))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let (handle, mut rx) = stream_for(&server, tuning(60_000, 60_000)).spawn(cancel.clone());

    assert!(matches!(next_signal(&mut rx).await, StreamSignal::Opened));

    let StreamSignal::Event(first) = next_signal(&mut rx).await else {
        panic!("expected an event");
    };
    assert_eq!(first.item_name.as_deref(), Some("Kitchen_Light"));
    assert_eq!(first.kind, EventKind::ItemStateChangedEvent);
    assert_eq!(first.value(), Some("ON"));
    assert_eq!(first.old_value(), Some("OFF"));

    // The malformed frame in between is dropped.
    let StreamSignal::Event(second) = next_signal(&mut rx).await else {
        panic!("expected an event");
    };
    assert_eq!(second.item_name.as_deref(), Some("Temp"));
    assert_eq!(second.value(), Some("21.5"));

    // Body exhausted: the stream reports a status-less interruption.
    assert!(matches!(
        next_signal(&mut rx).await,
        StreamSignal::TransientError(_)
    ));

    handle.shutdown();
    assert!(matches!(next_signal(&mut rx).await, StreamSignal::Closed));
    handle.join().await;
}

#[tokio::test]
async fn test_503_schedules_exactly_one_reconnect_after_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let (handle, mut rx) = stream_for(&server, tuning(400, 10)).spawn(cancel.clone());

    let StreamSignal::TerminalError {
        status,
        message,
        attempt,
    } = next_signal(&mut rx).await
    else {
        panic!("expected a terminal error");
    };
    assert_eq!(status, 503);
    assert_eq!(attempt, 0);
    assert!(message.contains("503"));
    let first = Instant::now();

    // Nothing else happens during the backoff.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(handle.state(), StreamState::Backoff);

    let StreamSignal::TerminalError { attempt, .. } = next_signal(&mut rx).await else {
        panic!("expected a second terminal error");
    };
    assert_eq!(attempt, 1);
    assert!(first.elapsed() >= Duration::from_millis(350));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn test_attempt_count_restarts_after_open() {
    let server = MockServer::start().await;

    // Two refusals, one short-lived open feed, then refusals again.
    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .respond_with(sse_response(String::new()))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(3)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let (handle, mut rx) = stream_for(&server, tuning(20, 20)).spawn(cancel.clone());

    let mut attempts = Vec::new();
    while attempts.len() < 4 {
        match next_signal(&mut rx).await {
            StreamSignal::TerminalError { attempt, .. } => attempts.push(attempt),
            StreamSignal::Opened => attempts.push(u32::MAX),
            _ => {}
        }
    }
    // The failure after the open counts from one again, not three.
    assert_eq!(attempts, vec![0, 1, u32::MAX, 1]);

    cancel.cancel();
    handle.join().await;
}

/// Serve one chunked SSE response carrying a keep-alive, then go silent
/// without closing the connection.
async fn silent_after_keep_alive() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 2048];
                let _ = socket.read(&mut request).await;
                let body = "data: {\"type\":\"ALIVE\",\"interval\":1}\n\n";
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{body}\r\n",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });
    format!("http://{addr}/rest/events?topics=openhab/items")
}

#[tokio::test]
async fn test_missed_keep_alives_end_the_connection() {
    let stream = EventStream::with_client(
        reqwest::Client::new(),
        silent_after_keep_alive().await,
        "openhab/items/".into(),
        tuning(60_000, 10),
    );

    let cancel = CancellationToken::new();
    let (handle, mut rx) = stream.spawn(cancel.clone());

    assert!(matches!(next_signal(&mut rx).await, StreamSignal::Opened));
    let opened = Instant::now();

    let StreamSignal::TransientError(message) = next_signal(&mut rx).await else {
        panic!("expected a status-less interruption");
    };
    assert!(message.contains("keep-alive"), "{message}");
    // Three one-second intervals.
    assert!(opened.elapsed() >= Duration::from_millis(2500));

    // And the short retry reconnects.
    assert!(matches!(next_signal(&mut rx).await, StreamSignal::Opened));

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn test_statusless_error_uses_short_retry_not_backoff() {
    let stream = EventStream::with_client(
        reqwest::Client::new(),
        "http://127.0.0.1:1/rest/events?topics=openhab/items".into(),
        "openhab/items/".into(),
        tuning(60_000, 50),
    );

    let cancel = CancellationToken::new();
    let (handle, mut rx) = stream.spawn(cancel.clone());

    // Two refusals in a row, well inside the 60s backoff window.
    for _ in 0..2 {
        assert!(matches!(
            next_signal(&mut rx).await,
            StreamSignal::TransientError(_)
        ));
    }

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn test_server_retry_field_sets_retry_interval() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .respond_with(sse_response("retry: 30000\n\n".into()))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let (handle, mut rx) = stream_for(&server, tuning(60_000, 10)).spawn(cancel.clone());

    assert!(matches!(next_signal(&mut rx).await, StreamSignal::Opened));
    assert!(matches!(
        next_signal(&mut rx).await,
        StreamSignal::TransientError(_)
    ));

    // Without the retry field the stream would be back within 10ms.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn test_scope_and_auth_from_connection_config() {
    let server = MockServer::start().await;
    let addr = server.address();
    let config = ConnectionConfig {
        port: Some(addr.port()),
        token: Some(SecretString::from("oh.token".to_owned())),
        ..ConnectionConfig::new(addr.ip().to_string())
    };

    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .and(query_param("topics", "openhab/*/*"))
        .and(header("authorization", "Bearer oh.token"))
        .respond_with(sse_response(String::new()))
        .mount(&server)
        .await;

    let stream = EventStream::new(
        &config,
        TopicScope::All,
        &TransportConfig::default(),
        tuning(60_000, 60_000),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let (handle, mut rx) = stream.spawn(cancel.clone());
    assert!(matches!(next_signal(&mut rx).await, StreamSignal::Opened));

    cancel.cancel();
    handle.join().await;
}

#[tokio::test]
async fn test_cancel_during_jitter_never_connects() {
    let server = MockServer::start().await;

    let slow_start = StreamTuning {
        jitter_min: Duration::from_secs(30),
        jitter_max: Duration::from_secs(30),
        ..tuning(60_000, 60_000)
    };

    let cancel = CancellationToken::new();
    let (handle, mut rx) = stream_for(&server, slow_start).spawn(cancel.clone());
    assert_eq!(handle.state(), StreamState::Idle);

    cancel.cancel();
    assert!(matches!(next_signal(&mut rx).await, StreamSignal::Closed));
    assert_eq!(handle.state(), StreamState::Closed);
    assert!(server.received_requests().await.unwrap().is_empty());
}
