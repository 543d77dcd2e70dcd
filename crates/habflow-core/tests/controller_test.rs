#![allow(clippy::unwrap_used)]
// End-to-end controller tests against a wiremock server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use habflow_core::nodes::{ItemListener, ItemListenerConfig};
use habflow_core::{
    ConnectionConfig, ConnectionStatus, ControlIntent, Controller, ControllerConfig,
    ControllerRegistry, CoreError, DispatchPolicy, Notification, StreamState, StreamTuning, Topic,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn config_for(server: &MockServer) -> ControllerConfig {
    let addr = server.address();
    let connection = ConnectionConfig {
        port: Some(addr.port()),
        ..ConnectionConfig::new(addr.ip().to_string())
    };
    ControllerConfig {
        stream: StreamTuning {
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            reconnect_delay: Duration::from_secs(60),
            retry_interval: Duration::from_secs(60),
        },
        sync_retry: Duration::from_millis(100),
        ..ControllerConfig::new(connection).with_name("home")
    }
}

fn record(controller: &Controller, topic: &Topic) -> Arc<Mutex<Vec<Notification>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    controller.subscribe(topic, move |n| sink.lock().unwrap().push(n.clone()));
    log
}

fn on_count(log: &Mutex<Vec<Notification>>) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|n| **n == Notification::Status(ConnectionStatus::On))
        .count()
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn sse_frame(item: &str, kind: &str, value: &str, old: Option<&str>) -> String {
    let mut payload = json!({ "type": "OnOff", "value": value });
    if let Some(old) = old {
        payload["oldType"] = json!("OnOff");
        payload["oldValue"] = json!(old);
    }
    let data = json!({
        "topic": format!("openhab/items/{item}/statechanged"),
        "type": kind,
        "payload": payload.to_string(),
    });
    format!("data: {data}\n\n")
}

async fn mount_stream(server: &MockServer, body: String) {
    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn mount_items(server: &MockServer, items: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items))
        .mount(server)
        .await;
}

fn switch(name: &str, state: &str) -> serde_json::Value {
    json!({ "name": name, "type": "Switch", "state": state, "groupNames": [] })
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_change_filter_end_to_end() {
    let server = MockServer::start().await;
    let mut body = sse_frame("Kitchen_Light", "ItemStateChangedEvent", "ON", Some("OFF"));
    body.push_str(&sse_frame("Kitchen_Light", "ItemStateChangedEvent", "ON", Some("STANDBY")));
    mount_stream(&server, body).await;
    mount_items(&server, json!([switch("Kitchen_Light", "OFF")])).await;

    let registry = ControllerRegistry::new();
    let controller = Controller::new(config_for(&server)).unwrap();
    registry.register(controller.clone());

    let listener_config = ItemListenerConfig {
        policy: DispatchPolicy::default()
            .when_changed()
            .changed_from("OFF")
            .changed_to("ON"),
        fetch_initial: false,
        ..ItemListenerConfig::new("home", "Kitchen_Light")
    };
    let (_listener, mut rx) = ItemListener::start(&registry, listener_config).unwrap();

    controller.start().await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.payload, json!("ON"));
    assert_eq!(msg.old_value.as_deref(), Some("OFF"));
    assert_eq!(msg.event.as_deref(), Some("ItemStateChangedEvent"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err(), "STANDBY -> ON must not be emitted");

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_initial_sync_replays_every_item_and_one_on() {
    let server = MockServer::start().await;
    mount_stream(&server, String::new()).await;
    mount_items(
        &server,
        json!([switch("A", "ON"), switch("B", "OFF"), switch("C", "NULL")]),
    )
    .await;

    let controller = Controller::new(config_for(&server)).unwrap();
    let status = record(&controller, &Topic::CommunicationStatus);
    let initial: Vec<_> = ["A", "B", "C"]
        .iter()
        .map(|name| record(&controller, &Topic::item_initial(*name)))
        .collect();

    controller.start().await.unwrap();

    wait_until(|| initial.iter().all(|log| log.lock().unwrap().len() == 1)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(on_count(&status), 1);
    let Notification::Initial(ref b) = initial[1].lock().unwrap()[0] else {
        panic!("expected an initial snapshot");
    };
    assert_eq!(b.state, "OFF");
    // Initial OFF precedes the ON published by the sync.
    assert_eq!(
        status.lock().unwrap().first(),
        Some(&Notification::Status(ConnectionStatus::Off))
    );

    controller.shutdown().await;
}

#[tokio::test]
async fn test_empty_item_list_is_retried_without_error() {
    let server = MockServer::start().await;
    mount_stream(&server, String::new()).await;

    Mock::given(method("GET"))
        .and(path("/rest/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/items"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_items(&server, json!([switch("Late", "ON")])).await;

    let controller = Controller::new(config_for(&server)).unwrap();
    let status = record(&controller, &Topic::CommunicationStatus);
    let errors = record(&controller, &Topic::CommunicationError);
    let initial = record(&controller, &Topic::item_initial("Late"));

    controller.start().await.unwrap();

    wait_until(|| initial.lock().unwrap().len() == 1).await;

    let item_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/rest/items")
        .count();
    assert_eq!(item_requests, 4);
    assert_eq!(on_count(&status), 1);
    assert!(errors.lock().unwrap().is_empty(), "not-ready is not an error");

    controller.shutdown().await;
}

#[tokio::test]
async fn test_open_stream_without_items_is_not_on() {
    let server = MockServer::start().await;
    mount_stream(&server, String::new()).await;
    mount_items(&server, json!([])).await;

    let controller = Controller::new(config_for(&server)).unwrap();
    let status = record(&controller, &Topic::CommunicationStatus);

    controller.start().await.unwrap();

    // The feed is open and polled repeatedly, yet the server has no items.
    let mut polls = 0;
    for _ in 0..100 {
        polls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/rest/items")
            .count();
        if polls >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(polls >= 3, "expected repeated item polls, saw {polls}");
    assert_eq!(on_count(&status), 0);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_sync_failure_is_broadcast_and_retried() {
    let server = MockServer::start().await;
    mount_stream(&server, String::new()).await;

    Mock::given(method("GET"))
        .and(path("/rest/items"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_items(&server, json!([switch("A", "ON")])).await;

    let controller = Controller::new(config_for(&server)).unwrap();
    let errors = record(&controller, &Topic::CommunicationError);
    let initial = record(&controller, &Topic::item_initial("A"));

    controller.start().await.unwrap();
    wait_until(|| initial.lock().unwrap().len() == 1).await;

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    let Notification::Error(ref message) = errors[0] else {
        panic!("expected an error notification");
    };
    assert!(message.contains("500"), "{message}");
    drop(errors);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_stream_error_status_publishes_off_and_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/events"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let controller = Controller::new(config_for(&server)).unwrap();
    let status = record(&controller, &Topic::CommunicationStatus);
    let errors = record(&controller, &Topic::CommunicationError);

    controller.start().await.unwrap();
    wait_until(|| !errors.lock().unwrap().is_empty()).await;

    assert_eq!(on_count(&status), 0);
    // One OFF at start, one for the failed stream.
    assert_eq!(status.lock().unwrap().len(), 2);
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.stream_state().await != StreamState::Backoff {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    controller.shutdown().await;
    assert_eq!(controller.stream_state().await, StreamState::Closed);
}

#[tokio::test]
async fn test_control_failure_reaches_caller_and_bus() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/items/Missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let controller = Controller::new(config_for(&server)).unwrap();
    let errors = record(&controller, &Topic::CommunicationError);

    let err = controller
        .control("Missing", ControlIntent::ItemCommand, "ON")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(errors.lock().unwrap().len(), 1);

    // After shutdown the caller still hears about failures; the bus does not.
    controller.shutdown().await;
    let err = controller
        .control("Missing", ControlIntent::ItemCommand, "ON")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Communication { .. }));
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_shutdown_publishes_off_and_blocks_restart() {
    let server = MockServer::start().await;
    mount_stream(&server, String::new()).await;
    mount_items(&server, json!([switch("A", "ON")])).await;

    let controller = Controller::new(config_for(&server)).unwrap();
    let status = record(&controller, &Topic::CommunicationStatus);

    controller.start().await.unwrap();
    wait_until(|| on_count(&status) == 1).await;

    controller.shutdown().await;
    assert_eq!(
        status.lock().unwrap().last(),
        Some(&Notification::Status(ConnectionStatus::Off))
    );
    assert!(controller.is_shut_down());
    assert!(matches!(controller.start().await, Err(CoreError::ShutDown)));
}
