//! Server-sent event stream with auto-reconnect.
//!
//! Connects to the server's `/rest/events` feed and forwards decoded
//! events as [`StreamSignal`]s over an [`mpsc`] channel. The background
//! task is an explicit state machine:
//!
//! ```text
//! Idle ──jitter──▶ Connecting ──2xx──▶ Open
//!                     ▲  │                │
//!     retry interval  │  │ 4xx/5xx        │ read error / stream end
//!                     │  ▼                │
//!                     └─ Backoff ◀────────┘ (status-less: short retry)
//! ```
//!
//! Status-less failures (refused, reset, stream ended) reconnect after the
//! short transport retry interval, which the server may adjust with the
//! SSE `retry:` field. HTTP error statuses are terminal for the
//! connection and reconnect after the fixed reconnect delay. There is no
//! retry cap; only cancellation ends the loop.
//!
//! Once the server announces a keep-alive interval, a connection that stays
//! silent for three intervals counts as status-less and is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use habflow_api::events::{EventStream, StreamSignal, StreamTuning};
//! use habflow_api::{ConnectionConfig, TopicScope, TransportConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ConnectionConfig::new("openhab.local");
//! let stream = EventStream::new(&config, TopicScope::Items, &TransportConfig::default(), StreamTuning::default())?;
//! let (handle, mut rx) = stream.spawn(CancellationToken::new());
//!
//! while let Some(signal) = rx.recv().await {
//!     if let StreamSignal::Event(event) = signal {
//!         println!("{} {}", event.topic, event.kind);
//!     }
//! }
//! handle.shutdown();
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use reqwest::Method;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::auth_headers;
use crate::connection::{ConnectionConfig, TopicScope};
use crate::error::{Error, MAX_FAILURE_LEN, redact_url, truncate};
use crate::models::{EventKind, StreamEvent};
use crate::retry::FixedRetry;
use crate::transport::TransportConfig;

// ── Channel capacity ─────────────────────────────────────────────────

const SIGNAL_CHANNEL_CAPACITY: usize = 1024;

/// Longest line or buffered event the decoder accepts.
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Keep-alive intervals that may pass silently before the connection is
/// considered dead.
const KEEPALIVE_MISSES: u32 = 3;

// ── StreamTuning ─────────────────────────────────────────────────────

/// Timing knobs for the reconnecting stream.
#[derive(Debug, Clone)]
pub struct StreamTuning {
    /// Lower bound of the random delay before the first connect. Default: 1s.
    pub jitter_min: Duration,
    /// Upper bound of the random delay before the first connect. Default: 5s.
    pub jitter_max: Duration,
    /// Fixed delay after an HTTP error status. Default: 10s.
    pub reconnect_delay: Duration,
    /// Initial short retry after a status-less failure. Default: 1s.
    pub retry_interval: Duration,
}

impl Default for StreamTuning {
    fn default() -> Self {
        Self {
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(10),
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl StreamTuning {
    /// A uniformly random delay in `[jitter_min, jitter_max]`.
    pub fn startup_jitter(&self) -> Duration {
        let min = duration_ms(self.jitter_min);
        let max = duration_ms(self.jitter_max);
        if max <= min {
            return self.jitter_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Signals & state ──────────────────────────────────────────────────

/// Where the stream task currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Backoff,
    Closed,
}

/// What the stream task reports to its consumer.
#[derive(Debug, Clone)]
pub enum StreamSignal {
    /// A 2xx response arrived; the feed is live.
    Opened,
    /// A decoded event.
    Event(Arc<StreamEvent>),
    /// The connection failed or ended without an HTTP status. The task
    /// reconnects on its own after the short retry interval.
    TransientError(String),
    /// The server answered with an error status. The connection has been
    /// discarded and a reconnect is scheduled after the fixed delay.
    /// `attempt` counts the failed connects since the feed was last open.
    TerminalError {
        status: u16,
        message: String,
        attempt: u32,
    },
    /// The task stopped after cancellation.
    Closed,
}

// ── SSE decoding ─────────────────────────────────────────────────────

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field, `message` when absent.
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence;
/// only complete lines are decoded. Lines end in CRLF, LF or a bare CR.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
    data_len: usize,
    event: Option<String>,
    retry: Option<Duration>,
    /// The last line ended in CR; a leading LF belongs to it.
    skip_lf: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return every frame it completes.
    ///
    /// Fails with [`Error::MalformedFrame`] once an unterminated line or an
    /// undispatched event grows past [`MAX_EVENT_BYTES`]; the decoder is
    /// reset and the connection should be dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, Error> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            if self.skip_lf && !self.pending.is_empty() {
                if self.pending.first() == Some(&b'\n') {
                    self.pending.remove(0);
                }
                self.skip_lf = false;
            }
            let Some(pos) = self.pending.iter().position(|b| matches!(b, b'\n' | b'\r')) else {
                break;
            };
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            if line.pop() == Some(b'\r') {
                self.skip_lf = true;
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        if self.pending.len() + self.data_len > MAX_EVENT_BYTES {
            *self = Self::default();
            return Err(Error::MalformedFrame(format!(
                "event exceeds {MAX_EVENT_BYTES} bytes"
            )));
        }
        Ok(frames)
    }

    /// The most recent `retry:` value the server sent, if any.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data_len += value.len() + 1;
                self.data.push(value.to_owned());
            }
            "event" => self.event = Some(value.to_owned()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take().unwrap_or_else(|| "message".to_owned());
        if self.data.is_empty() {
            return None;
        }
        self.data_len = 0;
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

// ── Event parsing ────────────────────────────────────────────────────

/// The server's keep-alive frame: `{"type":"ALIVE","interval":10}`.
#[derive(Debug, Deserialize)]
struct KeepAlive {
    #[serde(rename = "type")]
    kind: String,
    /// Seconds between keep-alives.
    interval: Option<u64>,
}

/// The announced interval if `data` is a keep-alive frame.
fn keep_alive_interval(data: &str) -> Option<Duration> {
    let alive: KeepAlive = serde_json::from_str(data).ok()?;
    if alive.kind != "ALIVE" {
        return None;
    }
    alive.interval.filter(|secs| *secs > 0).map(Duration::from_secs)
}

/// Envelope carried in each frame's `data`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    topic: String,
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(default)]
    payload: serde_json::Value,
}

/// The item segment of `topic` after `prefix`, up to the next `/`.
///
/// `extract_item_name("openhab/items/", "openhab/items/Kitchen_Light/statechanged")`
/// yields `Some("Kitchen_Light")`.
pub fn extract_item_name<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
    let rest = topic.strip_prefix(prefix)?;
    let name = rest.split('/').next().unwrap_or_default();
    if name.is_empty() { None } else { Some(name) }
}

/// Decode a frame's `data` into a [`StreamEvent`].
///
/// The server sends `payload` as a JSON-encoded string; it is decoded a
/// second time. An already-structured payload is accepted as is.
pub fn parse_frame(data: &str, item_prefix: &str) -> Result<StreamEvent, Error> {
    let envelope: Envelope = serde_json::from_str(data).map_err(|e| {
        Error::MalformedFrame(format!("{e}: {}", truncate(data, MAX_FAILURE_LEN)))
    })?;

    let payload = match envelope.payload {
        serde_json::Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
            Error::MalformedFrame(format!(
                "payload is not JSON ({e}): {}",
                truncate(&raw, MAX_FAILURE_LEN)
            ))
        })?,
        other => other,
    };

    let item_name = extract_item_name(item_prefix, &envelope.topic).map(str::to_owned);

    Ok(StreamEvent {
        topic: envelope.topic,
        kind: envelope.kind,
        payload,
        item_name,
    })
}

// ── EventStream ──────────────────────────────────────────────────────

/// A configured, not yet running event stream.
#[derive(Debug, Clone)]
pub struct EventStream {
    http: reqwest::Client,
    url: String,
    item_prefix: String,
    tuning: StreamTuning,
}

impl EventStream {
    /// Stream for `config` restricted to `scope`, authenticated like the
    /// REST client.
    pub fn new(
        config: &ConnectionConfig,
        scope: TopicScope,
        transport: &TransportConfig,
        tuning: StreamTuning,
    ) -> Result<Self, Error> {
        let http = transport.build_streaming_client(auth_headers(config)?)?;
        Ok(Self::with_client(
            http,
            config.events_url(scope),
            config.version.item_topic_prefix(),
            tuning,
        ))
    }

    /// Stream with a pre-built client and explicit URL.
    pub fn with_client(
        http: reqwest::Client,
        url: String,
        item_prefix: String,
        tuning: StreamTuning,
    ) -> Self {
        Self {
            http,
            url,
            item_prefix,
            tuning,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the background task. Returns immediately; the first connect
    /// happens after the startup jitter.
    pub fn spawn(self, cancel: CancellationToken) -> (EventStreamHandle, mpsc::Receiver<StreamSignal>) {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            stream_loop(self, signal_tx, state_tx, task_cancel).await;
        });

        let handle = EventStreamHandle {
            state_rx,
            cancel,
            task,
        };
        (handle, signal_rx)
    }
}

// ── EventStreamHandle ────────────────────────────────────────────────

/// Handle to a running event stream task.
#[derive(Debug)]
pub struct EventStreamHandle {
    state_rx: watch::Receiver<StreamState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventStreamHandle {
    /// Current state of the stream task.
    pub fn state(&self) -> StreamState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes state transitions.
    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Signal the task to close the connection and stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "event stream task failed");
        }
    }
}

// ── Background loop ──────────────────────────────────────────────────

/// How a single connection ended.
enum ConnectionEnd {
    Cancelled,
    /// No HTTP status involved.
    Transient(String),
    Terminal { status: u16, message: String },
    /// The signal receiver is gone; nobody is listening.
    Abandoned,
}

/// Main loop: jitter → connect → read → on failure wait → reconnect.
async fn stream_loop(
    stream: EventStream,
    signal_tx: mpsc::Sender<StreamSignal>,
    state_tx: watch::Sender<StreamState>,
    cancel: CancellationToken,
) {
    let jitter = stream.tuning.startup_jitter();
    tracing::debug!(delay_ms = duration_ms(jitter), "delaying first connect");
    let started = FixedRetry::new(jitter).pause(&cancel).await;

    let backoff = FixedRetry::new(stream.tuning.reconnect_delay);
    let mut retry_interval = stream.tuning.retry_interval;
    let mut attempt: u32 = 0;

    if started {
        loop {
            let _ = state_tx.send(StreamState::Connecting);
            let end = connect_and_read(
                &stream,
                &signal_tx,
                &state_tx,
                &cancel,
                &mut retry_interval,
                &mut attempt,
            )
            .await;

            let delay = match end {
                ConnectionEnd::Cancelled | ConnectionEnd::Abandoned => break,
                ConnectionEnd::Transient(message) => {
                    tracing::debug!(error = %message, "event stream interrupted");
                    if signal_tx.send(StreamSignal::TransientError(message)).await.is_err() {
                        break;
                    }
                    FixedRetry::new(retry_interval)
                }
                ConnectionEnd::Terminal { status, message } => {
                    tracing::warn!(status, error = %message, "event stream closed by server error");
                    let signal = StreamSignal::TerminalError {
                        status,
                        message,
                        attempt,
                    };
                    if signal_tx.send(signal).await.is_err() {
                        break;
                    }
                    tracing::info!(
                        delay_ms = duration_ms(backoff.delay),
                        attempt,
                        "reconnect scheduled"
                    );
                    backoff
                }
            };

            let _ = state_tx.send(StreamState::Backoff);
            if !delay.pause(&cancel).await {
                break;
            }
            attempt = attempt.saturating_add(1);
        }
    }

    let _ = state_tx.send(StreamState::Closed);
    let _ = signal_tx.send(StreamSignal::Closed).await;
    tracing::debug!("event stream loop exiting");
}

/// Open one connection and read frames until it ends.
///
/// The response is dropped before returning, so the caller never holds
/// two connections at once.
async fn connect_and_read(
    stream: &EventStream,
    signal_tx: &mpsc::Sender<StreamSignal>,
    state_tx: &watch::Sender<StreamState>,
    cancel: &CancellationToken,
    retry_interval: &mut Duration,
    attempt: &mut u32,
) -> ConnectionEnd {
    tracing::info!(url = %redact_url(&stream.url), "connecting to event stream");

    let request = stream
        .http
        .get(&stream.url)
        .header(ACCEPT, "text/event-stream")
        .send();

    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return ConnectionEnd::Cancelled,
        result = request => match result {
            Ok(response) => response,
            Err(e) => {
                return ConnectionEnd::Transient(
                    Error::transport(&Method::GET, &stream.url, &e).to_string(),
                );
            }
        },
    };

    let status = response.status();
    if !status.is_success() {
        let message = Error::status(&Method::GET, &stream.url, status).to_string();
        drop(response);
        return ConnectionEnd::Terminal {
            status: status.as_u16(),
            message,
        };
    }

    tracing::info!("event stream connected");
    *attempt = 0;
    let _ = state_tx.send(StreamState::Open);
    if signal_tx.send(StreamSignal::Opened).await.is_err() {
        return ConnectionEnd::Abandoned;
    }

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();
    // Unbounded until the server announces a keep-alive interval.
    let mut idle_window: Option<Duration> = None;

    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return ConnectionEnd::Cancelled,
            () = idle_timeout(idle_window) => {
                return ConnectionEnd::Transient(format!(
                    "no keep-alive from event stream for {}ms",
                    idle_window.map_or(0, duration_ms)
                ));
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                let frames = match decoder.feed(&bytes) {
                    Ok(frames) => frames,
                    Err(e) => return ConnectionEnd::Transient(e.to_string()),
                };
                for frame in frames {
                    match forward_frame(&frame, &stream.item_prefix, signal_tx).await {
                        FrameOutcome::Forwarded => {}
                        FrameOutcome::KeepAlive(interval) => {
                            idle_window = Some(interval.saturating_mul(KEEPALIVE_MISSES));
                        }
                        FrameOutcome::Abandoned => return ConnectionEnd::Abandoned,
                    }
                }
                if let Some(retry) = decoder.retry() {
                    *retry_interval = retry;
                }
            }
            Some(Err(e)) => {
                return ConnectionEnd::Transient(
                    Error::transport(&Method::GET, &stream.url, &e).to_string(),
                );
            }
            None => return ConnectionEnd::Transient("event stream ended".to_owned()),
        }
    }
}

/// Sleep for `window`, or forever when there is none.
async fn idle_timeout(window: Option<Duration>) {
    match window {
        Some(window) => tokio::time::sleep(window).await,
        None => std::future::pending().await,
    }
}

/// What became of one frame.
enum FrameOutcome {
    /// Forwarded, ignored or dropped as malformed.
    Forwarded,
    /// A keep-alive announcing its interval.
    KeepAlive(Duration),
    /// The signal receiver is gone.
    Abandoned,
}

/// Decode and forward one frame.
async fn forward_frame(
    frame: &SseFrame,
    item_prefix: &str,
    signal_tx: &mpsc::Sender<StreamSignal>,
) -> FrameOutcome {
    if frame.event != "message" {
        tracing::trace!(event = %frame.event, "ignoring non-message frame");
        return FrameOutcome::Forwarded;
    }
    if let Some(interval) = keep_alive_interval(&frame.data) {
        tracing::trace!(interval_ms = duration_ms(interval), "keep-alive frame");
        return FrameOutcome::KeepAlive(interval);
    }

    match parse_frame(&frame.data, item_prefix) {
        Ok(event) if event.topic.is_empty() => {
            tracing::trace!(kind = %event.kind, "keep-alive frame");
            FrameOutcome::Forwarded
        }
        Ok(event) => {
            tracing::debug!(topic = %event.topic, kind = %event.kind, "event received");
            match signal_tx.send(StreamSignal::Event(Arc::new(event))).await {
                Ok(()) => FrameOutcome::Forwarded,
                Err(_) => FrameOutcome::Abandoned,
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "dropping malformed frame");
            FrameOutcome::Forwarded
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn item_name_from_topic() {
        assert_eq!(
            extract_item_name("openhab/items/", "openhab/items/Kitchen_Light/statechanged"),
            Some("Kitchen_Light")
        );
        assert_eq!(
            extract_item_name("smarthome/items/", "smarthome/items/Temp/state"),
            Some("Temp")
        );
        assert_eq!(extract_item_name("openhab/items/", "openhab/items/Solo"), Some("Solo"));
        assert_eq!(
            extract_item_name("openhab/items/", "openhab/things/zwave:1/status"),
            None
        );
        assert_eq!(extract_item_name("openhab/items/", "openhab/items/"), None);
    }

    #[test]
    fn decoder_joins_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"a\":").unwrap().is_empty());
        assert!(decoder.feed(b"1}\n").unwrap().is_empty());
        let frames = decoder.feed(b"\n").unwrap();
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "message".into(),
                data: "{\"a\":1}".into()
            }]
        );
    }

    #[test]
    fn decoder_handles_fields_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder
            .feed(
                b": keep-alive\r\nretry: 2500\r\nevent: custom\r\ndata: one\r\ndata: two\r\n\r\ndata:three\n\n\n",
            )
            .unwrap();
        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: "custom".into(),
                    data: "one\ntwo".into()
                },
                SseFrame {
                    event: "message".into(),
                    data: "three".into()
                },
            ]
        );
        assert_eq!(decoder.retry(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn decoder_survives_split_utf8() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: Küche\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.feed(&bytes[..split]).unwrap().is_empty());
        let frames = decoder.feed(&bytes[split..]).unwrap();
        assert_eq!(frames[0].data, "Küche");
    }

    #[test]
    fn decoder_accepts_bare_cr() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: one\rdata: two\r\rdata: three\r").unwrap();
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "message".into(),
                data: "one\ntwo".into()
            }]
        );
        // A CRLF split across chunks is one terminator, not two.
        assert!(decoder.feed(b"\n").unwrap().is_empty());
        let frames = decoder.feed(b"\r").unwrap();
        assert_eq!(frames[0].data, "three");
    }

    #[test]
    fn decoder_rejects_unbounded_line() {
        let mut decoder = SseDecoder::new();
        let chunk = vec![b'x'; 64 * 1024];
        let mut result = Ok(Vec::new());
        for _ in 0..=(MAX_EVENT_BYTES / chunk.len()) {
            result = decoder.feed(&chunk);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(Error::MalformedFrame(_))));

        // The decoder starts over afterwards.
        let frames = decoder.feed(b"\ndata: ok\n\n").unwrap();
        assert_eq!(frames[0].data, "ok");
    }

    #[test]
    fn decoder_rejects_unbounded_event() {
        let mut decoder = SseDecoder::new();
        let line = format!("data: {}\n", "y".repeat(1023));
        let mut result = Ok(Vec::new());
        for _ in 0..=(2 * MAX_EVENT_BYTES / line.len()) {
            result = decoder.feed(line.as_bytes());
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn keep_alive_interval_from_alive_frame() {
        assert_eq!(
            keep_alive_interval(r#"{"type":"ALIVE","interval":10}"#),
            Some(Duration::from_secs(10))
        );
        assert_eq!(keep_alive_interval(r#"{"type":"ALIVE"}"#), None);
        assert_eq!(keep_alive_interval(r#"{"type":"ALIVE","interval":0}"#), None);
        assert_eq!(
            keep_alive_interval(r#"{"topic":"openhab/items/X/state","type":"ItemStateEvent","payload":"{}"}"#),
            None
        );
        assert_eq!(keep_alive_interval("not json"), None);
    }

    #[test]
    fn parse_double_encoded_payload() {
        let data = json!({
            "topic": "openhab/items/Kitchen_Light/statechanged",
            "type": "ItemStateChangedEvent",
            "payload": "{\"type\":\"OnOff\",\"value\":\"ON\",\"oldType\":\"OnOff\",\"oldValue\":\"OFF\"}"
        })
        .to_string();

        let event = parse_frame(&data, "openhab/items/").unwrap();
        assert_eq!(event.kind, EventKind::ItemStateChangedEvent);
        assert_eq!(event.item_name.as_deref(), Some("Kitchen_Light"));
        assert_eq!(event.value(), Some("ON"));
        assert_eq!(event.old_value(), Some("OFF"));
    }

    #[test]
    fn parse_structured_payload() {
        let data = json!({
            "topic": "openhab/items/Temp/state",
            "type": "ItemStateEvent",
            "payload": { "type": "Decimal", "value": "21.5" }
        })
        .to_string();

        let event = parse_frame(&data, "openhab/items/").unwrap();
        assert_eq!(event.value(), Some("21.5"));
        assert_eq!(event.old_value(), None);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(
            parse_frame("not json", "openhab/items/"),
            Err(Error::MalformedFrame(_))
        ));
        let bad_payload = json!({
            "topic": "openhab/items/X/state",
            "type": "ItemStateEvent",
            "payload": "{broken"
        })
        .to_string();
        assert!(matches!(
            parse_frame(&bad_payload, "openhab/items/"),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn jitter_stays_in_window() {
        let tuning = StreamTuning {
            jitter_min: Duration::from_millis(1000),
            jitter_max: Duration::from_millis(5000),
            ..StreamTuning::default()
        };
        for _ in 0..100 {
            let d = tuning.startup_jitter();
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(5000));
        }

        let fixed = StreamTuning {
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            ..StreamTuning::default()
        };
        assert_eq!(fixed.startup_jitter(), Duration::ZERO);
    }
}
