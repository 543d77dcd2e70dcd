// ── Controller abstraction ──
//
// Lifecycle management for one server connection. Owns the REST client,
// the item event stream, the router task that turns stream signals into
// bus notifications, and the initial-state sync that runs after every
// open.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use habflow_api::{
    ControlIntent, ControlReply, EventStream, FixedRetry, Item, RestClient, StreamSignal,
    StreamState, TopicScope,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{ConnectionStatus, Notification, NotificationBus, SubscriptionId, Topic};
use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::sync::run_initial_sync;

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Construct with
/// [`new()`](Self::new), call [`start()`](Self::start) to open the event
/// stream, and [`shutdown()`](Self::shutdown) to tear everything down.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    bus: Arc<NotificationBus>,
    rest: RestClient,
    cancel: CancellationToken,
    started: AtomicBool,
    shut_down: AtomicBool,
    stream_state: Mutex<Option<watch::Receiver<StreamState>>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.inner.config.name)
            .field("base_url", &self.inner.rest.base_url())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create a controller from configuration. Does NOT connect: call
    /// [`start()`](Self::start) to open the event stream.
    pub fn new(config: ControllerConfig) -> Result<Self, CoreError> {
        let rest = RestClient::new(&config.connection, &config.transport)?;
        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                bus: Arc::new(NotificationBus::new()),
                rest,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                stream_state: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The configuration this controller was built from.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The bus notifications are published on.
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.inner.bus
    }

    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Current state of the event stream, `Idle` before `start()`.
    pub async fn stream_state(&self) -> StreamState {
        self.inner
            .stream_state
            .lock()
            .await
            .as_ref()
            .map_or(StreamState::Idle, |rx| *rx.borrow())
    }

    // ── Subscriptions ────────────────────────────────────────────

    pub fn subscribe<F>(&self, topic: &Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(topic, handler)
    }

    pub fn unsubscribe(&self, topic: &Topic, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(topic, id)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Publish `OFF`, then spawn the event stream and its router.
    ///
    /// The first connect happens after the configured startup jitter.
    /// Calling `start()` twice is a no-op.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.is_shut_down() {
            return Err(CoreError::ShutDown);
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            debug!(controller = %self.name(), "already started");
            return Ok(());
        }

        let config = &self.inner.config;
        self.publish_status(ConnectionStatus::Off);

        let stream = EventStream::new(
            &config.connection,
            TopicScope::Items,
            &config.transport,
            config.stream.clone(),
        )?;
        info!(controller = %self.name(), url = %stream.url(), "starting event stream");

        let (handle, signals) = stream.spawn(self.inner.cancel.child_token());
        *self.inner.stream_state.lock().await = Some(handle.watch_state());

        let router = tokio::spawn(route_signals(self.clone(), signals));
        let stream_task = tokio::spawn(handle.join());

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(router);
        handles.push(stream_task);
        Ok(())
    }

    /// Close the stream, cancel every timer, publish `OFF`.
    ///
    /// In-flight control requests are left to finish but no longer publish.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner
            .bus
            .publish(&Topic::CommunicationStatus, &Notification::Status(ConnectionStatus::Off));
        info!(controller = %self.name(), "controller shut down");
    }

    // ── Control requests ─────────────────────────────────────────

    /// Read, update, or command an item.
    ///
    /// Failures are returned and also broadcast on `CommunicationError`,
    /// unless the controller has shut down in the meantime.
    pub async fn control(
        &self,
        item: &str,
        intent: ControlIntent,
        payload: &str,
    ) -> Result<ControlReply, CoreError> {
        match self.inner.rest.control(item, intent, payload).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(item, %intent, error = %e, "control request failed");
                self.publish_error(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Fetch one item.
    pub async fn get_item(&self, item: &str) -> Result<Item, CoreError> {
        match self.control(item, ControlIntent::StateFetch, "").await? {
            ControlReply::State(item) => Ok(item),
            ControlReply::Accepted => Err(CoreError::Internal(
                "state fetch returned no item".into(),
            )),
        }
    }

    /// Fetch every item.
    pub async fn list_items(&self) -> Result<Vec<Item>, CoreError> {
        match self.inner.rest.list_items().await {
            Ok(items) => Ok(items),
            Err(e) => {
                self.publish_error(e.to_string());
                Err(e.into())
            }
        }
    }

    // ── Publishing helpers ───────────────────────────────────────

    fn publish_status(&self, status: ConnectionStatus) {
        if self.is_shut_down() {
            return;
        }
        self.inner
            .bus
            .publish(&Topic::CommunicationStatus, &Notification::Status(status));
    }

    fn publish_error(&self, message: String) {
        if self.is_shut_down() {
            return;
        }
        self.inner
            .bus
            .publish(&Topic::CommunicationError, &Notification::Error(message));
    }
}

// ── Router task ──────────────────────────────────────────────────

/// The sync belonging to the most recent open.
struct RunningSync {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Turn stream signals into bus notifications until the stream closes.
async fn route_signals(controller: Controller, mut signals: mpsc::Receiver<StreamSignal>) {
    let mut sync: Option<RunningSync> = None;

    while let Some(signal) = signals.recv().await {
        match signal {
            StreamSignal::Opened => {
                if let Some(previous) = sync.take() {
                    previous.cancel.cancel();
                }
                sync = Some(spawn_sync(&controller));
            }
            StreamSignal::Event(event) => {
                let item = event.item_name.clone();
                let notification = Notification::Event(event);
                if let Some(item) = item {
                    controller
                        .inner
                        .bus
                        .publish(&Topic::ItemRaw(item), &notification);
                }
                controller.inner.bus.publish(&Topic::RawEvent, &notification);
            }
            StreamSignal::TransientError(message) => {
                debug!(controller = %controller.name(), error = %message, "stream interrupted, retrying");
            }
            StreamSignal::TerminalError {
                status,
                message,
                attempt,
            } => {
                warn!(controller = %controller.name(), status, attempt, "event stream failed, restarting after delay");
                controller.publish_status(ConnectionStatus::Off);
                controller.publish_error(message);
            }
            StreamSignal::Closed => break,
        }
    }

    if let Some(running) = sync.take() {
        running.cancel.cancel();
        let _ = running.task.await;
    }
    debug!(controller = %controller.name(), "router exiting");
}

fn spawn_sync(controller: &Controller) -> RunningSync {
    let cancel = controller.inner.cancel.child_token();
    let rest = controller.inner.rest.clone();
    let bus = Arc::clone(&controller.inner.bus);
    let retry = FixedRetry::new(controller.inner.config.sync_retry);

    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        if let Some(count) = run_initial_sync(&rest, &bus, retry, &task_cancel).await {
            debug!(count, "initial sync complete");
        }
    });

    RunningSync { cancel, task }
}
