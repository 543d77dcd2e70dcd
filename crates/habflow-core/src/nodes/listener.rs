// ── Item listener ──
//
// Input node for one item. Subscribes to the item's RawEvent and
// InitialEvent topics, remembers the last state it saw, and emits flow
// messages for the events its dispatch policy accepts.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use habflow_api::{Item, StreamEvent, is_null_state};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::bus::{Notification, NotificationBus, SubscriptionId, Topic};
use crate::controller::Controller;
use crate::error::CoreError;
use crate::filter::DispatchPolicy;
use crate::nodes::message::FlowMessage;
use crate::registry::ControllerRegistry;

/// Event name of messages carrying an initial state.
pub const INITIAL_STATE_EVENT: &str = "InitialStateEvent";

#[derive(Debug, Clone)]
pub struct ItemListenerConfig {
    /// Name of the controller in the registry.
    pub controller: String,
    pub item: String,
    /// Copied onto every emitted message.
    pub topic: Option<String>,
    pub policy: DispatchPolicy,
    /// Emit `InitialStateEvent` for initial snapshots.
    pub initial_state: bool,
    /// Fetch the item once after a random startup delay.
    pub fetch_initial: bool,
}

impl ItemListenerConfig {
    pub fn new(controller: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            item: item.into(),
            topic: None,
            policy: DispatchPolicy::default(),
            initial_state: false,
            fetch_initial: true,
        }
    }
}

/// Last state seen by a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub state: String,
    pub updated_at: DateTime<Utc>,
}

struct ListenerShared {
    item: String,
    topic: Option<String>,
    policy: DispatchPolicy,
    initial_state: bool,
    last: ArcSwapOption<ItemSnapshot>,
    output: mpsc::UnboundedSender<FlowMessage>,
}

impl ListenerShared {
    fn on_event(&self, event: &StreamEvent) {
        let Some(new) = event.value() else {
            trace!(item = %self.item, kind = %event.kind, "event without value");
            return;
        };
        if is_null_state(new) {
            return;
        }

        self.remember(new);
        let old = event.old_value();
        if self.policy.should_emit(&event.kind, old, Some(new)) {
            self.emit(event.kind.as_str(), new, old);
        }
    }

    fn on_initial(&self, item: &Item) {
        self.remember(&item.state);
        if self.initial_state && !item.has_null_state() {
            self.emit(INITIAL_STATE_EVENT, &item.state, None);
        }
    }

    fn remember(&self, state: &str) {
        self.last.store(Some(Arc::new(ItemSnapshot {
            state: state.to_owned(),
            updated_at: Utc::now(),
        })));
    }

    fn emit(&self, event: &str, state: &str, old: Option<&str>) {
        let mut msg = FlowMessage::new()
            .with_item(self.item.clone())
            .with_topic(self.topic.clone())
            .with_event(event)
            .with_payload(state);
        msg.old_value = old.map(str::to_owned);

        if self.output.send(msg).is_err() {
            trace!(item = %self.item, "listener output closed");
        }
    }
}

/// A running item listener. Dropping it unsubscribes.
pub struct ItemListener {
    shared: Arc<ListenerShared>,
    bus: Arc<NotificationBus>,
    subscriptions: Vec<(Topic, SubscriptionId)>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ItemListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemListener")
            .field("item", &self.shared.item)
            .finish_non_exhaustive()
    }
}

impl ItemListener {
    /// Resolve the configured controller and attach to it.
    pub fn start(
        registry: &ControllerRegistry,
        config: ItemListenerConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FlowMessage>), CoreError> {
        let controller = registry.resolve(&config.controller)?;
        Self::attach(&controller, config)
    }

    /// Attach to `controller` directly. Must be called inside a Tokio
    /// runtime when `fetch_initial` is set.
    pub fn attach(
        controller: &Controller,
        config: ItemListenerConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FlowMessage>), CoreError> {
        let item = config.item.trim().to_owned();
        if item.is_empty() {
            return Err(CoreError::NoItem);
        }

        let (output, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ListenerShared {
            item: item.clone(),
            topic: config.topic.filter(|t| !t.is_empty()),
            policy: config.policy,
            initial_state: config.initial_state,
            last: ArcSwapOption::empty(),
            output,
        });

        let bus = Arc::clone(controller.bus());
        let raw_topic = Topic::item_raw(item.clone());
        let initial_topic = Topic::item_initial(item.clone());

        let on_raw = Arc::clone(&shared);
        let raw_id = bus.subscribe(&raw_topic, move |n| {
            if let Notification::Event(event) = n {
                on_raw.on_event(event);
            }
        });
        let on_initial = Arc::clone(&shared);
        let initial_id = bus.subscribe(&initial_topic, move |n| {
            if let Notification::Initial(item) = n {
                on_initial.on_initial(item);
            }
        });

        let cancel = CancellationToken::new();
        if config.fetch_initial {
            spawn_initial_fetch(controller.clone(), Arc::clone(&shared), cancel.clone());
        }

        debug!(item = %item, controller = %controller.name(), "item listener started");
        let listener = Self {
            shared,
            bus,
            subscriptions: vec![(raw_topic, raw_id), (initial_topic, initial_id)],
            cancel,
        };
        Ok((listener, rx))
    }

    pub fn item(&self) -> &str {
        &self.shared.item
    }

    /// The most recent state received, if any.
    pub fn current_state(&self) -> Option<Arc<ItemSnapshot>> {
        self.shared.last.load_full()
    }

    /// Unsubscribe and cancel a pending initial fetch.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ItemListener {
    fn drop(&mut self) {
        self.cancel.cancel();
        for (topic, id) in self.subscriptions.drain(..) {
            self.bus.unsubscribe(&topic, id);
        }
    }
}

fn spawn_initial_fetch(controller: Controller, shared: Arc<ListenerShared>, cancel: CancellationToken) {
    let delay = controller.config().stream.startup_jitter();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        match controller.get_item(&shared.item).await {
            Ok(item) => {
                if !cancel.is_cancelled() {
                    shared.on_initial(&item);
                }
            }
            Err(e) if shared.initial_state => {
                warn!(item = %shared.item, error = %e, "error retrieving initial state");
            }
            Err(e) => debug!(item = %shared.item, error = %e, "initial fetch failed"),
        }
    });
}
