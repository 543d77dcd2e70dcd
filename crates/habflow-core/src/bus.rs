// ── Notification bus ──
//
// Per-controller publish/subscribe registry. Delivery is synchronous, in
// subscription order, on the publishing task. The handler list for a
// topic is cloned before delivery, so handlers may subscribe or
// unsubscribe while a publish is in flight.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use habflow_api::{Item, StreamEvent};
use serde::Serialize;
use strum::{Display, EnumString};

// ── Topics ───────────────────────────────────────────────────────────

/// A bus channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `<item>/RawEvent`: stream events for one item.
    ItemRaw(String),
    /// `<item>/InitialEvent`: the item snapshot from an initial sync.
    ItemInitial(String),
    /// `RawEvent`: every stream event.
    RawEvent,
    /// `CommunicationStatus`: `ON` / `OFF`.
    CommunicationStatus,
    /// `CommunicationError`: error text.
    CommunicationError,
}

impl Topic {
    pub fn item_raw(item: impl Into<String>) -> Self {
        Self::ItemRaw(item.into())
    }

    pub fn item_initial(item: impl Into<String>) -> Self {
        Self::ItemInitial(item.into())
    }

    /// Parse the flat topic string back into a [`Topic`].
    pub fn parse(raw: &str) -> Self {
        match raw {
            "RawEvent" => Self::RawEvent,
            "CommunicationStatus" => Self::CommunicationStatus,
            "CommunicationError" => Self::CommunicationError,
            _ => match raw.rsplit_once('/') {
                Some((item, "InitialEvent")) => Self::ItemInitial(item.to_owned()),
                Some((item, "RawEvent")) => Self::ItemRaw(item.to_owned()),
                _ => Self::ItemRaw(raw.to_owned()),
            },
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemRaw(item) => write!(f, "{item}/RawEvent"),
            Self::ItemInitial(item) => write!(f, "{item}/InitialEvent"),
            Self::RawEvent => f.write_str("RawEvent"),
            Self::CommunicationStatus => f.write_str("CommunicationStatus"),
            Self::CommunicationError => f.write_str("CommunicationError"),
        }
    }
}

// ── Notifications ────────────────────────────────────────────────────

/// Connection status carried on [`Topic::CommunicationStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
pub enum ConnectionStatus {
    #[strum(serialize = "ON")]
    #[serde(rename = "ON")]
    On,
    #[strum(serialize = "OFF")]
    #[serde(rename = "OFF")]
    Off,
}

/// What travels over the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Status(ConnectionStatus),
    Error(String),
    Event(Arc<StreamEvent>),
    Initial(Arc<Item>),
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "{status}"),
            Self::Error(message) => f.write_str(message),
            Self::Event(event) => write!(
                f,
                "{} {}",
                event.kind,
                event.value().unwrap_or_default()
            ),
            Self::Initial(item) => write!(f, "{} {}", item.name, item.state),
        }
    }
}

// ── Subscriptions ────────────────────────────────────────────────────

/// Opaque handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

// ── NotificationBus ──────────────────────────────────────────────────

/// Topic-keyed handler registry.
#[derive(Default)]
pub struct NotificationBus {
    handlers: DashMap<String, Vec<(SubscriptionId, Handler)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("topics", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` on `topic`. Handlers run in registration order.
    pub fn subscribe<F>(&self, topic: &Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        tracing::trace!(%topic, "subscribed");
        id
    }

    /// Remove one subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, topic: &Topic, id: SubscriptionId) -> bool {
        let key = topic.to_string();
        let removed = self.handlers.get_mut(&key).is_some_and(|mut list| {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            list.len() != before
        });
        self.handlers.remove_if(&key, |_, list| list.is_empty());
        removed
    }

    /// Deliver `notification` to every handler on `topic`.
    ///
    /// A panicking handler is logged and skipped; later handlers still run.
    pub fn publish(&self, topic: &Topic, notification: &Notification) {
        let key = topic.to_string();
        let snapshot: Vec<Handler> = match self.handlers.get(&key) {
            Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(notification))).is_err() {
                tracing::error!(topic = %key, "notification handler panicked");
            }
        }
    }

    /// Number of handlers on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.handlers
            .get(&topic.to_string())
            .map_or(0, |list| list.len())
    }
}
