// ── Connection monitor ──
//
// Watches a controller's status, error and raw-event channels and
// forwards each on its own output. Keeps an error counter that resets
// whenever the connection comes back ON.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use tracing::trace;

use crate::bus::{ConnectionStatus, Notification, NotificationBus, SubscriptionId, Topic};
use crate::controller::Controller;
use crate::error::CoreError;
use crate::nodes::message::FlowMessage;
use crate::registry::ControllerRegistry;

/// The three outputs of a [`ConnectionMonitor`].
#[derive(Debug)]
pub struct MonitorOutputs {
    /// `CommunicationStatus` messages.
    pub status: mpsc::UnboundedReceiver<FlowMessage>,
    /// `CommunicationError` messages.
    pub errors: mpsc::UnboundedReceiver<FlowMessage>,
    /// `RawEvent` messages.
    pub events: mpsc::UnboundedReceiver<FlowMessage>,
}

#[derive(Default)]
struct MonitorState {
    online: AtomicBool,
    errors: AtomicU64,
    last_error: ArcSwapOption<String>,
}

/// A running connection monitor. Dropping it unsubscribes.
pub struct ConnectionMonitor {
    state: Arc<MonitorState>,
    bus: Arc<NotificationBus>,
    subscriptions: Vec<(Topic, SubscriptionId)>,
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("status", &self.status())
            .field("error_count", &self.error_count())
            .finish_non_exhaustive()
    }
}

impl ConnectionMonitor {
    pub fn start(
        registry: &ControllerRegistry,
        controller: &str,
    ) -> Result<(Self, MonitorOutputs), CoreError> {
        Ok(Self::attach(&registry.resolve(controller)?))
    }

    pub fn attach(controller: &Controller) -> (Self, MonitorOutputs) {
        let state = Arc::new(MonitorState::default());
        let bus = Arc::clone(controller.bus());
        let (status_tx, status) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        let on_status = Arc::clone(&state);
        let status_id = bus.subscribe(&Topic::CommunicationStatus, move |n| {
            let Notification::Status(status) = n else {
                return;
            };
            let online = *status == ConnectionStatus::On;
            on_status.online.store(online, Ordering::Release);
            if online {
                on_status.errors.store(0, Ordering::Release);
                on_status.last_error.store(None);
            }
            forward(&status_tx, "CommunicationStatus", status.to_string());
        });

        let on_error = Arc::clone(&state);
        let error_id = bus.subscribe(&Topic::CommunicationError, move |n| {
            let Notification::Error(message) = n else {
                return;
            };
            on_error.errors.fetch_add(1, Ordering::AcqRel);
            on_error.last_error.store(Some(Arc::new(message.clone())));
            forward(&errors_tx, "CommunicationError", message.clone());
        });

        let event_id = bus.subscribe(&Topic::RawEvent, move |n| {
            let Notification::Event(event) = n else {
                return;
            };
            let payload = serde_json::to_value(&**event).unwrap_or_default();
            forward(&events_tx, "RawEvent", payload);
        });

        let monitor = Self {
            state,
            bus,
            subscriptions: vec![
                (Topic::CommunicationStatus, status_id),
                (Topic::CommunicationError, error_id),
                (Topic::RawEvent, event_id),
            ],
        };
        (monitor, MonitorOutputs { status, errors, events })
    }

    /// Last status seen; `OFF` until the first `ON`.
    pub fn status(&self) -> ConnectionStatus {
        if self.state.online.load(Ordering::Acquire) {
            ConnectionStatus::On
        } else {
            ConnectionStatus::Off
        }
    }

    /// Errors since the connection last came up.
    pub fn error_count(&self) -> u64 {
        self.state.errors.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<Arc<String>> {
        self.state.last_error.load_full()
    }

    /// Short status line: the status, or `# <count>: <error>` while
    /// errors are pending.
    pub fn summary(&self) -> String {
        match self.last_error() {
            Some(error) if !error.is_empty() => format!(
                "# {}: {}",
                self.error_count(),
                habflow_api::error::truncate(&error, 40)
            ),
            _ => self.status().to_string(),
        }
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        for (topic, id) in self.subscriptions.drain(..) {
            self.bus.unsubscribe(&topic, id);
        }
    }
}

fn forward(
    tx: &mpsc::UnboundedSender<FlowMessage>,
    event: &str,
    payload: impl Into<serde_json::Value>,
) {
    let msg = FlowMessage::new().with_event(event).with_payload(payload);
    if tx.send(msg).is_err() {
        trace!(event, "monitor output closed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use habflow_api::{EventKind, StreamEvent};
    use serde_json::json;

    use super::*;
    use crate::config::ControllerConfig;

    #[tokio::test]
    async fn counts_errors_and_resets_on() {
        let controller = Controller::new(ControllerConfig::default()).unwrap();
        let (monitor, mut out) = ConnectionMonitor::attach(&controller);
        let bus = controller.bus();

        assert_eq!(monitor.status(), ConnectionStatus::Off);

        bus.publish(&Topic::CommunicationError, &Notification::Error("refused".into()));
        bus.publish(&Topic::CommunicationError, &Notification::Error("HTTP status 500".into()));
        assert_eq!(monitor.error_count(), 2);
        assert_eq!(monitor.last_error().unwrap().as_str(), "HTTP status 500");
        assert_eq!(monitor.summary(), "# 2: HTTP status 500");

        let first = out.errors.try_recv().unwrap();
        assert_eq!(first.event.as_deref(), Some("CommunicationError"));
        assert_eq!(first.payload, json!("refused"));

        bus.publish(
            &Topic::CommunicationStatus,
            &Notification::Status(ConnectionStatus::On),
        );
        assert_eq!(monitor.status(), ConnectionStatus::On);
        assert_eq!(monitor.error_count(), 0);
        assert!(monitor.last_error().is_none());
        assert_eq!(monitor.summary(), "ON");

        let status = out.status.try_recv().unwrap();
        assert_eq!(status.event.as_deref(), Some("CommunicationStatus"));
        assert_eq!(status.payload, json!("ON"));
    }

    #[tokio::test]
    async fn forwards_raw_events() {
        let controller = Controller::new(ControllerConfig::default()).unwrap();
        let (_monitor, mut out) = ConnectionMonitor::attach(&controller);

        let event = StreamEvent {
            topic: "openhab/items/Temp/state".into(),
            kind: EventKind::ItemStateEvent,
            payload: json!({ "value": "21" }),
            item_name: Some("Temp".into()),
        };
        controller
            .bus()
            .publish(&Topic::RawEvent, &Notification::Event(Arc::new(event)));

        let msg = out.events.try_recv().unwrap();
        assert_eq!(msg.event.as_deref(), Some("RawEvent"));
        assert_eq!(msg.payload["topic"], "openhab/items/Temp/state");
        assert_eq!(msg.payload["type"], "ItemStateEvent");
        assert_eq!(msg.payload["payload"]["value"], "21");
    }
}
