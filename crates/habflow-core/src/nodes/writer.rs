// ── Item writer ──
//
// Output node: turns an incoming flow message into an update or command.
// Values configured on the node win over values carried by the message.

use habflow_api::{ControlIntent, ControlReply};
use tracing::debug;

use crate::controller::Controller;
use crate::error::CoreError;
use crate::nodes::message::FlowMessage;
use crate::registry::ControllerRegistry;

#[derive(Debug, Clone, Default)]
pub struct ItemWriterConfig {
    pub controller: String,
    /// Overrides `msg.item` when non-empty.
    pub item: Option<String>,
    /// Overrides `msg.topic` when non-empty. Selects the intent.
    pub topic: Option<String>,
    /// Overrides `msg.payload` when non-empty.
    pub payload: Option<String>,
    /// Read the current state first and skip the write when it matches.
    pub only_when_changed: bool,
}

/// Result of [`ItemWriter::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The request was sent; the input message is passed on.
    Written(FlowMessage),
    /// `only_when_changed` found the item already in this state.
    Unchanged { state: String },
}

#[derive(Debug, Clone)]
pub struct ItemWriter {
    controller: Controller,
    config: ItemWriterConfig,
}

impl ItemWriter {
    pub fn start(registry: &ControllerRegistry, config: ItemWriterConfig) -> Result<Self, CoreError> {
        let controller = registry.resolve(&config.controller)?;
        Ok(Self::attach(controller, config))
    }

    pub fn attach(controller: Controller, config: ItemWriterConfig) -> Self {
        Self { controller, config }
    }

    /// Write the message's (or the node's) payload to the item.
    pub async fn handle(&self, msg: FlowMessage) -> Result<WriteOutcome, CoreError> {
        let item = pick(self.config.item.as_deref(), msg.item.as_deref()).ok_or(CoreError::NoItem)?;
        let topic = pick(self.config.topic.as_deref(), msg.topic.as_deref()).unwrap_or_default();
        let payload = match non_empty(self.config.payload.as_deref()) {
            Some(p) => p.to_owned(),
            None => msg.payload_text().ok_or(CoreError::NoPayload)?,
        };
        let intent = ControlIntent::from_topic(&topic);

        if self.config.only_when_changed {
            let current = self.controller.get_item(&item).await?;
            if current.state == payload {
                debug!(item = %item, state = %payload, "state unchanged, skipping write");
                return Ok(WriteOutcome::Unchanged {
                    state: current.state,
                });
            }
            debug!(item = %item, from = %current.state, to = %payload, "state changed");
        }

        let reply = self.controller.control(&item, intent, &payload).await?;
        if let ControlReply::State(current) = reply {
            debug!(item = %item, state = %current.state, "topic selected a state fetch");
        }
        Ok(WriteOutcome::Written(msg))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn pick(node: Option<&str>, msg: Option<&str>) -> Option<String> {
    non_empty(node).or_else(|| non_empty(msg)).map(str::to_owned)
}
