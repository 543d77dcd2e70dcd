// ── Item reader ──
//
// Fetches an item on demand and emits its current state as
// `ActualValue`, enriched with label, type, groups and group members.

use habflow_api::Item;
use serde_json::Value;

use crate::controller::Controller;
use crate::error::CoreError;
use crate::nodes::message::FlowMessage;
use crate::registry::ControllerRegistry;

pub const ACTUAL_VALUE_EVENT: &str = "ActualValue";

#[derive(Debug, Clone, Default)]
pub struct ItemReaderConfig {
    pub controller: String,
    /// Overrides `msg.item` when non-empty.
    pub item: Option<String>,
    /// Replaces `msg.topic` when non-empty.
    pub topic: Option<String>,
    /// Emit NULL states too.
    pub send_null: bool,
}

#[derive(Debug, Clone)]
pub struct ItemReader {
    controller: Controller,
    config: ItemReaderConfig,
}

impl ItemReader {
    pub fn start(registry: &ControllerRegistry, config: ItemReaderConfig) -> Result<Self, CoreError> {
        let controller = registry.resolve(&config.controller)?;
        Ok(Self::attach(controller, config))
    }

    pub fn attach(controller: Controller, config: ItemReaderConfig) -> Self {
        Self { controller, config }
    }

    /// Fetch the item and decorate `msg` with its state.
    ///
    /// `Ok(None)` when the state is NULL and `send_null` is off.
    pub async fn handle(&self, msg: FlowMessage) -> Result<Option<FlowMessage>, CoreError> {
        let name = self
            .config
            .item
            .as_deref()
            .filter(|i| !i.is_empty())
            .or(msg.item.as_deref().filter(|i| !i.is_empty()))
            .map(str::to_owned)
            .ok_or(CoreError::NoItem)?;

        let item = self.controller.get_item(&name).await?;
        if item.has_null_state() && !self.config.send_null {
            return Ok(None);
        }
        Ok(Some(self.decorate(msg, name, item)))
    }

    fn decorate(&self, mut msg: FlowMessage, name: String, item: Item) -> FlowMessage {
        if let Some(members) = item.members_by_name() {
            let members: serde_json::Map<String, Value> = members
                .into_iter()
                .map(|(k, v)| (k, serde_json::to_value(v).unwrap_or_default()))
                .collect();
            msg.set_extra("members", Value::Object(members));
        }

        if let Some(topic) = self.config.topic.as_deref().filter(|t| !t.is_empty()) {
            msg.topic = Some(topic.to_owned());
        }

        let payload_in = std::mem::take(&mut msg.payload);
        msg.set_extra("payload_in", payload_in);
        msg.set_extra("label", item.label.map_or(Value::Null, Value::String));
        msg.set_extra("type", item.item_type);
        msg.set_extra("groups", item.group_names);
        msg.item = Some(name);
        msg.event = Some(ACTUAL_VALUE_EVENT.to_owned());
        msg.payload = Value::String(item.state);
        msg
    }
}
