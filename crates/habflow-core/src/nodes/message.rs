use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message flowing between nodes of the automation host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMessage {
    #[serde(rename = "_msgid")]
    pub id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// What produced the message: an event kind, `InitialStateEvent`,
    /// `ActualValue`, `CommunicationStatus`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(rename = "oldValue", default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Node-specific fields (`label`, `type`, `groups`, `members`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for FlowMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowMessage {
    /// An empty message with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            item: None,
            topic: None,
            event: None,
            payload: serde_json::Value::Null,
            old_value: None,
            timestamp: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn with_topic(mut self, topic: Option<String>) -> Self {
        self.topic = topic;
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<serde_json::Value>) -> Self {
        self.payload = payload.into();
        self
    }

    /// The payload as the plain text sent to the server. `None` for a
    /// null payload; strings as is; anything else as JSON.
    pub fn payload_text(&self) -> Option<String> {
        match &self.payload {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a node-specific field.
    pub fn set_extra(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.extra.insert(key.to_owned(), value.into());
    }
}
