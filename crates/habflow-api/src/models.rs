// Wire types for items and stream events.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The server's representation of "state not yet known".
pub const NULL_STATE: &str = "NULL";

/// `true` if `state` is the unset sentinel, in any letter case.
pub fn is_null_state(state: &str) -> bool {
    state.eq_ignore_ascii_case(NULL_STATE)
}

// ── Item ─────────────────────────────────────────────────────────────

/// A named data point on the server, as returned by `/rest/items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub name: String,

    /// Current state; [`NULL_STATE`] when unset.
    #[serde(default = "null_state")]
    pub state: String,

    /// Item type, e.g. `Switch`, `Number:Temperature`, `Group`.
    #[serde(rename = "type", default)]
    pub item_type: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub group_names: Vec<String>,

    /// Child items; only present on group items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Item>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    /// Remaining fields (tags, editable, stateDescription, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn null_state() -> String {
    NULL_STATE.to_owned()
}

impl Item {
    /// `true` for group items.
    pub fn is_group(&self) -> bool {
        self.item_type == "Group" || self.item_type.starts_with("Group:")
    }

    /// `true` if the state is the unset sentinel.
    pub fn has_null_state(&self) -> bool {
        is_null_state(&self.state)
    }

    /// Group members keyed by name, in server order. `None` for non-groups.
    pub fn members_by_name(&self) -> Option<IndexMap<String, Item>> {
        if !self.is_group() {
            return None;
        }
        let members = self.members.as_deref().unwrap_or_default();
        Some(
            members
                .iter()
                .map(|m| (m.name.clone(), m.clone()))
                .collect(),
        )
    }
}

// ── EventKind ────────────────────────────────────────────────────────

/// The `type` field of a stream event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    ItemStateEvent,
    ItemStateChangedEvent,
    GroupItemStateChangedEvent,
    ItemCommandEvent,
    /// Any other event type (`ItemAddedEvent`, `ThingStatusInfoEvent`, ...).
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ItemStateEvent => "ItemStateEvent",
            Self::ItemStateChangedEvent => "ItemStateChangedEvent",
            Self::GroupItemStateChangedEvent => "GroupItemStateChangedEvent",
            Self::ItemCommandEvent => "ItemCommandEvent",
            Self::Other(s) => s,
        }
    }

    /// `true` for the two "state changed" kinds.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::ItemStateChangedEvent | Self::GroupItemStateChangedEvent
        )
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ItemStateEvent" => Self::ItemStateEvent,
            "ItemStateChangedEvent" => Self::ItemStateChangedEvent,
            "GroupItemStateChangedEvent" => Self::GroupItemStateChangedEvent,
            "ItemCommandEvent" => Self::ItemCommandEvent,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── StreamEvent ──────────────────────────────────────────────────────

/// A decoded event from the server's event stream.
///
/// `payload` has already been through the second JSON decode the wire
/// format requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// e.g. `openhab/items/Kitchen_Light/statechanged`
    pub topic: String,

    #[serde(rename = "type")]
    pub kind: EventKind,

    pub payload: serde_json::Value,

    /// Item the topic refers to, when it is an item topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
}

impl StreamEvent {
    /// The new state (`payload.value`).
    pub fn value(&self) -> Option<&str> {
        self.payload.get("value").and_then(serde_json::Value::as_str)
    }

    /// The previous state (`payload.oldValue`), only on change events.
    pub fn old_value(&self) -> Option<&str> {
        self.payload
            .get("oldValue")
            .and_then(serde_json::Value::as_str)
    }
}
