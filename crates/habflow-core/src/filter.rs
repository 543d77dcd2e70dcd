// ── Dispatch policy ──
//
// Decides whether a stream event becomes an outbound flow message for one
// subscriber. Pure: no I/O, no state.

use habflow_api::{EventKind, is_null_state};

/// Which events a subscriber wants, and for changes, which transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Emit on `ItemStateEvent`.
    pub on_updated: bool,
    /// Emit on `ItemStateChangedEvent` (and group changes, see below).
    pub on_changed: bool,
    /// Emit on `ItemCommandEvent`.
    pub on_command: bool,
    /// Only changes whose old value matches, ignoring case.
    pub changed_from: Option<String>,
    /// Only changes whose new value matches, ignoring case.
    pub changed_to: Option<String>,
    /// Treat `GroupItemStateChangedEvent` like a plain change.
    pub include_group_changes: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            on_updated: false,
            on_changed: false,
            on_command: false,
            changed_from: None,
            changed_to: None,
            include_group_changes: true,
        }
    }
}

impl DispatchPolicy {
    pub fn when_updated(mut self) -> Self {
        self.on_updated = true;
        self
    }

    pub fn when_changed(mut self) -> Self {
        self.on_changed = true;
        self
    }

    pub fn when_command(mut self) -> Self {
        self.on_command = true;
        self
    }

    /// Restrict changes to those starting at `value`. Blank clears the filter.
    pub fn changed_from(mut self, value: impl Into<String>) -> Self {
        self.changed_from = non_blank(value.into());
        self
    }

    /// Restrict changes to those ending at `value`. Blank clears the filter.
    pub fn changed_to(mut self, value: impl Into<String>) -> Self {
        self.changed_to = non_blank(value.into());
        self
    }

    pub fn include_group_changes(mut self, include: bool) -> Self {
        self.include_group_changes = include;
        self
    }

    /// Decide whether an event of `kind` moving `old` → `new` is emitted.
    ///
    /// Never emits when `new` is missing or the null sentinel.
    pub fn should_emit(&self, kind: &EventKind, old: Option<&str>, new: Option<&str>) -> bool {
        let Some(new) = new else {
            return false;
        };
        if is_null_state(new) {
            return false;
        }

        match kind {
            EventKind::ItemStateChangedEvent => self.change_matches(old, new),
            EventKind::GroupItemStateChangedEvent => {
                self.include_group_changes && self.change_matches(old, new)
            }
            EventKind::ItemCommandEvent => self.on_command,
            EventKind::ItemStateEvent => self.on_updated,
            EventKind::Other(_) => false,
        }
    }

    fn change_matches(&self, old: Option<&str>, new: &str) -> bool {
        self.on_changed
            && filter_matches(self.changed_from.as_deref(), old)
            && filter_matches(self.changed_to.as_deref(), Some(new))
    }
}

/// An absent or blank filter matches anything; otherwise the value must be
/// present and equal ignoring ASCII case.
fn filter_matches(filter: Option<&str>, value: Option<&str>) -> bool {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        None => true,
        Some(expected) => value.is_some_and(|v| v.eq_ignore_ascii_case(expected)),
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}
