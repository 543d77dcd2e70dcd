//! Item listing and lookup.

use tabled::Tabled;

use habflow_core::{Controller, Item};

use crate::cli::{GlobalOpts, ItemsArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    item_type: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Label")]
    label: String,
}

impl From<&Item> for ItemRow {
    fn from(item: &Item) -> Self {
        Self {
            name: item.name.clone(),
            item_type: item.item_type.clone(),
            state: item.state.clone(),
            label: item.label.clone().unwrap_or_default(),
        }
    }
}

fn matches(item: &Item, args: &ItemsArgs) -> bool {
    let name_ok = args.filter.as_deref().is_none_or(|f| {
        item.name.to_lowercase().contains(&f.to_lowercase())
    });
    let type_ok = args
        .item_type
        .as_deref()
        .is_none_or(|t| item.item_type.eq_ignore_ascii_case(t));
    name_ok && type_ok
}

fn detail(item: &Item) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    let _ = writeln!(out, "Name:   {}", item.name);
    let _ = writeln!(out, "Type:   {}", item.item_type);
    let _ = writeln!(out, "State:  {}", item.state);
    if let Some(ref label) = item.label {
        let _ = writeln!(out, "Label:  {label}");
    }
    if !item.group_names.is_empty() {
        let _ = writeln!(out, "Groups: {}", item.group_names.join(", "));
    }
    if let Some(ref members) = item.members {
        let _ = writeln!(out, "Members:");
        for member in members {
            let _ = writeln!(out, "  {} = {}", member.name, member.state);
        }
    }
    out.trim_end().to_owned()
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(
    controller: &Controller,
    args: &ItemsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut items: Vec<Item> = controller
        .list_items()
        .await?
        .into_iter()
        .filter(|item| matches(item, args))
        .collect();
    items.sort_by(|a, b| a.name.cmp(&b.name));

    let out = output::render_list(
        global.output,
        &items,
        |i| ItemRow::from(i),
        |i| format!("{} {}", i.name, i.state),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(controller: &Controller, item: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let item = controller.get_item(item).await?;
    let out = output::render_single(global.output, &item, detail, |i| i.state.clone());
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(name: &str, item_type: &str) -> Item {
        serde_json::from_value(json!({ "name": name, "type": item_type, "state": "ON" })).unwrap()
    }

    #[test]
    fn filters_by_name_and_type() {
        let args = ItemsArgs {
            filter: Some("light".into()),
            item_type: Some("switch".into()),
        };
        assert!(matches(&item("Kitchen_Light", "Switch"), &args));
        assert!(!matches(&item("Kitchen_Light", "Dimmer"), &args));
        assert!(!matches(&item("Heater", "Switch"), &args));

        let any = ItemsArgs {
            filter: None,
            item_type: None,
        };
        assert!(matches(&item("Heater", "Number"), &any));
    }

    #[test]
    fn detail_lists_members() {
        let group: Item = serde_json::from_value(json!({
            "name": "Lights",
            "type": "Group",
            "state": "ON",
            "members": [{ "name": "Hall", "type": "Switch", "state": "OFF" }]
        }))
        .unwrap();
        let text = detail(&group);
        assert!(text.contains("Members:\n  Hall = OFF"), "{text}");
    }
}
