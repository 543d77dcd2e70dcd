//! `send` and `update`: write to one item through an item writer.

use habflow_core::nodes::{ItemWriter, ItemWriterConfig, WriteOutcome};
use habflow_core::{ControlIntent, Controller, FlowMessage};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub async fn send(
    controller: &Controller,
    item: &str,
    command: &str,
    if_changed: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let intent = ControlIntent::ItemCommand;
    write(controller, item, intent, command, if_changed, global).await
}

pub async fn update(
    controller: &Controller,
    item: &str,
    state: &str,
    if_changed: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let intent = ControlIntent::ItemUpdate;
    write(controller, item, intent, state, if_changed, global).await
}

async fn write(
    controller: &Controller,
    item: &str,
    intent: ControlIntent,
    value: &str,
    only_when_changed: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let writer = ItemWriter::attach(
        controller.clone(),
        ItemWriterConfig {
            controller: controller.name().to_owned(),
            item: Some(item.to_owned()),
            topic: Some(intent.to_string()),
            payload: Some(value.to_owned()),
            only_when_changed,
        },
    );

    let msg = FlowMessage::new().with_item(item);
    match writer.handle(msg).await? {
        WriteOutcome::Written(msg) if global.output != OutputFormat::Table => {
            let out = output::render_single(
                global.output,
                &msg,
                |_| String::new(),
                |m| format!("{} {value}", m.item.as_deref().unwrap_or(item)),
            );
            output::print_output(&out, global.quiet);
        }
        WriteOutcome::Written(_) => {
            if !global.quiet {
                eprintln!("✓ {intent} {value} -> {item}");
            }
        }
        WriteOutcome::Unchanged { state } => {
            if !global.quiet {
                eprintln!("  {item} already {state}");
            }
        }
    }
    Ok(())
}
