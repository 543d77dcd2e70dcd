//! Long-running commands: `watch` follows items through a controller,
//! `events` prints the unfiltered server feed.

use tokio::sync::mpsc;
use tracing::{debug, info};

use habflow_core::nodes::{ConnectionMonitor, EventsMonitor, ItemListener, ItemListenerConfig};
use habflow_core::{Controller, ControllerRegistry, DispatchPolicy, FlowMessage};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

/// Dispatch policy described by the watch flags.
fn policy(args: &WatchArgs) -> DispatchPolicy {
    let mut policy = DispatchPolicy::default();
    if args.updates {
        policy = policy.when_updated();
    }
    if args.commands {
        policy = policy.when_command();
    }
    if args.changes || !(args.updates || args.commands) {
        policy = policy.when_changed();
    }
    if let Some(ref from) = args.changed_from {
        policy = policy.changed_from(from.clone());
    }
    if let Some(ref to) = args.changed_to {
        policy = policy.changed_to(to.clone());
    }
    policy.include_group_changes(!args.no_group_changes)
}

/// Print messages from `rx` until it closes or Ctrl-C arrives.
async fn print_until_interrupted(
    mut rx: mpsc::UnboundedReceiver<FlowMessage>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    loop {
        tokio::select! {
            biased;
            res = tokio::signal::ctrl_c() => {
                res?;
                debug!("interrupted");
                return Ok(());
            }
            msg = rx.recv() => match msg {
                Some(msg) => output::print_output(
                    &output::render_message(global.output, &msg, color),
                    global.quiet,
                ),
                None => return Ok(()),
            },
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn watch(
    controller: &Controller,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let registry = ControllerRegistry::new();
    registry.register(controller.clone());

    let (merged_tx, merged_rx) = mpsc::unbounded_channel();

    // Connection state always goes to stderr via the monitor.
    let (monitor, outputs) = ConnectionMonitor::attach(controller);
    let mut status = outputs.status;
    let mut errors = outputs.errors;
    let quiet = global.quiet;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = status.recv() => {
                    if !quiet {
                        eprintln!("[status] {}", msg.payload_text().unwrap_or_default());
                    }
                }
                Some(msg) = errors.recv() => {
                    eprintln!("[error] {}", msg.payload_text().unwrap_or_default());
                }
                else => break,
            }
        }
    });

    let mut listeners = Vec::with_capacity(args.item.len());
    if args.item.is_empty() {
        forward(outputs.events, merged_tx.clone());
    } else {
        let policy = policy(&args);
        for item in &args.item {
            let config = ItemListenerConfig {
                policy: policy.clone(),
                initial_state: args.initial,
                fetch_initial: false,
                ..ItemListenerConfig::new(controller.name(), item.as_str())
            };
            let (listener, rx) = ItemListener::start(&registry, config)?;
            listeners.push(listener);
            forward(rx, merged_tx.clone());
        }
    }
    drop(merged_tx);

    controller.start().await?;
    info!(items = args.item.len(), "watching");

    let result = print_until_interrupted(merged_rx, global).await;

    drop(listeners);
    drop(monitor);
    registry.shutdown_all().await;
    result
}

pub async fn events(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let (monitor, rx) = EventsMonitor::attach(controller)?;
    let result = print_until_interrupted(rx, global).await;
    monitor.stop().await;
    result
}

fn forward(
    mut rx: mpsc::UnboundedReceiver<FlowMessage>,
    tx: mpsc::UnboundedSender<FlowMessage>,
) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if tx.send(msg).is_err() {
                break;
            }
        }
    });
}
