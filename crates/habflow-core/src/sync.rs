// ── Initial-state synchronizer ──
//
// Runs after every successful stream open. Polls `/rest/items` on a fixed
// delay until the server returns at least one item, then announces the
// connection and replays each item's state on its InitialEvent topic.

use std::sync::Arc;

use habflow_api::{FixedRetry, Item, RestClient, RetryOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{ConnectionStatus, Notification, NotificationBus, Topic};

/// Fetch the item list until it is non-empty, then publish
/// `CommunicationStatus=ON` followed by one InitialEvent per item.
///
/// Returns the number of items replayed, or `None` if cancelled first.
pub(crate) async fn run_initial_sync(
    rest: &RestClient,
    bus: &NotificationBus,
    retry: FixedRetry,
    cancel: &CancellationToken,
) -> Option<usize> {
    let items = retry
        .run(cancel, |attempt| async move {
            match rest.list_items().await {
                Ok(items) if items.is_empty() => {
                    info!(attempt, "server reports no items yet, rescheduling initial sync");
                    RetryOutcome::Retry
                }
                Ok(items) => RetryOutcome::Done(items),
                Err(e) if e.is_not_ready() => {
                    debug!(attempt, error = %e, "server not ready, rescheduling initial sync");
                    RetryOutcome::Retry
                }
                Err(e) => {
                    warn!(attempt, error = %e, "initial sync failed");
                    bus.publish(&Topic::CommunicationError, &Notification::Error(e.to_string()));
                    RetryOutcome::Retry
                }
            }
        })
        .await?;

    // A shutdown may land between the fetch and the replay.
    if cancel.is_cancelled() {
        return None;
    }

    info!(count = items.len(), "connection established, replaying initial states");
    bus.publish(
        &Topic::CommunicationStatus,
        &Notification::Status(ConnectionStatus::On),
    );
    let count = items.len();
    for item in items {
        publish_initial(bus, item);
    }
    Some(count)
}

fn publish_initial(bus: &NotificationBus, item: Item) {
    let topic = Topic::item_initial(item.name.clone());
    bus.publish(&topic, &Notification::Initial(Arc::new(item)));
}
