// ── Events monitor ──
//
// Opens a second stream on the owning controller's server, subscribed to
// every topic rather than item events only, and forwards each decoded
// event unfiltered.

use habflow_api::{EventStream, StreamSignal, TopicScope};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::controller::Controller;
use crate::error::CoreError;
use crate::nodes::message::FlowMessage;
use crate::registry::ControllerRegistry;

/// A running events monitor. Dropping it closes the stream.
#[derive(Debug)]
pub struct EventsMonitor {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventsMonitor {
    pub fn start(
        registry: &ControllerRegistry,
        controller: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FlowMessage>), CoreError> {
        Self::attach(&registry.resolve(controller)?)
    }

    /// Spawn a stream built from `controller.config()`. Must be called
    /// inside a Tokio runtime.
    pub fn attach(
        controller: &Controller,
    ) -> Result<(Self, mpsc::UnboundedReceiver<FlowMessage>), CoreError> {
        let config = controller.config();
        let stream = EventStream::new(
            &config.connection,
            TopicScope::All,
            &config.transport,
            config.stream.clone(),
        )?;
        debug!(url = %stream.url(), "starting events monitor");

        let cancel = CancellationToken::new();
        let (handle, signals) = stream.spawn(cancel.clone());
        let (output, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            forward_events(signals, output).await;
            handle.join().await;
        });

        Ok((
            Self {
                cancel,
                task: Some(task),
            },
            rx,
        ))
    }

    /// Close the stream and wait for the task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for EventsMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward_events(
    mut signals: mpsc::Receiver<StreamSignal>,
    output: mpsc::UnboundedSender<FlowMessage>,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            StreamSignal::Event(event) => {
                let mut msg = FlowMessage::new()
                    .with_topic(Some(event.topic.clone()))
                    .with_event(event.kind.as_str())
                    .with_payload(event.payload.clone());
                msg.item.clone_from(&event.item_name);
                msg.set_extra("type", event.kind.as_str());

                if output.send(msg).is_err() {
                    trace!("events monitor output closed");
                }
            }
            StreamSignal::TerminalError {
                status,
                message,
                attempt,
            } => {
                warn!(status, attempt, error = %message, "events stream failed, restarting after delay");
            }
            StreamSignal::TransientError(message) => {
                debug!(error = %message, "events stream interrupted");
            }
            StreamSignal::Opened => debug!("events stream opened"),
            StreamSignal::Closed => break,
        }
    }
}
