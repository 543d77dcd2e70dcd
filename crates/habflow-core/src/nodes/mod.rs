//! Flow nodes: thin bindings between a controller and the automation host.
//!
//! Event-driven nodes ([`ItemListener`], [`ConnectionMonitor`],
//! [`EventsMonitor`]) push [`FlowMessage`]s onto unbounded channels.
//! Request-driven nodes ([`ItemWriter`], [`ItemReader`]) return their
//! result from `handle()`.

pub mod events;
pub mod listener;
pub mod message;
pub mod monitor;
pub mod reader;
pub mod writer;

pub use events::EventsMonitor;
pub use listener::{INITIAL_STATE_EVENT, ItemListener, ItemListenerConfig, ItemSnapshot};
pub use message::FlowMessage;
pub use monitor::{ConnectionMonitor, MonitorOutputs};
pub use reader::{ACTUAL_VALUE_EVENT, ItemReader, ItemReaderConfig};
pub use writer::{ItemWriter, ItemWriterConfig, WriteOutcome};
