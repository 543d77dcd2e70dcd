//! Controller layer between `habflow-api` and flow hosts (CLI, automation runtimes).
//!
//! - **[`Controller`]**: owns one server connection: the REST client, the
//!   reconnecting item event stream, and a router task that turns stream
//!   signals into bus notifications. Every successful open triggers an
//!   initial-state sync that replays item states on `<item>/InitialEvent`.
//!
//! - **[`NotificationBus`]**: synchronous, in-process publish/subscribe
//!   keyed by [`Topic`]. Handlers run in subscription order; a panicking
//!   handler is isolated from the rest.
//!
//! - **[`DispatchPolicy`]**: pure predicate deciding which stream events a
//!   subscriber turns into messages.
//!
//! - **[`nodes`]**: item listener, connection monitor, writer, reader and
//!   events monitor, resolved by name through a [`ControllerRegistry`].

pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod nodes;
pub mod registry;
mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{ConnectionStatus, Notification, NotificationBus, SubscriptionId, Topic};
pub use config::{ControllerConfig, DEFAULT_CONTROLLER_NAME};
pub use controller::Controller;
pub use error::CoreError;
pub use filter::DispatchPolicy;
pub use nodes::FlowMessage;
pub use registry::ControllerRegistry;

pub use habflow_api::{
    ConnectionConfig, ControlIntent, ControlReply, EventKind, Item, ServerVersion, StreamEvent,
    StreamState, StreamTuning, TlsMode, TransportConfig,
};
