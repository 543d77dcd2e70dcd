// habflow-api: Async Rust client for the openHAB REST API and event stream

pub mod auth;
pub mod connection;
pub mod error;
pub mod events;
pub mod models;
pub mod rest;
pub mod retry;
pub mod transport;

pub use auth::{AuthStrategy, auth_headers};
pub use connection::{
    ConnectionConfig, DEFAULT_PROTOCOL, ServerVersion, TopicScope, build_connection_string,
};
pub use error::Error;
pub use events::{
    EventStream, EventStreamHandle, SseDecoder, SseFrame, StreamSignal, StreamState,
    StreamTuning, extract_item_name, parse_frame,
};
pub use models::{EventKind, Item, NULL_STATE, StreamEvent, is_null_state};
pub use rest::{ControlIntent, ControlReply, RestClient};
pub use retry::{FixedRetry, RetryOutcome};
pub use transport::{TlsMode, TransportConfig};
