// Connection parameters and base-URL assembly.
//
// Everything the REST client and the event stream need to reach a server
// lives in `ConnectionConfig`. The base URL is derived from it by a pure
// function so both sides agree on scheme, credentials, port, and path.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Protocol used when the configuration leaves it blank.
pub const DEFAULT_PROTOCOL: &str = "http";

/// Server generation. Selects the topic namespace of the event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerVersion {
    /// openHAB 2.x: topics under `smarthome/`.
    V2,
    /// openHAB 3.x and later: topics under `openhab/`.
    #[default]
    V3,
}

impl ServerVersion {
    /// Root namespace of every event topic.
    pub fn topic_namespace(self) -> &'static str {
        match self {
            Self::V2 => "smarthome",
            Self::V3 => "openhab",
        }
    }

    /// Prefix preceding the item name in item topics, e.g. `openhab/items/`.
    pub fn item_topic_prefix(self) -> String {
        format!("{}/items/", self.topic_namespace())
    }
}

/// Which slice of the event feed a stream subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicScope {
    /// Item events only (`<ns>/items`). Used by a controller.
    Items,
    /// Every event the server publishes (`<ns>/*/*`). Used by an events monitor.
    All,
}

impl TopicScope {
    /// The `topics=` filter value for this scope.
    pub fn filter(self, version: ServerVersion) -> String {
        let ns = version.topic_namespace();
        match self {
            Self::Items => format!("{ns}/items"),
            Self::All => format!("{ns}/*/*"),
        }
    }
}

/// How to reach one server. Immutable once a controller starts.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// `http` or `https`. Blank means [`DEFAULT_PROTOCOL`].
    pub protocol: String,
    pub host: String,
    pub port: Option<u16>,
    /// Optional path the REST API is mounted under (reverse proxies).
    pub path: String,
    pub username: String,
    pub password: Option<SecretString>,
    /// API token sent as `Authorization: Bearer`.
    pub token: Option<SecretString>,
    pub version: ServerVersion,
}

impl ConnectionConfig {
    /// Config pointing at `host` with every other field defaulted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// The base URL all endpoints hang off. See [`build_connection_string`].
    pub fn base_url(&self) -> String {
        build_connection_string(self)
    }

    /// `true` if a non-empty bearer token is configured.
    pub fn has_token(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|t| !t.expose_secret().is_empty())
    }

    /// Full URL of the event stream for the given scope.
    pub fn events_url(&self, scope: TopicScope) -> String {
        format!(
            "{}/rest/events?topics={}",
            self.base_url(),
            scope.filter(self.version)
        )
    }
}

/// Assemble `scheme://[user[:pass]@]host[:port][/path]`.
///
/// Credentials are embedded only when both username and password are
/// non-empty after trimming. The username is trimmed, the password is
/// taken as given. The path loses all leading and trailing
/// slashes and is re-joined with exactly one leading slash.
pub fn build_connection_string(config: &ConnectionConfig) -> String {
    let protocol = config.protocol.trim();
    let mut url = if protocol.is_empty() {
        DEFAULT_PROTOCOL.to_owned()
    } else {
        protocol.to_owned()
    };
    url.push_str("://");

    let username = config.username.trim();
    let password = config
        .password
        .as_ref()
        .map(ExposeSecret::expose_secret)
        .unwrap_or_default();
    if !username.is_empty() && !password.trim().is_empty() {
        url.push_str(&urlencoding::encode(username));
        url.push(':');
        url.push_str(&urlencoding::encode(password));
        url.push('@');
    }

    url.push_str(config.host.trim());

    if let Some(port) = config.port {
        url.push(':');
        url.push_str(&port.to_string());
    }

    let path = config.path.trim().trim_matches('/');
    if !path.is_empty() {
        url.push('/');
        url.push_str(path);
    }

    url
}
