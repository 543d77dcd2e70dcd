// REST control client
//
// Thin wrapper over `reqwest::Client` for the item endpoints. Auth is
// carried either by a default `Authorization` header (token) or by
// credentials embedded in the base URL, which reqwest turns into basic
// auth. Failures never get retried here: they go straight back to the
// caller, who decides whether to broadcast them.

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

use crate::auth::auth_headers;
use crate::connection::ConnectionConfig;
use crate::error::{Error, MAX_FAILURE_LEN, truncate};
use crate::models::Item;
use crate::transport::TransportConfig;

/// What a control request does to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum ControlIntent {
    /// Read the item (`GET /rest/items/{name}`).
    StateFetch,
    /// Set the state without triggering bindings (`PUT .../state`).
    ItemUpdate,
    /// Send a command to the item (`POST /rest/items/{name}`).
    ItemCommand,
}

impl ControlIntent {
    /// Map a flow message topic to an intent. Anything that is not
    /// `ItemUpdate` or `ItemCommand` reads the state.
    pub fn from_topic(topic: &str) -> Self {
        topic.parse().unwrap_or(Self::StateFetch)
    }
}

/// Successful result of [`RestClient::control`].
#[derive(Debug, Clone, PartialEq)]
pub enum ControlReply {
    /// The item as returned by a state fetch.
    State(Item),
    /// The server accepted an update or command.
    Accepted,
}

/// HTTP client for `/rest/items`.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Build a client for the server described by `config`.
    pub fn new(config: &ConnectionConfig, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client(auth_headers(config)?)?;
        Ok(Self::with_client(http, config.base_url()))
    }

    /// Wrap a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn items_url(&self) -> String {
        format!("{}/rest/items", self.base_url)
    }

    fn item_url(&self, name: &str) -> String {
        format!("{}/rest/items/{}", self.base_url, urlencoding::encode(name))
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /rest/items`, the full item list.
    pub async fn list_items(&self) -> Result<Vec<Item>, Error> {
        self.get_json(&self.items_url()).await
    }

    /// `GET /rest/items/{name}`.
    pub async fn get_item(&self, name: &str) -> Result<Item, Error> {
        self.get_json(&self.item_url(name)).await
    }

    /// `PUT /rest/items/{name}/state` with a plain-text body.
    pub async fn update_state(&self, name: &str, state: &str) -> Result<(), Error> {
        let url = format!("{}/state", self.item_url(name));
        self.send_text(Method::PUT, &url, state).await
    }

    /// `POST /rest/items/{name}` with a plain-text body.
    pub async fn send_command(&self, name: &str, command: &str) -> Result<(), Error> {
        self.send_text(Method::POST, &self.item_url(name), command)
            .await
    }

    /// Dispatch a control request by intent. `payload` is ignored for
    /// [`ControlIntent::StateFetch`].
    pub async fn control(
        &self,
        item: &str,
        intent: ControlIntent,
        payload: &str,
    ) -> Result<ControlReply, Error> {
        match intent {
            ControlIntent::StateFetch => self.get_item(item).await.map(ControlReply::State),
            ControlIntent::ItemUpdate => {
                self.update_state(item, payload).await?;
                Ok(ControlReply::Accepted)
            }
            ControlIntent::ItemCommand => {
                self.send_command(item, payload).await?;
                Ok(ControlReply::Accepted)
            }
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        debug!(url = %crate::error::redact_url(url), "GET");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::transport(&Method::GET, url, &e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::status(&Method::GET, url, status));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::transport(&Method::GET, url, &e))?;

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: truncate(&body, MAX_FAILURE_LEN),
        })
    }

    async fn send_text(&self, method: Method, url: &str, body: &str) -> Result<(), Error> {
        debug!(%method, url = %crate::error::redact_url(url), body, "sending");

        let resp = self
            .http
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "text/plain")
            .body(body.to_owned())
            .send()
            .await
            .map_err(|e| Error::transport(&method, url, &e))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::status(&method, url, status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_from_topic() {
        assert_eq!(ControlIntent::from_topic("ItemUpdate"), ControlIntent::ItemUpdate);
        assert_eq!(ControlIntent::from_topic("ItemCommand"), ControlIntent::ItemCommand);
        assert_eq!(ControlIntent::from_topic(""), ControlIntent::StateFetch);
        assert_eq!(ControlIntent::from_topic("itemcommand"), ControlIntent::StateFetch);
        assert_eq!(ControlIntent::ItemUpdate.as_ref(), "ItemUpdate");
    }

    #[test]
    fn item_names_are_encoded() {
        let client = RestClient::with_client(reqwest::Client::new(), "http://h:8080/".into());
        assert_eq!(client.base_url(), "http://h:8080");
        assert_eq!(client.item_url("a b"), "http://h:8080/rest/items/a%20b");
    }
}
