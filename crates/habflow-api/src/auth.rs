use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use crate::connection::ConnectionConfig;
use crate::error::Error;

/// Which authentication mechanism a connection ends up using.
///
/// Marker enum (no data) -- the actual secrets live in [`ConnectionConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// `Authorization: Bearer <token>` header.
    Bearer,
    /// Basic credentials embedded in the base URL.
    UrlCredentials,
    /// Anonymous access.
    None,
}

impl AuthStrategy {
    /// The strategy a config resolves to. A token wins over credentials.
    pub fn for_config(config: &ConnectionConfig) -> Self {
        if config.has_token() {
            Self::Bearer
        } else if config.base_url().contains('@') {
            Self::UrlCredentials
        } else {
            Self::None
        }
    }
}

/// Default headers carrying the bearer token, or an empty map without one.
pub fn auth_headers(config: &ConnectionConfig) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    let Some(token) = config.token.as_ref().filter(|_| config.has_token()) else {
        return Ok(headers);
    };

    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|e| Error::InvalidHeader(e.to_string()))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}
