// Shared transport configuration for building reqwest::Client instances.
//
// The REST client and the event stream share TLS, auth header, and
// connect settings through this module. They differ only in the overall
// request timeout: control requests are bounded, the stream is not.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::error::Error;

const USER_AGENT: &str = concat!("habflow/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (self-signed home servers).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Upper bound for a single control request.
    pub timeout: Duration,
    /// Upper bound for establishing a TCP/TLS connection (stream included).
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Build the client used for bounded request/response calls.
    pub fn build_client(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        self.builder(headers)?
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Build the client used for the long-lived event stream.
    ///
    /// No overall timeout: the response body stays open for as long as the
    /// server keeps the connection.
    pub fn build_streaming_client(&self, headers: HeaderMap) -> Result<reqwest::Client, Error> {
        self.builder(headers)?
            .build()
            .map_err(|e| Error::Tls(format!("failed to build streaming client: {e}")))
    }

    fn builder(&self, headers: HeaderMap) -> Result<reqwest::ClientBuilder, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        Ok(builder)
    }
}
