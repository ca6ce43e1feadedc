//! Authenticated access to the PassiveTotal REST API

pub mod classify;
pub mod endpoints;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, Proxy};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

pub use classify::{GatewayError, LIMITER_STATUSES, classify_response};

/// Vendor API location and basic auth pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    pub api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// A GET request relative to the configured host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub path: String,
    pub query: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: vec![],
        }
    }

    pub fn query(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    /// Value of a query parameter, if set
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A single round trip to the vendor, already classified.
///
/// `Ok(None)` means the vendor has nothing for the query.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VendorApi: Send + Sync {
    async fn get(
        &self,
        credentials: &Credentials,
        request: ApiRequest,
    ) -> Result<Option<Value>, GatewayError>;
}

/// Issue a request and parse the body into a typed response
pub async fn fetch<T: DeserializeOwned>(
    api: &dyn VendorApi,
    credentials: &Credentials,
    request: ApiRequest,
) -> Result<Option<T>, GatewayError> {
    let path = request.path.clone();
    let Some(body) = api.get(credentials, request).await? else {
        return Ok(None);
    };

    serde_json::from_value(body)
        .map(Some)
        .map_err(|e| GatewayError::Decode {
            message: format!("{}: {}", path, e),
        })
}

/// Static HTTP client settings read once at startup
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// PEM client certificate
    pub cert: Option<PathBuf>,
    /// PEM private key for `cert`
    pub key: Option<PathBuf>,
    pub passphrase: Option<String>,
    /// Additional PEM root certificate
    pub ca: Option<PathBuf>,
    pub proxy: Option<String>,
    pub reject_unauthorized: bool,
    pub timeout: Option<Duration>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            cert: None,
            key: None,
            passphrase: None,
            ca: None,
            proxy: None,
            reject_unauthorized: true,
            timeout: None,
        }
    }
}

/// `reqwest` implementation of [`VendorApi`]
#[derive(Debug, Clone)]
pub struct PassiveTotalClient {
    client: Client,
}

impl PassiveTotalClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(concat!("ptintel/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!settings.reject_unauthorized);

        if settings.passphrase.as_deref().is_some_and(|p| !p.is_empty()) {
            return Err(Error::ClientConfig(
                "PT_CLIENT_KEY_PASSPHRASE is set but encrypted private keys are not supported; \
                 provide an unencrypted PEM key"
                    .to_string(),
            ));
        }

        match (&settings.cert, &settings.key) {
            (Some(cert), key) => {
                let mut pem = read_file(cert, "client certificate")?;
                if let Some(key) = key {
                    pem.push(b'\n');
                    pem.extend(read_file(key, "client key")?);
                }
                let identity = Identity::from_pem(&pem)
                    .map_err(|e| Error::ClientConfig(format!("client identity: {}", e)))?;
                builder = builder.identity(identity);
            }
            (None, Some(_)) => {
                return Err(Error::ClientConfig(
                    "a client key was configured without a client certificate".to_string(),
                ));
            }
            (None, None) => {}
        }

        if let Some(ca) = &settings.ca {
            let certificate = Certificate::from_pem(&read_file(ca, "CA certificate")?)
                .map_err(|e| Error::ClientConfig(format!("CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }

        if let Some(proxy) = settings.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::ClientConfig(format!("proxy `{}`: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::ClientConfig(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl VendorApi for PassiveTotalClient {
    async fn get(
        &self,
        credentials: &Credentials,
        request: ApiRequest,
    ) -> Result<Option<Value>, GatewayError> {
        let url = format!("{}{}", credentials.host.trim_end_matches('/'), request.path);

        let response = self
            .client
            .get(&url)
            .basic_auth(&credentials.user, Some(&credentials.api_key))
            .header("Accept", "application/json")
            .query(&request.query)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_error)?;

        tracing::debug!(path = %request.path, status, "PassiveTotal request completed");

        classify_response(status, &body)
    }
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>, Error> {
    std::fs::read(path)
        .map_err(|e| Error::ClientConfig(format!("failed to read {} {}: {}", what, path.display(), e)))
}

fn network_error(error: reqwest::Error) -> GatewayError {
    GatewayError::Network {
        connection_reset: is_connection_reset(&error),
        message: error.to_string(),
    }
}

/// Walk the source chain looking for a peer reset
fn is_connection_reset(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        source = err.source();
    }
    false
}
