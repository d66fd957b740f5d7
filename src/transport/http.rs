//! Default transport over a pooled `reqwest` client.
//!
//! The client is built without a request timeout: cancellation and timeout
//! policy belong to the request engine. Pooled connections that sit idle
//! for [`DEFAULT_POOL_IDLE_TIMEOUT`] are closed; reqwest has no maximum
//! connection age, so a busy connection is kept for as long as it is used.
//!
//! Redirects follow reqwest's default policy (up to ten hops). A 3xx that
//! still reaches the engine, for example past that limit, is reported as a
//! Connection error carrying the status.
//!
//! # Example
//!
//! ```ignore
//! use tinify_client::transport::{HttpTransport, TrustPolicy};
//!
//! let pem = std::fs::read("corporate-proxy-ca.pem")?;
//! let transport = HttpTransport::new(&TrustPolicy::WithRoots(pem))?;
//! ```

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::{BoxFuture, Request, Transport, TransportError};
use crate::error::{Result, TinifyError};
use crate::response::Response;

/// How long a pooled connection may sit unused before it is closed.
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Which certificate authorities the default transport trusts.
#[derive(Debug, Clone, Default)]
pub enum TrustPolicy {
    /// Built-in WebPKI roots.
    #[default]
    Default,
    /// Built-in roots plus every certificate in the PEM bundle.
    WithRoots(Vec<u8>),
    /// Only the certificates in the PEM bundle.
    OnlyRoots(Vec<u8>),
}

/// Transport backed by a `reqwest::Client` with connection pooling.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given trust policy.
    pub fn new(trust: &TrustPolicy) -> Result<Self> {
        Self::with_pool_idle_timeout(trust, DEFAULT_POOL_IDLE_TIMEOUT)
    }

    /// Build a transport whose pooled connections close after `idle` without use.
    pub fn with_pool_idle_timeout(trust: &TrustPolicy, idle: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder().pool_idle_timeout(idle);

        match trust {
            TrustPolicy::Default => {}
            TrustPolicy::WithRoots(pem) => {
                for cert in parse_bundle(pem)? {
                    builder = builder.add_root_certificate(cert);
                }
            }
            TrustPolicy::OnlyRoots(pem) => {
                builder = builder.tls_built_in_root_certs(false);
                for cert in parse_bundle(pem)? {
                    builder = builder.add_root_certificate(cert);
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| TinifyError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an already configured `reqwest::Client`.
    ///
    /// The client should not carry a request timeout of its own.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn exchange(&self, request: Request) -> std::result::Result<Response, TransportError> {
        let mut headers = HeaderMap::with_capacity(request.headers().len());
        for (name, value) in request.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::network(format!("invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::network(format!("invalid header value: {}", e)))?;
            headers.append(name, value);
        }

        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(headers);
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(v) => Some((name.as_str().to_string(), v.to_string())),
                Err(_) => {
                    tracing::warn!("Ignoring non-UTF-8 value for header {}", name);
                    None
                }
            })
            .collect();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(Response::new(status, headers, body))
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> BoxFuture<'_, std::result::Result<Response, TransportError>> {
        Box::pin(self.exchange(request))
    }
}

fn parse_bundle(pem: &[u8]) -> Result<Vec<reqwest::Certificate>> {
    let certs = reqwest::Certificate::from_pem_bundle(pem)
        .map_err(|e| TinifyError::Config(format!("invalid certificate bundle: {}", e)))?;
    if certs.is_empty() {
        return Err(TinifyError::Config(
            "certificate bundle contains no certificates".to_string(),
        ));
    }
    Ok(certs)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout(Some(Box::new(err)));
    }
    TransportError::Network {
        message: innermost_message(&err),
        source: Some(Box::new(err)),
    }
}

/// Message of the deepest error in the `source()` chain.
fn innermost_message(err: &(dyn StdError + 'static)) -> String {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}
