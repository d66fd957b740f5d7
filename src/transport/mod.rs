//! Transport module - the seam between the request engine and the network.
//!
//! Provides:
//! - [`Transport`] - sends one HTTP exchange and returns a buffered response
//! - [`HttpTransport`] - default implementation over a pooled `reqwest` client
//! - [`MockTransport`] - scripted in-process transport for tests
//!
//! A transport never retries and never classifies HTTP statuses; that is the
//! request engine's job. It only reports whether the exchange completed,
//! timed out, or failed below HTTP.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tinify_client::transport::{MockTransport, Transport};
//! use tinify_client::Response;
//!
//! let mock = Arc::new(MockTransport::new());
//! mock.push_response(Response::builder(201).header("Location", "/output/x").build());
//! let transport: Arc<dyn Transport> = mock.clone();
//! ```

mod http;
mod mock;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::{Method, Url};
use thiserror::Error;

use crate::response::Response;

pub use http::{HttpTransport, TrustPolicy, DEFAULT_POOL_IDLE_TIMEOUT};
pub use mock::MockTransport;

/// Boxed future returned by [`Transport::send`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure below the HTTP layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The exchange was cancelled or timed out.
    #[error("timeout")]
    Timeout(#[source] Option<Box<dyn std::error::Error + Send + Sync>>),

    /// DNS, socket, TLS or protocol failure. The message is the innermost cause.
    #[error("{message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TransportError {
    /// Network failure with a plain message.
    pub fn network(message: impl Into<String>) -> Self {
        TransportError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this failure is a timeout.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Sends HTTP requests.
///
/// Implementations must be cheap to share; the connection registry stores
/// them behind `Arc` and uses the allocation address as the transport's
/// identity.
pub trait Transport: Send + Sync + 'static {
    /// Send one request and buffer the full response.
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>>;
}

/// Request payload with its content type.
///
/// Backed by `Bytes`, so it can be sent any number of times; a retried
/// request always carries the full payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    bytes: Bytes,
    content_type: Option<&'static str>,
}

impl Body {
    /// Raw binary payload, sent without a `Content-Type`.
    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
        }
    }

    /// JSON payload, sent as `application/json`.
    pub fn json(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: Some("application/json"),
        }
    }

    /// Payload bytes.
    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Content type, if one should be sent.
    #[inline]
    pub fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }
}

/// One outgoing HTTP request.
///
/// The body is `Bytes`, so re-sending the same request on retry always
/// sends the full payload.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl Request {
    /// Create a request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// HTTP method.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute target URL.
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers as (name, value) pairs.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of the header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body bytes, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_headers() {
        let url = Url::parse("https://api.tinify.com/shrink").unwrap();
        let req = Request::new(Method::POST, url)
            .with_header("Authorization", "Basic abc")
            .with_body(Bytes::from_static(b"png"));

        assert_eq!(*req.method(), Method::POST);
        assert_eq!(req.header("authorization"), Some("Basic abc"));
        assert_eq!(req.body().map(|b| b.as_ref()), Some(&b"png"[..]));
    }

    #[test]
    fn test_body_content_types() {
        assert_eq!(Body::binary(vec![1u8, 2, 3]).content_type(), None);
        let json = Body::json(r#"{"a":1}"#);
        assert_eq!(json.content_type(), Some("application/json"));
        assert_eq!(json.bytes().as_ref(), br#"{"a":1}"#);
    }

    #[test]
    fn test_transport_error_kinds() {
        assert!(TransportError::Timeout(None).is_timeout());
        let err = TransportError::network("connection refused");
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "connection refused");
    }
}
