//! Client builder and upload entry points.
//!
//! The [`ClientBuilder`] collects the API key and request policy, then binds
//! them to a pooled connection from a [`ConnectionRegistry`]. The [`Client`]
//! uploads images and hands back [`ShrinkResult`] handles.
//!
//! # Example
//!
//! ```ignore
//! use tinify_client::{Client, ConnectionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> tinify_client::Result<()> {
//!     let registry = ConnectionRegistry::new();
//!     let client = Client::builder("YOUR_API_KEY")
//!         .retry_delay(std::time::Duration::from_millis(250))
//!         .build(&registry)?;
//!
//!     let shrunk = client.shrink_from_file("unoptimized.png").await?;
//!     shrunk.to_file("optimized.png").await?;
//!     println!("Compressions this month: {}", client.compression_count());
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Method, Url};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::engine::{RequestEngine, RetryPolicy};
use crate::error::{ErrorKind, Result, TinifyError};
use crate::registry::{CompressionCounter, Connection, ConnectionRegistry};
use crate::shrink::ShrinkResult;
use crate::transport::{Body, Transport};

/// Default API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.tinify.com";

/// Environment variable holding the API key for [`ClientBuilder::from_env`].
pub const API_KEY_ENV: &str = "TINIFY_API_KEY";

/// Environment variable overriding the endpoint for [`ClientBuilder::from_env`].
pub const ENDPOINT_ENV: &str = "TINIFY_ENDPOINT";

const SHRINK_PATH: &str = "/shrink";

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    api_key: String,
    endpoint: String,
    transport: Option<Arc<dyn Transport>>,
    retry: RetryPolicy,
    request_timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Create a builder for `api_key` with default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            transport: None,
            retry: RetryPolicy::default(),
            request_timeout: None,
        }
    }

    /// Create a builder from `TINIFY_API_KEY` and, if set, `TINIFY_ENDPOINT`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| TinifyError::Config(format!("{} is not set", API_KEY_ENV)))?;
        let mut builder = Self::new(api_key);
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                builder = builder.endpoint(endpoint);
            }
        }
        Ok(builder)
    }

    /// Set the API endpoint.
    ///
    /// Default: `https://api.tinify.com`
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use a custom transport instead of the registry's pooled HTTP client.
    ///
    /// Connections are pooled per transport instance, so passing the same
    /// `Arc` to several builders shares one connection.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the pause before a retry.
    ///
    /// Default: 500 ms
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.delay = delay;
        self
    }

    /// Set how many times a failed attempt is retried.
    ///
    /// Default: 1
    pub fn retries(mut self, retries: u32) -> Self {
        self.retry.retries = retries;
        self
    }

    /// Abort an attempt that takes longer than `timeout`. Counts as a
    /// transport timeout and is retried like one.
    ///
    /// Default: no timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the client, acquiring its connection from `registry`.
    pub fn build(self, registry: &ConnectionRegistry) -> Result<Client> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(TinifyError::Config("API key must not be empty".to_string()));
        }
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| TinifyError::Config(format!("invalid endpoint {:?}: {}", self.endpoint, e)))?;

        let connection = registry.acquire(api_key, &endpoint, self.transport)?;
        let engine = RequestEngine::new(
            connection,
            registry.counter().clone(),
            self.retry,
            self.request_timeout,
        );
        tracing::debug!(
            "Client ready for {} (retries {}, delay {:?})",
            endpoint,
            self.retry.retries,
            self.retry.delay
        );

        Ok(Client {
            engine: Arc::new(engine),
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("endpoint", &self.endpoint)
            .field("custom_transport", &self.transport.is_some())
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Client for the image optimization API.
///
/// Cheap to clone; clones share the engine and connection.
#[derive(Debug, Clone)]
pub struct Client {
    engine: Arc<RequestEngine>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Upload raw image bytes.
    pub async fn shrink_from_buffer(&self, data: impl Into<Bytes>) -> Result<ShrinkResult> {
        self.upload(Some(Body::binary(data))).await
    }

    /// Read a file and upload its contents.
    pub async fn shrink_from_file(&self, path: impl AsRef<Path>) -> Result<ShrinkResult> {
        let data = tokio::fs::read(path).await?;
        self.shrink_from_buffer(data).await
    }

    /// Drain `reader` and upload what it produced.
    ///
    /// The whole input is buffered first so a retry re-sends it in full.
    pub async fn shrink_from_reader<R: AsyncRead + Unpin>(&self, mut reader: R) -> Result<ShrinkResult> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        self.shrink_from_buffer(data).await
    }

    /// Ask the service to download and compress the image at `url`.
    pub async fn shrink_from_url(&self, url: &str) -> Result<ShrinkResult> {
        let body = serde_json::json!({ "source": { "url": url } });
        self.upload(Some(Body::json(serde_json::to_vec(&body)?))).await
    }

    async fn upload(&self, body: Option<Body>) -> Result<ShrinkResult> {
        let response = self.engine.execute(Method::POST, SHRINK_PATH, body).await?;
        ShrinkResult::from_response(response, Arc::clone(&self.engine))
    }

    /// Check that the API key is accepted.
    ///
    /// Sends an empty upload. A client error (or 429) means the key was
    /// recognized, so `Ok(true)`. An unexpected success is `Ok(false)`.
    /// Anything else, including 401, is returned as an error.
    pub async fn validate(&self) -> Result<bool> {
        match self.engine.execute(Method::POST, SHRINK_PATH, None).await {
            Ok(_) => Ok(false),
            Err(e) if e.kind() == ErrorKind::Client => Ok(true),
            Err(e) if e.kind() == ErrorKind::Account && e.status() == Some(429) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Last compression count reported by the service.
    ///
    /// Shared by every client built from the same registry: this is the most
    /// recent value any of them saw, not necessarily from this client's own
    /// last request.
    pub fn compression_count(&self) -> u32 {
        self.engine.counter().get()
    }

    /// The shared compression counter.
    pub fn counter(&self) -> &CompressionCounter {
        self.engine.counter()
    }

    /// The pooled connection this client sends over.
    pub fn connection(&self) -> &Arc<Connection> {
        self.engine.connection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DEFAULT_RETRIES, DEFAULT_RETRY_DELAY};
    use crate::response::Response;
    use crate::transport::MockTransport;

    fn mock_client(mock: &Arc<MockTransport>) -> Client {
        let transport: Arc<dyn Transport> = mock.clone();
        Client::builder("key")
            .transport(transport)
            .retry_delay(Duration::from_millis(1))
            .build(&ConnectionRegistry::new())
            .unwrap()
    }

    fn created() -> Response {
        Response::builder(201)
            .header("Location", "https://api.tinify.com/output/xyz")
            .header("Compression-Count", "12")
            .body(&br#"{"output":{"size":3,"type":"image/png"}}"#[..])
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new("key");
        assert_eq!(builder.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(builder.retry.retries, DEFAULT_RETRIES);
        assert_eq!(builder.retry.delay, DEFAULT_RETRY_DELAY);
        assert!(builder.request_timeout.is_none());
        assert!(builder.transport.is_none());
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = Client::builder("key")
            .endpoint("https://example.test")
            .retries(3)
            .retry_delay(Duration::from_millis(10))
            .request_timeout(Duration::from_secs(2));

        assert_eq!(builder.endpoint, "https://example.test");
        assert_eq!(builder.retry.retries, 3);
        assert_eq!(builder.retry.delay, Duration::from_millis(10));
        assert_eq!(builder.request_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_blank_key_rejected() {
        let err = Client::builder("  ").build(&ConnectionRegistry::new()).unwrap_err();
        assert!(matches!(err, TinifyError::Config(_)));
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let err = Client::builder("key")
            .endpoint("not a url")
            .build(&ConnectionRegistry::new())
            .unwrap_err();
        assert!(matches!(err, TinifyError::Config(_)));
    }

    #[tokio::test]
    async fn test_shrink_from_buffer() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(created());
        let client = mock_client(&mock);

        let shrunk = client.shrink_from_buffer(&b"png"[..]).await.unwrap();

        assert_eq!(shrunk.location().as_str(), "https://api.tinify.com/output/xyz");
        assert_eq!(shrunk.size(), Some(3));
        assert_eq!(client.compression_count(), 12);

        let request = mock.last_request().unwrap();
        assert_eq!(*request.method(), Method::POST);
        assert_eq!(request.url().as_str(), "https://api.tinify.com/shrink");
        assert_eq!(request.body().map(|b| b.as_ref()), Some(&b"png"[..]));
        assert!(request.header("Content-Type").is_none());
    }

    #[tokio::test]
    async fn test_shrink_from_url_body() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(created());
        let client = mock_client(&mock);

        client.shrink_from_url("https://example.com/a.png").await.unwrap();

        let request = mock.last_request().unwrap();
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(request.body().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({"source": {"url": "https://example.com/a.png"}}));
    }

    #[tokio::test]
    async fn test_shrink_from_reader_buffers_input() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure("reset");
        mock.push_response(created());
        let client = mock_client(&mock);

        client.shrink_from_reader(&b"reader bytes"[..]).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert_eq!(request.body().map(|b| b.as_ref()), Some(&b"reader bytes"[..]));
        }
    }

    #[tokio::test]
    async fn test_validate_outcomes() {
        let cases: [(u16, &'static [u8], bool); 3] = [
            (400, br#"{"error":"InputMissing","message":"No input"}"#, true),
            (429, br#"{"error":"TooManyRequests","message":"Limit"}"#, true),
            (201, b"", false),
        ];
        for (status, body, expected) in cases {
            let mock = Arc::new(MockTransport::new());
            mock.push_response(Response::builder(status).body(body).build());
            let client = mock_client(&mock);
            assert_eq!(client.validate().await.unwrap(), expected, "status {}", status);
            assert!(mock.last_request().unwrap().body().is_none());
        }
    }

    #[tokio::test]
    async fn test_validate_propagates_unauthorized() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(
            Response::builder(401)
                .body(&br#"{"error":"Unauthorized","message":"Credentials are invalid"}"#[..])
                .build(),
        );
        let client = mock_client(&mock);

        let err = client.validate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Account);
        assert_eq!(err.status(), Some(401));
    }
}
