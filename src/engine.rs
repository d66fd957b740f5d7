//! Request engine - one logical API call with bounded retry.
//!
//! Every call to the service goes through [`RequestEngine::execute`]:
//!
//! 1. Send the request over the pooled connection
//! 2. On timeout, transport failure or a 5xx status, wait the retry delay
//!    and try again while the retry budget lasts
//! 3. Record any `Compression-Count` header
//! 4. Return the 2xx response, or classify the failure into a [`TinifyError`]
//!
//! The delay is fixed, not exponential, and is a `tokio::time::sleep` so
//! other tasks keep running while a request waits.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;

use crate::error::{ErrorData, Result, TinifyError};
use crate::registry::{CompressionCounter, Connection};
use crate::response::Response;
use crate::transport::{Body, TransportError};

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 1;

/// Default delay before each retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Retry budget and fixed backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Issues requests against one pooled connection.
#[derive(Debug)]
pub struct RequestEngine {
    connection: Arc<Connection>,
    counter: CompressionCounter,
    retry: RetryPolicy,
    /// Per-attempt timeout. `None` waits for the transport indefinitely.
    timeout: Option<Duration>,
}

impl RequestEngine {
    /// Create an engine.
    pub fn new(
        connection: Arc<Connection>,
        counter: CompressionCounter,
        retry: RetryPolicy,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            connection,
            counter,
            retry,
            timeout,
        }
    }

    /// The pooled connection requests are sent over.
    #[inline]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The shared compression counter.
    #[inline]
    pub fn counter(&self) -> &CompressionCounter {
        &self.counter
    }

    /// Retry policy in effect.
    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Execute one logical request.
    ///
    /// `target` is a path relative to the endpoint or an absolute URL.
    /// Never returns a non-2xx response.
    pub async fn execute(&self, method: Method, target: &str, body: Option<Body>) -> Result<Response> {
        let url = self.connection.resolve(target)?;
        let mut remaining = self.retry.retries;
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                tracing::debug!(
                    "Retrying {} {} in {:?} (attempt {})",
                    method,
                    url,
                    self.retry.delay,
                    attempt + 1
                );
                tokio::time::sleep(self.retry.delay).await;
            }
            attempt += 1;

            if self.connection.is_closed() {
                return Err(TinifyError::connection("Connection has been closed"));
            }

            tracing::debug!("{} {} (attempt {})", method, url, attempt);
            let response = match self.send_once(method.clone(), url.clone(), body.as_ref()).await {
                Ok(response) => response,
                Err(TransportError::Timeout(source)) => {
                    if remaining > 0 {
                        remaining -= 1;
                        continue;
                    }
                    tracing::warn!("{} {} timed out after {} attempts", method, url, attempt);
                    return Err(TinifyError::Connection {
                        message: "Timeout while connecting".to_string(),
                        status: None,
                        source,
                    });
                }
                Err(TransportError::Network { message, source }) => {
                    if remaining > 0 {
                        remaining -= 1;
                        continue;
                    }
                    tracing::warn!("{} {} failed after {} attempts: {}", method, url, attempt, message);
                    return Err(TinifyError::Connection {
                        message: format!("Error while connecting: {}", message),
                        status: None,
                        source,
                    });
                }
            };

            if let Some(value) = response.header("Compression-Count") {
                self.counter.record_header(value);
            }

            if response.is_success() {
                return Ok(response);
            }

            if remaining > 0 && response.is_server_error() {
                tracing::debug!("{} {} returned {}, will retry", method, url, response.status());
                drop(response);
                remaining -= 1;
                continue;
            }

            let status = response.status();
            let data = ErrorData::parse(response.body());
            tracing::debug!("{} {} failed with {}: {}", method, url, status, data.message);
            return Err(TinifyError::from_status(status, data.message, data.error));
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: reqwest::Url,
        body: Option<&Body>,
    ) -> std::result::Result<Response, TransportError> {
        let exchange = self.connection.send(method, url, body);
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(outcome) => outcome,
                Err(elapsed) => Err(TransportError::Timeout(Some(Box::new(elapsed)))),
            },
            None => exchange.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::ConnectionRegistry;
    use crate::transport::{MockTransport, Transport};
    use reqwest::Url;

    fn engine(mock: &Arc<MockTransport>, timeout: Option<Duration>) -> RequestEngine {
        let registry = ConnectionRegistry::new();
        let transport: Arc<dyn Transport> = mock.clone();
        let endpoint = Url::parse("https://api.tinify.com").unwrap();
        let connection = registry.acquire("key", &endpoint, Some(transport)).unwrap();
        RequestEngine::new(
            connection,
            registry.counter().clone(),
            RetryPolicy {
                retries: DEFAULT_RETRIES,
                delay: Duration::from_millis(500),
            },
            timeout,
        )
    }

    fn error_body(status: u16, error: &str, message: &str) -> Response {
        Response::builder(status)
            .body(format!(r#"{{"error":"{}","message":"{}"}}"#, error, message))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_success_waits_once() {
        let mock = Arc::new(MockTransport::new());
        mock.push_timeout();
        mock.push_response(Response::builder(201).build());
        let engine = engine(&mock, None);

        let start = tokio::time::Instant::now();
        let response = engine.execute(Method::POST, "/shrink", None).await.unwrap();

        assert_eq!(response.status(), 201);
        assert_eq!(mock.calls(), 2);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(500));
        assert!(waited < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_twice_fails() {
        let mock = Arc::new(MockTransport::new());
        mock.push_timeout();
        mock.push_timeout();
        let engine = engine(&mock, None);

        let err = engine.execute(Method::POST, "/shrink", None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.to_string(), "Timeout while connecting");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_twice_fails() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure("connection refused");
        mock.push_failure("connection refused");
        let engine = engine(&mock, None);

        let err = engine.execute(Method::GET, "/output/x", None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.to_string(), "Error while connecting: connection refused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(error_body(584, "InternalServerError", "Oops!"));
        mock.push_response(Response::builder(201).build());
        let engine = engine(&mock, None);

        let response = engine.execute(Method::POST, "/shrink", None).await.unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_twice_fails() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(error_body(584, "InternalServerError", "Oops!"));
        mock.push_response(error_body(584, "InternalServerError", "Oops!"));
        let engine = engine(&mock, None);

        let err = engine.execute(Method::POST, "/shrink", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.to_string(), "Oops! (HTTP 584/InternalServerError)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_is_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(error_body(401, "Unauthorized", "Oops!"));
        mock.push_response(Response::builder(201).build());
        let engine = engine(&mock, None);

        let start = tokio::time::Instant::now();
        let err = engine.execute(Method::POST, "/shrink", None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Account);
        assert_eq!(err.to_string(), "Oops! (HTTP 401/Unauthorized)");
        assert_eq!(mock.calls(), 1);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfollowed_redirect_is_connection_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(error_body(302, "Found", "Moved"));
        let engine = engine(&mock, None);

        let err = engine.execute(Method::GET, "/output/x", None).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.status(), Some(302));
        assert_eq!(err.to_string(), "Moved (HTTP 302/Found)");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_error_body_keeps_status() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(Response::builder(543).body("<!-- this is not json -->").build());
        mock.push_response(Response::builder(543).body("<!-- this is not json -->").build());
        let engine = engine(&mock, None);

        let err = engine.execute(Method::POST, "/shrink", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.status(), Some(543));
        assert_eq!(err.error_type(), Some("ParseError"));
        assert!(err.to_string().starts_with("Error while parsing response: "));
        assert!(err.to_string().ends_with("(HTTP 543/ParseError)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compression_count_recorded_on_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(
            Response::builder(400)
                .header("Compression-Count", "12")
                .body(r#"{"error":"BadRequest","message":"Oops!"}"#)
                .build(),
        );
        let engine = engine(&mock, None);

        let _ = engine.execute(Method::POST, "/shrink", None).await;
        assert_eq!(engine.counter().get(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compression_count_garbage_ignored() {
        let mock = Arc::new(MockTransport::new());
        mock.push_response(Response::builder(201).header("Compression-Count", "7").build());
        mock.push_response(Response::builder(201).header("Compression-Count", "lots").build());
        let engine = engine(&mock, None);

        engine.execute(Method::POST, "/shrink", None).await.unwrap();
        engine.execute(Method::POST, "/shrink", None).await.unwrap();
        assert_eq!(engine.counter().get(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_resent_in_full_on_retry() {
        let mock = Arc::new(MockTransport::new());
        mock.push_timeout();
        mock.push_response(Response::builder(201).build());
        let engine = engine(&mock, None);

        engine
            .execute(Method::POST, "/shrink", Some(Body::binary(&b"png file"[..])))
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert_eq!(request.body().map(|b| b.as_ref()), Some(&b"png file"[..]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_connection_rejected() {
        let mock = Arc::new(MockTransport::new());
        let registry = ConnectionRegistry::new();
        let transport: Arc<dyn Transport> = mock.clone();
        let endpoint = Url::parse("https://api.tinify.com").unwrap();
        let connection = registry.acquire("key", &endpoint, Some(transport)).unwrap();
        let engine = RequestEngine::new(
            connection,
            registry.counter().clone(),
            RetryPolicy::default(),
            None,
        );

        registry.clear();
        let err = engine.execute(Method::GET, "/shrink", None).await.unwrap_err();

        assert_eq!(err.to_string(), "Connection has been closed");
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_timeout_counts_as_timeout() {
        let mock = Arc::new(MockTransport::new());
        mock.push_delayed(Response::builder(201).build(), Duration::from_secs(10));
        mock.push_delayed(Response::builder(201).build(), Duration::from_secs(10));
        let engine = engine(&mock, Some(Duration::from_secs(1)));

        let err = engine.execute(Method::POST, "/shrink", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Timeout while connecting");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_timeout_then_fast_response() {
        let mock = Arc::new(MockTransport::new());
        mock.push_delayed(Response::builder(201).build(), Duration::from_secs(10));
        mock.push_response(Response::builder(201).build());
        let engine = engine(&mock, Some(Duration::from_secs(1)));

        let response = engine.execute(Method::POST, "/shrink", None).await.unwrap();
        assert_eq!(response.status(), 201);
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 1);
        assert_eq!(policy.delay, Duration::from_millis(500));
    }
}
