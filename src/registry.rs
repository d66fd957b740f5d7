//! Connection registry - pooled connections keyed by credential and transport.
//!
//! Establishing a TLS connection to the API is expensive, so clients built
//! with the same API key and the same transport share one [`Connection`].
//! The transport's identity is the address of its `Arc` allocation; clients
//! that do not supply a transport share the registry's default one.
//!
//! The registry is an ordinary value: build one per application (or per
//! test) and hand it to every [`ClientBuilder`](crate::ClientBuilder).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tinify_client::{Client, ConnectionRegistry};
//!
//! let registry = Arc::new(ConnectionRegistry::new());
//! let a = Client::builder("key").build(&registry)?;
//! let b = Client::builder("key").build(&registry)?;
//! assert!(Arc::ptr_eq(a.connection(), b.connection()));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine;
use reqwest::{Method, Url};

use crate::error::{Result, TinifyError};
use crate::response::Response;
use crate::transport::{Body, HttpTransport, Request, Transport, TransportError, TrustPolicy};

/// Product `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("tinify-client/", env!("CARGO_PKG_VERSION"), " (Rust)");

/// Last `Compression-Count` reported by the service.
///
/// Shared by every request that goes through the owning registry. Writes
/// are an atomic swap and reads take no lock, so the value is whichever
/// response was processed last: it tracks recent account usage, not the
/// caller's own most recent request.
#[derive(Debug, Clone, Default)]
pub struct CompressionCounter {
    value: Arc<AtomicU32>,
}

impl CompressionCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Overwrite with a freshly observed value, returning the previous one.
    #[inline]
    pub fn record(&self, count: u32) -> u32 {
        self.value.swap(count, Ordering::AcqRel)
    }

    /// Parse a header value and record it. Unparseable values are ignored.
    pub fn record_header(&self, value: &str) -> Option<u32> {
        match value.trim().parse::<u32>() {
            Ok(count) => {
                self.record(count);
                Some(count)
            }
            Err(_) => {
                tracing::warn!("Ignoring unparseable Compression-Count header: {:?}", value);
                None
            }
        }
    }
}

/// Key under which a connection is pooled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConnectionKey {
    api_key: String,
    endpoint: String,
    transport_id: usize,
}

/// A configured connection to the API: transport, endpoint and default headers.
pub struct Connection {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    authorization: String,
    closed: AtomicBool,
}

impl Connection {
    fn new(api_key: &str, endpoint: Url, transport: Arc<dyn Transport>) -> Self {
        let credentials =
            base64::engine::general_purpose::STANDARD.encode(format!("api:{}", api_key));
        Self {
            transport,
            endpoint,
            authorization: format!("Basic {}", credentials),
            closed: AtomicBool::new(false),
        }
    }

    /// Base URL requests are resolved against.
    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether [`ConnectionRegistry::clear`] has closed this connection.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve a path or absolute URL against the endpoint.
    pub fn resolve(&self, target: &str) -> Result<Url> {
        self.endpoint
            .join(target)
            .map_err(|e| TinifyError::connection(format!("Invalid request target {:?}: {}", target, e)))
    }

    /// Send one request with the default headers attached.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Body>,
    ) -> std::result::Result<Response, TransportError> {
        let mut request = Request::new(method, url)
            .with_header("Authorization", &self.authorization)
            .with_header("User-Agent", USER_AGENT);
        if let Some(body) = body {
            if let Some(content_type) = body.content_type() {
                request = request.with_header("Content-Type", content_type);
            }
            request = request.with_body(body.bytes().clone());
        }
        self.transport.send(request).await
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint.as_str())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionKey, Arc<Connection>>,
    default_transport: Option<Arc<dyn Transport>>,
}

/// Pool of connections keyed by (API key, endpoint, transport identity).
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    trust: TrustPolicy,
    counter: CompressionCounter,
}

impl ConnectionRegistry {
    /// Create an empty registry whose default transport uses built-in roots.
    pub fn new() -> Self {
        Self::with_trust_policy(TrustPolicy::Default)
    }

    /// Create an empty registry whose default transport uses `trust`.
    pub fn with_trust_policy(trust: TrustPolicy) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            trust,
            counter: CompressionCounter::new(),
        }
    }

    /// Shared compression counter.
    pub fn counter(&self) -> &CompressionCounter {
        &self.counter
    }

    /// Last compression count reported by the service.
    #[inline]
    pub fn compression_count(&self) -> u32 {
        self.counter.get()
    }

    /// Number of pooled connections.
    pub fn len(&self) -> usize {
        self.lock().connections.len()
    }

    /// Whether no connection is pooled.
    pub fn is_empty(&self) -> bool {
        self.lock().connections.is_empty()
    }

    /// Return the pooled connection for this key, creating it on first use.
    ///
    /// The registry lock is held only for the lookup and insert.
    pub fn acquire(
        &self,
        api_key: &str,
        endpoint: &Url,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Arc<Connection>> {
        let mut state = self.lock();

        let transport = match transport {
            Some(t) => t,
            None => match state.default_transport.clone() {
                Some(t) => t,
                None => {
                    let t: Arc<dyn Transport> = Arc::new(HttpTransport::new(&self.trust)?);
                    state.default_transport = Some(t.clone());
                    t
                }
            },
        };

        let key = ConnectionKey {
            api_key: api_key.to_string(),
            endpoint: endpoint.as_str().to_string(),
            transport_id: Arc::as_ptr(&transport) as *const () as usize,
        };

        if let Some(connection) = state.connections.get(&key) {
            return Ok(connection.clone());
        }

        tracing::debug!("Creating pooled connection for {}", endpoint);
        let connection = Arc::new(Connection::new(api_key, endpoint.clone(), transport));
        state.connections.insert(key, connection.clone());
        Ok(connection)
    }

    /// Close every pooled connection and empty the registry.
    ///
    /// Connections handed out earlier reject further requests.
    pub fn clear(&self) {
        let mut state = self.lock();
        for connection in state.connections.values() {
            connection.close();
        }
        let count = state.connections.len();
        state.connections.clear();
        state.default_transport = None;
        tracing::debug!("Cleared {} pooled connections", count);
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn endpoint() -> Url {
        Url::parse("https://api.tinify.com").unwrap()
    }

    #[test]
    fn test_same_key_same_transport_shares_connection() {
        let registry = ConnectionRegistry::new();
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());

        let a = registry.acquire("key", &endpoint(), Some(mock.clone())).unwrap();
        let b = registry.acquire("key", &endpoint(), Some(mock.clone())).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_acquire_shares_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());

        let mut tasks = Vec::new();
        for _ in 0..64 {
            let registry = Arc::clone(&registry);
            let mock = mock.clone();
            tasks.push(tokio::spawn(async move {
                registry.acquire("key", &endpoint(), Some(mock)).unwrap()
            }));
        }
        let mut connections = Vec::new();
        for task in tasks {
            connections.push(task.await.unwrap());
        }

        for connection in &connections[1..] {
            assert!(Arc::ptr_eq(&connections[0], connection));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_transport_gets_new_connection() {
        let registry = ConnectionRegistry::new();
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let other: Arc<dyn Transport> = Arc::new(MockTransport::new());

        let a = registry.acquire("key", &endpoint(), Some(mock)).unwrap();
        let b = registry.acquire("key", &endpoint(), Some(other)).unwrap();
        let c = registry.acquire("key", &endpoint(), None).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_different_key_gets_new_connection() {
        let registry = ConnectionRegistry::new();
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());

        let a = registry.acquire("key", &endpoint(), Some(mock.clone())).unwrap();
        let b = registry.acquire("4242424242", &endpoint(), Some(mock)).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_different_endpoint_gets_new_connection() {
        let registry = ConnectionRegistry::new();
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let staging = Url::parse("https://staging.tinify.test").unwrap();

        let a = registry.acquire("key", &endpoint(), Some(mock.clone())).unwrap();
        let b = registry.acquire("key", &staging, Some(mock)).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.endpoint().as_str(), "https://staging.tinify.test/");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_default_transport_is_shared() {
        let registry = ConnectionRegistry::new();

        let a = registry.acquire("key", &endpoint(), None).unwrap();
        let b = registry.acquire("key", &endpoint(), None).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_clear_closes_connections() {
        let registry = ConnectionRegistry::new();
        let mock: Arc<dyn Transport> = Arc::new(MockTransport::new());

        let a = registry.acquire("key", &endpoint(), Some(mock.clone())).unwrap();
        registry.clear();

        assert!(a.is_closed());
        assert!(registry.is_empty());

        let b = registry.acquire("key", &endpoint(), Some(mock)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!b.is_closed());
    }

    #[test]
    fn test_authorization_header() {
        let connection = Connection::new("key", endpoint(), Arc::new(MockTransport::new()));
        assert_eq!(connection.authorization, "Basic YXBpOmtleQ==");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let connection = Connection::new("key", endpoint(), Arc::new(MockTransport::new()));

        assert_eq!(
            connection.resolve("/shrink").unwrap().as_str(),
            "https://api.tinify.com/shrink"
        );
        assert_eq!(
            connection.resolve("https://example.com/foo.png").unwrap().as_str(),
            "https://example.com/foo.png"
        );
    }

    #[test]
    fn test_counter_last_writer_wins() {
        let counter = CompressionCounter::new();
        assert_eq!(counter.get(), 0);

        counter.record(12);
        assert_eq!(counter.record_header(" 13 "), Some(13));
        assert_eq!(counter.record_header("many"), None);
        assert_eq!(counter.get(), 13);

        let shared = counter.clone();
        shared.record(99);
        assert_eq!(counter.get(), 99);
    }

    #[test]
    fn test_user_agent_names_product() {
        assert!(USER_AGENT.starts_with("tinify-client/"));
    }
}
