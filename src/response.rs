//! Buffered HTTP response as seen by the request engine.

use bytes::Bytes;

/// A fully buffered HTTP response.
///
/// Header names are matched case-insensitively. Repeated headers are kept
/// as separate entries in arrival order.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    /// Create a response from its parts.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Start building a response with the given status and no headers or body.
    pub fn builder(status: u16) -> ResponseBuilder {
        ResponseBuilder {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// HTTP status code (e.g. 201, 429).
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in the 2xx range.
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Whether the status is in the 5xx range.
    #[inline]
    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }

    /// Response headers as (name, value) pairs.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of the header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of the header `name`, in arrival order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Reference to the body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// Builder for [`Response`], mostly useful with [`MockTransport`](crate::transport::MockTransport).
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl ResponseBuilder {
    /// Append a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Finish the response.
    pub fn build(self) -> Response {
        Response::new(self.status, self.headers, self.body)
    }
}
