//! Scripted in-process transport.
//!
//! Outcomes are queued up front and consumed one per request. Every request
//! is recorded so tests can assert on method, URL, headers and body. When
//! the queue is empty the transport fails with a network error.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{BoxFuture, Request, Transport, TransportError};
use crate::response::Response;

enum Outcome {
    Respond(Response),
    Delayed(Response, Duration),
    Timeout,
    Fail(String),
}

/// Transport that replays queued outcomes instead of touching the network.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<Request>>,
    calls: AtomicUsize,
}

impl MockTransport {
    /// Create a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn push_response(&self, response: Response) {
        self.push(Outcome::Respond(response));
    }

    /// Queue a response that arrives only after `delay`.
    pub fn push_delayed(&self, response: Response, delay: Duration) {
        self.push(Outcome::Delayed(response, delay));
    }

    /// Queue a timeout.
    pub fn push_timeout(&self) {
        self.push(Outcome::Timeout);
    }

    /// Queue a network failure with the given message.
    pub fn push_failure(&self, message: &str) {
        self.push(Outcome::Fail(message.to_string()));
    }

    /// Number of requests sent so far.
    #[inline]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Number of queued outcomes not yet consumed.
    pub fn pending(&self) -> usize {
        lock(&self.outcomes).len()
    }

    /// Snapshot of every request sent so far.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    /// Most recent request, if any.
    pub fn last_request(&self) -> Option<Request> {
        lock(&self.requests).last().cloned()
    }

    fn push(&self, outcome: Outcome) {
        lock(&self.outcomes).push_back(outcome);
    }

    fn next(&self, request: Request) -> Option<Outcome> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        lock(&self.requests).push(request);
        lock(&self.outcomes).pop_front()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        let outcome = self.next(request);
        Box::pin(async move {
            match outcome {
                Some(Outcome::Respond(response)) => Ok(response),
                Some(Outcome::Delayed(response, delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Some(Outcome::Timeout) => Err(TransportError::Timeout(None)),
                Some(Outcome::Fail(message)) => Err(TransportError::network(message)),
                None => Err(TransportError::network("no scripted response")),
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Method, Url};

    fn request() -> Request {
        Request::new(
            Method::GET,
            Url::parse("https://api.tinify.com/output/1").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_replays_in_order() {
        let mock = MockTransport::new();
        mock.push_timeout();
        mock.push_response(Response::builder(200).build());

        assert!(mock.send(request()).await.unwrap_err().is_timeout());
        assert_eq!(mock.send(request()).await.unwrap().status(), 200);
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_script_fails() {
        let mock = MockTransport::new();
        let err = mock.send(request()).await.unwrap_err();
        assert_eq!(err.to_string(), "no scripted response");
        assert_eq!(mock.requests().len(), 1);
    }
}
