//! Remote handle to an uploaded, compressed image.
//!
//! A [`ShrinkResult`] is what an upload returns: the `Location` of the
//! compressed image on the service plus whatever the service declared about
//! it. Bytes are only downloaded when a sink asks for them.
//!
//! # Caching
//!
//! The untransformed image is fetched at most once per handle. The cache
//! moves through three states:
//!
//! ```text
//! Unfetched ──first sink call──▶ Fetched ──dispose()──▶ Disposed
//! ```
//!
//! The state lives behind an async mutex that is held across the fetch, so
//! concurrent sink calls share one download. A failed fetch leaves the handle
//! `Unfetched` and the next sink call tries again.
//!
//! [`transform`](ShrinkResult::transform) bypasses the cache and issues a new
//! request every time. It checks a separate disposed flag, so it never waits
//! for a sink download in progress.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::Url;
use serde::Deserialize;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::engine::RequestEngine;
use crate::error::{Result, TinifyError};
use crate::operations::TransformOperations;
use crate::response::Response;
use crate::result::ImageResult;

#[derive(Debug)]
enum HandleState {
    Unfetched,
    Fetched(Arc<ImageResult>),
    Disposed,
}

#[derive(Debug, Deserialize)]
struct ShrinkBody {
    output: Option<ShrinkOutput>,
}

#[derive(Debug, Deserialize)]
struct ShrinkOutput {
    size: Option<u64>,
    #[serde(rename = "type")]
    image_type: Option<String>,
}

/// Handle to an image the service has compressed.
#[derive(Debug)]
pub struct ShrinkResult {
    location: Url,
    size: Option<u64>,
    image_type: Option<String>,
    engine: Arc<RequestEngine>,
    state: Mutex<HandleState>,
    disposed: AtomicBool,
}

impl ShrinkResult {
    /// Build a handle from a successful upload response.
    pub(crate) fn from_response(response: Response, engine: Arc<RequestEngine>) -> Result<Self> {
        let location = match response.header("Location") {
            Some(value) => engine.connection().resolve(value)?,
            None => {
                return Err(TinifyError::Connection {
                    message: "Upload response did not include a Location header".to_string(),
                    status: Some(response.status()),
                    source: None,
                })
            }
        };

        let (size, image_type) = parse_output(response.body());
        tracing::debug!("Image uploaded to {} (size {:?}, type {:?})", location, size, image_type);

        Ok(Self {
            location,
            size,
            image_type,
            engine,
            state: Mutex::new(HandleState::Unfetched),
            disposed: AtomicBool::new(false),
        })
    }

    /// Where the compressed image lives on the service.
    #[inline]
    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Compressed size the service declared, if any.
    #[inline]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Media type the service declared, if any.
    pub fn image_type(&self) -> Option<&str> {
        self.image_type.as_deref()
    }

    /// Return the cached result, fetching it first if needed.
    async fn cached(&self) -> Result<Arc<ImageResult>> {
        let mut state = self.state.lock().await;
        match &*state {
            HandleState::Fetched(result) => {
                tracing::debug!("Using cached result for {}", self.location);
                Ok(Arc::clone(result))
            }
            HandleState::Disposed => Err(TinifyError::Disposed),
            HandleState::Unfetched => {
                tracing::debug!("Fetching {}", self.location);
                let result = Arc::new(ImageResult::fetch(&self.engine, &self.location, None).await?);
                *state = HandleState::Fetched(Arc::clone(&result));
                Ok(result)
            }
        }
    }

    /// Write the compressed image to `path`.
    pub async fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.cached().await?.to_file(path).await
    }

    /// Copy of the compressed image bytes.
    pub async fn to_buffer(&self) -> Result<Vec<u8>> {
        self.cached().await?.to_buffer()
    }

    /// Shared handle to the compressed image bytes.
    pub async fn to_bytes(&self) -> Result<Bytes> {
        self.cached().await?.to_bytes()
    }

    /// Write the compressed image to an async writer.
    pub async fn to_writer<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> Result<()> {
        self.cached().await?.to_writer(writer).await
    }

    /// Copy the compressed image into `dest`, returning the number of bytes written.
    pub async fn copy_into(&self, dest: &mut [u8]) -> Result<usize> {
        self.cached().await?.copy_into(dest)
    }

    /// Apply `operations` to the compressed image.
    ///
    /// Every call is a new request; results are never cached on the handle.
    pub async fn transform(&self, operations: &TransformOperations) -> Result<ImageResult> {
        if self.is_disposed() {
            return Err(TinifyError::Disposed);
        }
        ImageResult::fetch(&self.engine, &self.location, Some(operations)).await
    }

    /// Release the cached result. Safe to call more than once.
    ///
    /// New `transform` calls fail at once; a sink download already in
    /// progress finishes before the cache is dropped.
    pub async fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Disposing handle for {}", self.location);
        }
        *self.state.lock().await = HandleState::Disposed;
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Declared `{output:{size,type}}`; missing or unreadable bodies yield nothing.
fn parse_output(body: &[u8]) -> (Option<u64>, Option<String>) {
    if body.iter().all(u8::is_ascii_whitespace) {
        return (None, None);
    }
    match serde_json::from_slice::<ShrinkBody>(body) {
        Ok(ShrinkBody {
            output: Some(output),
        }) => (output.size, output.image_type),
        Ok(_) => (None, None),
        Err(e) => {
            tracing::warn!("Ignoring unreadable upload response body: {}", e);
            (None, None)
        }
    }
}
