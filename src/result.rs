//! Materialized image result.
//!
//! An [`ImageResult`] owns the bytes of one fetched image together with the
//! metadata the service reported for it. All read accessors leave the
//! buffer untouched and can be called any number of times.
//!
//! # Example
//!
//! ```ignore
//! let result = shrunk.transform(&TransformOperations::from(ResizeOperation::fit(150, 100))).await?;
//! println!("{}x{}", result.width().unwrap_or(0), result.height().unwrap_or(0));
//! result.to_file("thumbnail.png").await?;
//! ```

use std::path::Path;

use bytes::Bytes;
use reqwest::{Method, Url};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::engine::RequestEngine;
use crate::error::{Result, TinifyError};
use crate::operations::TransformOperations;
use crate::response::Response;
use crate::transport::Body;

/// Fetched image bytes plus response metadata.
#[derive(Debug, Clone)]
pub struct ImageResult {
    width: Option<u32>,
    height: Option<u32>,
    location: Option<Url>,
    content_type: Option<String>,
    size: Option<u64>,
    /// `None` once disposed.
    data: Option<Bytes>,
}

impl ImageResult {
    /// Fetch `location`, applying `operations` when given.
    ///
    /// Without operations this is a GET of the stored result; with
    /// operations it is a POST carrying the serialized descriptor.
    pub(crate) async fn fetch(
        engine: &RequestEngine,
        location: &Url,
        operations: Option<&TransformOperations>,
    ) -> Result<Self> {
        let response = match operations {
            None => engine.execute(Method::GET, location.as_str(), None).await?,
            Some(ops) => {
                let body = Body::json(ops.to_json_bytes()?);
                engine.execute(Method::POST, location.as_str(), Some(body)).await?
            }
        };
        Ok(Self::from_response(response, engine))
    }

    fn from_response(response: Response, engine: &RequestEngine) -> Self {
        let location = response.header("Location").and_then(|value| {
            match engine.connection().resolve(value) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!("Ignoring malformed Location header: {}", e);
                    None
                }
            }
        });
        let content_type = response.header("Content-Type").and_then(media_type);
        let size = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            width: first_u32(&response, "Image-Width"),
            height: first_u32(&response, "Image-Height"),
            location,
            content_type,
            size,
            data: Some(response.into_body()),
        }
    }

    /// Build a result directly from bytes and metadata.
    pub fn new(data: Bytes, content_type: Option<String>, width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            width,
            height,
            location: None,
            content_type,
            size: Some(data.len() as u64),
            data: Some(data),
        }
    }

    /// Image width in pixels, from `Image-Width`.
    #[inline]
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    /// Image height in pixels, from `Image-Height`.
    #[inline]
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// `Location` reported with the result; points at the stored object
    /// after a store operation.
    pub fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    /// Media type without parameters, e.g. `image/png`.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Size declared by `Content-Length`.
    #[inline]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Number of buffered bytes (0 once disposed).
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    /// Whether [`dispose`](Self::dispose) was called.
    pub fn is_disposed(&self) -> bool {
        self.data.is_none()
    }

    fn data(&self) -> Result<&Bytes> {
        self.data.as_ref().ok_or(TinifyError::Disposed)
    }

    /// Shared handle to the buffered bytes (no copy).
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(self.data()?.clone())
    }

    /// Copy of the buffered bytes.
    pub fn to_buffer(&self) -> Result<Vec<u8>> {
        Ok(self.data()?.to_vec())
    }

    /// Copy the bytes into `dest`, returning the number written.
    ///
    /// Fails with [`TinifyError::BufferTooSmall`] if `dest` is shorter than
    /// the buffered image.
    pub fn copy_into(&self, dest: &mut [u8]) -> Result<usize> {
        let data = self.data()?;
        if dest.len() < data.len() {
            return Err(TinifyError::BufferTooSmall {
                needed: data.len(),
                available: dest.len(),
            });
        }
        dest[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Write the bytes to an async writer and flush it.
    pub async fn to_writer<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> Result<()> {
        let data = self.data()?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write the bytes to `path`, creating or truncating the file.
    pub async fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.data()?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    /// Release the buffer. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.data.take().is_some() {
            tracing::debug!("Disposed image result");
        }
    }
}

/// First header value that parses as `u32`; malformed values are skipped.
fn first_u32(response: &Response, name: &str) -> Option<u32> {
    response
        .header_values(name)
        .find_map(|value| value.trim().parse::<u32>().ok())
}

/// `image/png; charset=binary` -> `image/png`.
fn media_type(value: &str) -> Option<String> {
    let media = value.split(';').next().unwrap_or("").trim();
    if media.is_empty() {
        None
    } else {
        Some(media.to_ascii_lowercase())
    }
}
