//! # tinify-client
//!
//! Async client for the Tinify image optimization API.
//!
//! Upload an image, get back a handle to the compressed result, then write
//! it out or request server-side transforms (resize, metadata preservation,
//! format conversion, cloud storage).
//!
//! ## Architecture
//!
//! - **Registry**: pools connections per (API key, endpoint, transport) and
//!   owns the shared compression counter
//! - **Engine**: sends one logical request with a bounded, fixed-delay retry
//!   and classifies failures into [`TinifyError`]
//! - **Handles**: [`ShrinkResult`] fetches lazily and caches once;
//!   [`ImageResult`] owns the downloaded bytes
//!
//! ## Example
//!
//! ```ignore
//! use tinify_client::operations::{ResizeOperation, TransformOperations};
//! use tinify_client::{Client, ConnectionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> tinify_client::Result<()> {
//!     let registry = ConnectionRegistry::new();
//!     let client = Client::builder("YOUR_API_KEY").build(&registry)?;
//!
//!     let shrunk = client.shrink_from_file("photo.jpg").await?;
//!     shrunk.to_file("photo.min.jpg").await?;
//!
//!     let thumb = shrunk
//!         .transform(&TransformOperations::from(ResizeOperation::cover(150, 150)))
//!         .await?;
//!     thumb.to_file("photo.thumb.jpg").await?;
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod operations;
pub mod registry;
pub mod transport;

mod client;
mod response;
mod result;
mod shrink;

pub use client::{Client, ClientBuilder, API_KEY_ENV, DEFAULT_ENDPOINT, ENDPOINT_ENV};
pub use error::{ErrorKind, Result, TinifyError};
pub use registry::{CompressionCounter, Connection, ConnectionRegistry};
pub use response::{Response, ResponseBuilder};
pub use result::ImageResult;
pub use shrink::ShrinkResult;

pub use reqwest::{Method, Url};
