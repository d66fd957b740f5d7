//! Shrink - compress a local image and write a thumbnail next to it.
//!
//! This example demonstrates:
//! - Building a client from `TINIFY_API_KEY`
//! - Uploading a file and saving the compressed result
//! - Requesting a resized copy with a transform descriptor
//!
//! # Running
//!
//! ```sh
//! TINIFY_API_KEY=... cargo run --example shrink -- photo.png
//! ```

use std::path::PathBuf;

use tinify_client::operations::{ResizeOperation, TransformOperations};
use tinify_client::{ClientBuilder, ConnectionRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input: PathBuf = std::env::args()
        .nth(1)
        .ok_or("usage: shrink <image>")?
        .into();

    // One registry per process; every client built from it shares connections
    let registry = ConnectionRegistry::new();
    let client = ClientBuilder::from_env()?.build(&registry)?;

    if !client.validate().await? {
        eprintln!("unexpected response while validating the API key");
    }

    let shrunk = client.shrink_from_file(&input).await?;
    let optimized = input.with_extension("min.png");
    shrunk.to_file(&optimized).await?;
    println!(
        "{} -> {} ({} bytes)",
        input.display(),
        optimized.display(),
        shrunk.size().unwrap_or_default()
    );

    let thumb = shrunk
        .transform(&TransformOperations::from(ResizeOperation::thumb(150, 150)))
        .await?;
    let thumb_path = input.with_extension("thumb.png");
    thumb.to_file(&thumb_path).await?;
    println!(
        "{} ({}x{})",
        thumb_path.display(),
        thumb.width().unwrap_or_default(),
        thumb.height().unwrap_or_default()
    );

    shrunk.dispose().await;
    println!("Compressions this month: {}", client.compression_count());
    Ok(())
}
