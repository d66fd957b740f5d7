//! Format conversion descriptor.
//!
//! The service picks the smallest of the requested formats. Converting to a
//! format without transparency needs a background colour, which travels in
//! a separate top-level `transform` section of the request.

use serde::Serialize;

use crate::error::{Result, TinifyError};

/// Output formats the service can convert to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImageFormat {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/webp")]
    WebP,
}

impl ImageFormat {
    /// MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
        }
    }
}

/// Validated `convert` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertOperation {
    #[serde(rename = "type")]
    formats: Vec<ImageFormat>,
    #[serde(skip)]
    background: Option<String>,
}

impl ConvertOperation {
    /// Convert to the smallest of `formats`. Duplicates are dropped.
    pub fn new(formats: impl IntoIterator<Item = ImageFormat>) -> Result<Self> {
        let mut unique: Vec<ImageFormat> = Vec::new();
        for format in formats {
            if !unique.contains(&format) {
                unique.push(format);
            }
        }
        if unique.is_empty() {
            return Err(TinifyError::InvalidOperation(
                "convert needs at least one target format".to_string(),
            ));
        }
        Ok(Self {
            formats: unique,
            background: None,
        })
    }

    /// Convert to a single format.
    pub fn to(format: ImageFormat) -> Self {
        Self {
            formats: vec![format],
            background: None,
        }
    }

    /// Fill transparent areas with `color` (`"#RRGGBB"`, `"white"` or `"black"`).
    pub fn with_background(mut self, color: &str) -> Result<Self> {
        let color = color.trim();
        if color.is_empty() {
            return Err(TinifyError::InvalidOperation(
                "background colour must not be empty".to_string(),
            ));
        }
        self.background = Some(color.to_string());
        Ok(self)
    }

    /// Fill transparent areas with an RGB colour.
    pub fn with_background_rgb(mut self, r: u8, g: u8, b: u8) -> Self {
        self.background = Some(format!("#{:02X}{:02X}{:02X}", r, g, b));
        self
    }

    pub fn formats(&self) -> &[ImageFormat] {
        &self.formats
    }

    pub fn background(&self) -> Option<&str> {
        self.background.as_deref()
    }
}

/// `transform` section carrying the background colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackgroundTransform {
    pub background: String,
}
