//! Resize descriptor.

use serde::Serialize;

use crate::error::{Result, TinifyError};

/// How the service fits the image into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    /// Scale proportionally to one given dimension.
    Scale,
    /// Scale down to fit inside width × height.
    Fit,
    /// Scale and crop to exactly width × height.
    Cover,
    /// Like cover, but with intelligent background detection.
    Thumb,
}

impl ResizeMethod {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizeMethod::Scale => "scale",
            ResizeMethod::Fit => "fit",
            ResizeMethod::Cover => "cover",
            ResizeMethod::Thumb => "thumb",
        }
    }
}

/// Validated `resize` section of a transform request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResizeOperation {
    method: ResizeMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
}

impl ResizeOperation {
    /// Validate and build a resize operation.
    ///
    /// `Fit`, `Cover` and `Thumb` need both dimensions. `Scale` needs
    /// exactly one.
    pub fn new(method: ResizeMethod, width: Option<u32>, height: Option<u32>) -> Result<Self> {
        match method {
            ResizeMethod::Scale => {
                if width.is_some() == height.is_some() {
                    return Err(TinifyError::InvalidOperation(
                        "resize method 'scale' needs either a width or a height, not both".to_string(),
                    ));
                }
            }
            _ => {
                if width.is_none() || height.is_none() {
                    return Err(TinifyError::InvalidOperation(format!(
                        "resize method '{}' needs both width and height",
                        method.as_str()
                    )));
                }
            }
        }
        Ok(Self {
            method,
            width,
            height,
        })
    }

    /// Fit inside `width` × `height`.
    pub fn fit(width: u32, height: u32) -> Self {
        Self {
            method: ResizeMethod::Fit,
            width: Some(width),
            height: Some(height),
        }
    }

    /// Crop to exactly `width` × `height`.
    pub fn cover(width: u32, height: u32) -> Self {
        Self {
            method: ResizeMethod::Cover,
            width: Some(width),
            height: Some(height),
        }
    }

    /// Thumbnail of `width` × `height`.
    pub fn thumb(width: u32, height: u32) -> Self {
        Self {
            method: ResizeMethod::Thumb,
            width: Some(width),
            height: Some(height),
        }
    }

    /// Scale proportionally to `width`.
    pub fn scale_to_width(width: u32) -> Self {
        Self {
            method: ResizeMethod::Scale,
            width: Some(width),
            height: None,
        }
    }

    /// Scale proportionally to `height`.
    pub fn scale_to_height(height: u32) -> Self {
        Self {
            method: ResizeMethod::Scale,
            width: None,
            height: Some(height),
        }
    }

    #[inline]
    pub fn method(&self) -> ResizeMethod {
        self.method
    }

    #[inline]
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    #[inline]
    pub fn height(&self) -> Option<u32> {
        self.height
    }
}
