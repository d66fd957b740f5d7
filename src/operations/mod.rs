//! Operations module - transform descriptors sent to an uploaded image.
//!
//! Provides:
//! - [`ResizeOperation`] - resize with scale / fit / cover / thumb
//! - [`PreserveOperation`] - keep copyright, creation and location metadata
//! - [`ConvertOperation`] - convert to JPEG / PNG / WebP, optional background
//! - [`StoreOperation`] - write the result to S3 or GCS
//! - [`TransformOperations`] - the combined request body
//!
//! Descriptors are validated when built, so a [`TransformOperations`] value
//! always serializes to a request the service accepts structurally.
//!
//! # Example
//!
//! ```
//! use tinify_client::operations::{ResizeOperation, TransformOperations};
//!
//! let ops = TransformOperations::from(ResizeOperation::fit(50, 20));
//! assert_eq!(
//!     ops.to_json().unwrap(),
//!     r#"{"resize":{"method":"fit","width":50,"height":20}}"#
//! );
//! ```

mod convert;
mod preserve;
mod resize;
mod store;

use serde::Serialize;

use crate::error::{Result, TinifyError};

pub use convert::{BackgroundTransform, ConvertOperation, ImageFormat};
pub use preserve::{PreserveOperation, PreserveOptions};
pub use resize::{ResizeMethod, ResizeOperation};
pub use store::{GcsStore, S3Store, StoreHeaders, StoreOperation};

/// Combined transform request. At least one section is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformOperations {
    #[serde(skip_serializing_if = "Option::is_none")]
    resize: Option<ResizeOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preserve: Option<PreserveOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    convert: Option<ConvertOperation>,
    #[serde(rename = "transform", skip_serializing_if = "Option::is_none")]
    background: Option<BackgroundTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<StoreOperation>,
}

impl TransformOperations {
    /// Start an empty builder.
    pub fn builder() -> TransformOperationsBuilder {
        TransformOperationsBuilder::default()
    }

    pub fn resize(&self) -> Option<&ResizeOperation> {
        self.resize.as_ref()
    }

    pub fn preserve(&self) -> Option<&PreserveOperation> {
        self.preserve.as_ref()
    }

    pub fn convert(&self) -> Option<&ConvertOperation> {
        self.convert.as_ref()
    }

    pub fn store(&self) -> Option<&StoreOperation> {
        self.store.as_ref()
    }

    /// Serialize to the JSON request body.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Builder for [`TransformOperations`].
#[derive(Debug, Clone, Default)]
pub struct TransformOperationsBuilder {
    resize: Option<ResizeOperation>,
    preserve: Option<PreserveOperation>,
    convert: Option<ConvertOperation>,
    store: Option<StoreOperation>,
}

impl TransformOperationsBuilder {
    pub fn resize(mut self, op: ResizeOperation) -> Self {
        self.resize = Some(op);
        self
    }

    pub fn preserve(mut self, op: PreserveOperation) -> Self {
        self.preserve = Some(op);
        self
    }

    pub fn convert(mut self, op: ConvertOperation) -> Self {
        self.convert = Some(op);
        self
    }

    pub fn store(mut self, op: impl Into<StoreOperation>) -> Self {
        self.store = Some(op.into());
        self
    }

    /// Finish. Fails if no section was set.
    pub fn build(self) -> Result<TransformOperations> {
        if self.resize.is_none()
            && self.preserve.is_none()
            && self.convert.is_none()
            && self.store.is_none()
        {
            return Err(TinifyError::InvalidOperation(
                "at least one transform operation must be specified".to_string(),
            ));
        }

        let background = self
            .convert
            .as_ref()
            .and_then(|c| c.background())
            .map(|color| BackgroundTransform {
                background: color.to_string(),
            });

        Ok(TransformOperations {
            resize: self.resize,
            preserve: self.preserve,
            convert: self.convert,
            background,
            store: self.store,
        })
    }
}

impl From<ResizeOperation> for TransformOperations {
    fn from(op: ResizeOperation) -> Self {
        TransformOperations {
            resize: Some(op),
            preserve: None,
            convert: None,
            background: None,
            store: None,
        }
    }
}

impl From<PreserveOperation> for TransformOperations {
    fn from(op: PreserveOperation) -> Self {
        TransformOperations {
            resize: None,
            preserve: Some(op),
            convert: None,
            background: None,
            store: None,
        }
    }
}

impl From<ConvertOperation> for TransformOperations {
    fn from(op: ConvertOperation) -> Self {
        let background = op.background().map(|color| BackgroundTransform {
            background: color.to_string(),
        });
        TransformOperations {
            resize: None,
            preserve: None,
            convert: Some(op),
            background,
            store: None,
        }
    }
}

impl From<StoreOperation> for TransformOperations {
    fn from(op: StoreOperation) -> Self {
        TransformOperations {
            resize: None,
            preserve: None,
            convert: None,
            background: None,
            store: Some(op),
        }
    }
}
