//! Cloud storage descriptors (Amazon S3, Google Cloud Storage).
//!
//! When a `store` section is present the service writes the result to the
//! bucket and answers with a `Location` header pointing at the stored object.

use serde::Serialize;

/// Headers the service sets on the stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreHeaders {
    #[serde(rename = "Cache-Control", skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

impl StoreHeaders {
    pub fn cache_control(value: &str) -> Self {
        Self {
            cache_control: Some(value.to_string()),
        }
    }
}

/// Amazon S3 target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct S3Store {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub region: String,
    /// `bucket/key` of the object to write.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<StoreHeaders>,
}

/// Google Cloud Storage target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcsStore {
    pub gcp_access_token: String,
    /// `bucket/object` to write.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<StoreHeaders>,
}

/// `store` section, tagged by `service`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "service")]
pub enum StoreOperation {
    #[serde(rename = "s3")]
    S3(S3Store),
    #[serde(rename = "gcs")]
    Gcs(GcsStore),
}

impl From<S3Store> for StoreOperation {
    fn from(store: S3Store) -> Self {
        StoreOperation::S3(store)
    }
}

impl From<GcsStore> for StoreOperation {
    fn from(store: GcsStore) -> Self {
        StoreOperation::Gcs(store)
    }
}
