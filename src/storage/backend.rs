//! Primitive operations of an S3-compatible store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mime::Mime;
use thiserror::Error;

use super::{ObjectReader, Stat};

/// Canned access policy applied to an uploaded object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedAcl {
    PublicRead,
}

/// Input to [`S3Backend::upload`]
pub struct UploadRequest {
    pub bucket: String,
    pub key: String,
    pub body: ObjectReader,
    pub content_type: Option<Mime>,
    pub acl: CannedAcl,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("content_type", &self.content_type)
            .field("acl", &self.acl)
            .finish_non_exhaustive()
    }
}

/// Metadata headers of a GET response, as the store sent them
///
/// Some S3-compatible stores omit `Last-Modified` or `Content-Length` on
/// streamed responses, so both are optional until a [`Stat`] is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectHeaders {
    pub last_modified: Option<DateTime<Utc>>,
    pub content_length: Option<u64>,
}

impl ObjectHeaders {
    pub fn to_stat(&self) -> Result<Stat, BackendError> {
        Ok(Stat {
            modified_time: self
                .last_modified
                .ok_or(BackendError::MissingMetadata("Last-Modified"))?,
            size: self
                .content_length
                .ok_or(BackendError::MissingMetadata("Content-Length"))?,
        })
    }
}

/// Failure reported by a backend primitive
#[derive(Error, Debug)]
pub enum BackendError {
    /// The store reported that the key does not exist
    #[error("object not found (code: {code})")]
    NotFound { code: String },

    /// Reading the upload body failed
    #[error("reading upload body: {0}")]
    Body(#[source] std::io::Error),

    /// A response lacked a header needed to build object metadata
    #[error("response is missing {0}")]
    MissingMetadata(&'static str),

    /// Any other service or transport failure
    #[error("service error{}: {source}", code_suffix(.code))]
    Service {
        code: Option<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|code| format!(" {}", code)).unwrap_or_default()
}

/// The four remote primitives the storage adapter is built on
///
/// Implementations must report a missing key as [`BackendError::NotFound`]
/// and keep it distinct from other failures.
#[async_trait]
pub trait S3Backend: Send + Sync {
    /// Upload an object, streaming its body
    async fn upload(&self, request: UploadRequest) -> Result<(), BackendError>;

    /// Fetch object metadata without the body
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Stat, BackendError>;

    /// Fetch the object body together with its response headers
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(ObjectReader, ObjectHeaders), BackendError>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BackendError>;
}
