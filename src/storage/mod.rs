//! Storage abstraction layer
//!
//! Application code talks to [`ObjectStorage`], a small contract for saving,
//! reading, inspecting and deleting objects in a flat keyspace. The only
//! implementation here is [`S3Storage`], which binds the contract to an
//! S3-compatible store through the [`S3Backend`] primitives.

mod adapter;
mod aws;
mod backend;
#[cfg(test)]
pub(crate) mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::context::Context;
use crate::errors::Result;

pub use adapter::S3Storage;
pub use aws::AwsClient;
pub use backend::{BackendError, CannedAcl, ObjectHeaders, S3Backend, UploadRequest};

/// A readable byte stream, for both upload content and downloaded bodies.
///
/// Downloaded bodies hold the underlying connection until dropped.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Object metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub modified_time: DateTime<Utc>,
    pub size: u64,
}

/// Storage contract for object stores
///
/// All operations honour the caller's [`Context`]: a cancelled or expired
/// context aborts the in-flight request and fails with a cancellation error.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload `content` to `path`, creating or replacing the object
    async fn save(&self, ctx: &Context, content: ObjectReader, path: &str) -> Result<()>;

    /// Get object metadata (HEAD operation)
    async fn stat(&self, ctx: &Context, path: &str) -> Result<Stat>;

    /// Open an object for reading
    async fn open(&self, ctx: &Context, path: &str) -> Result<ObjectReader>;

    /// Delete the object at `path`
    async fn delete(&self, ctx: &Context, path: &str) -> Result<()>;

    /// Open an object for reading along with its metadata, in one request
    async fn open_with_stat(&self, ctx: &Context, path: &str) -> Result<(ObjectReader, Stat)>;
}
