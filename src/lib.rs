//! Object storage behind a small, backend-neutral contract
//!
//! [`ObjectStorage`] covers saving, reading, inspecting and deleting objects
//! in a flat keyspace. [`S3Storage`] implements it on top of an S3-compatible
//! store: backend error codes are translated into [`StorageError`] variants,
//! uploads get a content type from the path extension or from the first bytes
//! of the content, and every call honours a cancellable [`Context`].
//!
//! ```no_run
//! use s3_storage::{Context, ObjectStorage, S3Storage, StoreConfig};
//!
//! # async fn run() -> s3_storage::Result<()> {
//! let config = StoreConfig::from_env()?;
//! let storage = S3Storage::connect(&config).await?;
//!
//! let ctx = Context::new();
//! storage
//!     .save(&ctx, Box::pin(&b"hello"[..]), "greetings/hello.txt")
//!     .await?;
//! let stat = storage.stat(&ctx, "greetings/hello.txt").await?;
//! assert_eq!(stat.size, 5);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content_type;
pub mod context;
pub mod errors;
pub mod metrics;
pub mod storage;
pub mod telemetry;

pub use config::StoreConfig;
pub use context::Context;
pub use errors::{Result, StorageError};
pub use storage::{
    AwsClient, BackendError, CannedAcl, ObjectHeaders, ObjectReader, ObjectStorage, S3Backend,
    S3Storage, Stat, UploadRequest,
};
