//! [`ObjectStorage`] over an S3-compatible store
//!
//! Each contract operation maps onto one backend primitive. Backend failures
//! are translated into [`StorageError`] here and nowhere else.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::aws::AwsClient;
use super::backend::{BackendError, CannedAcl, S3Backend, UploadRequest};
use super::{ObjectReader, ObjectStorage, Stat};
use crate::config::StoreConfig;
use crate::content_type;
use crate::context::Context;
use crate::errors::{Result, StorageError};
use crate::metrics;

/// Every upload is publicly readable.
const UPLOAD_ACL: CannedAcl = CannedAcl::PublicRead;

/// Object storage backed by one bucket of an S3-compatible store
///
/// Holds no mutable state; clones share the backend client.
pub struct S3Storage<B = AwsClient> {
    bucket: String,
    backend: Arc<B>,
}

impl<B> Clone for S3Storage<B> {
    fn clone(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl S3Storage<AwsClient> {
    /// Connect to the store described by `config`
    ///
    /// Builds the SDK session from static credentials; no request is sent.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let client = AwsClient::new(config).await?;
        Ok(Self::with_backend(config.bucket.clone(), client))
    }
}

impl<B: S3Backend> S3Storage<B> {
    /// Wrap an existing backend client
    pub fn with_backend(bucket: impl Into<String>, backend: B) -> Self {
        Self {
            bucket: bucket.into(),
            backend: Arc::new(backend),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn translate(&self, path: &str, err: BackendError) -> StorageError {
        match err {
            BackendError::NotFound { code } => StorageError::NotExist {
                path: path.to_string(),
                bucket: self.bucket.clone(),
                code,
            },
            BackendError::Body(e) => StorageError::Read(e),
            other => StorageError::Backend(other),
        }
    }

    async fn fetch(&self, path: &str) -> Result<(ObjectReader, Stat)> {
        let (body, headers) = self
            .backend
            .get_object(&self.bucket, path)
            .await
            .map_err(|e| self.translate(path, e))?;
        let stat = headers.to_stat().map_err(|e| self.translate(path, e))?;
        Ok((body, stat))
    }

    async fn save_inner(&self, ctx: &Context, content: ObjectReader, path: &str) -> Result<()> {
        let (content_type, body) = ctx.run(content_type::resolve(path, content)).await?;
        debug!(content_type = ?content_type, "Resolved content type");

        let request = UploadRequest {
            bucket: self.bucket.clone(),
            key: path.to_string(),
            body,
            content_type,
            acl: UPLOAD_ACL,
        };
        ctx.run(async {
            self.backend
                .upload(request)
                .await
                .map_err(|e| self.translate(path, e))
        })
        .await
    }
}

/// Log and count the outcome of one operation.
fn finish<T>(operation: &'static str, started: Instant, result: Result<T>) -> Result<T> {
    metrics::record(operation, started.elapsed(), result.as_ref().err());
    match &result {
        Ok(_) => debug!(operation, "Storage operation succeeded"),
        Err(e) if e.is_not_exist() => debug!(operation, error = %e, "Object does not exist"),
        Err(e) => warn!(operation, error = %e, kind = e.kind(), "Storage operation failed"),
    }
    result
}

#[async_trait]
impl<B: S3Backend> ObjectStorage for S3Storage<B> {
    #[instrument(skip(self, ctx, content), fields(bucket = %self.bucket))]
    async fn save(&self, ctx: &Context, content: ObjectReader, path: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.save_inner(ctx, content, path).await;
        finish("save", started, result)
    }

    #[instrument(skip(self, ctx), fields(bucket = %self.bucket))]
    async fn stat(&self, ctx: &Context, path: &str) -> Result<Stat> {
        let started = Instant::now();
        let result = ctx
            .run(async {
                self.backend
                    .head_object(&self.bucket, path)
                    .await
                    .map_err(|e| self.translate(path, e))
            })
            .await;
        finish("stat", started, result)
    }

    #[instrument(skip(self, ctx), fields(bucket = %self.bucket))]
    async fn open(&self, ctx: &Context, path: &str) -> Result<ObjectReader> {
        let started = Instant::now();
        let result = ctx
            .run(async {
                self.backend
                    .get_object(&self.bucket, path)
                    .await
                    // headers are not needed, so their absence is no error
                    .map(|(body, _)| body)
                    .map_err(|e| self.translate(path, e))
            })
            .await;
        finish("open", started, result)
    }

    #[instrument(skip(self, ctx), fields(bucket = %self.bucket))]
    async fn delete(&self, ctx: &Context, path: &str) -> Result<()> {
        let started = Instant::now();
        // a missing key is whatever the store says it is; no existence check here
        let result = ctx
            .run(async {
                self.backend
                    .delete_object(&self.bucket, path)
                    .await
                    .map_err(StorageError::Backend)
            })
            .await;
        finish("delete", started, result)
    }

    #[instrument(skip(self, ctx), fields(bucket = %self.bucket))]
    async fn open_with_stat(&self, ctx: &Context, path: &str) -> Result<(ObjectReader, Stat)> {
        let started = Instant::now();
        let result = ctx.run(self.fetch(path)).await;
        finish("open_with_stat", started, result)
    }
}
