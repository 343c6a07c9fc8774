//! AWS S3 backend implementation
//!
//! Uses `aws-sdk-s3` directly, with:
//! - Static credentials (access key ID and secret access key)
//! - Optional custom endpoint for S3-compatible services like MinIO
//! - Path-style addressing whenever a custom endpoint is set, unless
//!   configured otherwise
//!
//! Uploads stream the body in fixed-size parts. Bodies smaller than one part
//! go out as a single PutObject; larger ones use a multipart upload.

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::{ByteStream, DateTime as SmithyDateTime};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::backend::{BackendError, CannedAcl, ObjectHeaders, S3Backend, UploadRequest};
use super::{ObjectReader, Stat};
use crate::config::StoreConfig;
use crate::errors::Result;

/// Size of each multipart upload part (S3 requires at least 5 MiB).
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Error codes the store uses for a missing key.
const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NotFound"];

/// S3 client bound to one session
#[derive(Debug, Clone)]
pub struct AwsClient {
    client: Client,
    part_size: usize,
}

impl AwsClient {
    /// Build the SDK session from `config`
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "Initializing S3 client"
        );

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "s3-storage-static",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.path_style())
            .build();

        Ok(Self {
            client: Client::from_conf(s3_config),
            part_size: PART_SIZE,
        })
    }

    /// Override the multipart part size
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size;
        self
    }

    async fn put_single(&self, target: &Target, body: Bytes) -> std::result::Result<(), BackendError> {
        debug!(key = %target.key, size = body.len(), "PutObject");
        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .acl(target.acl.clone())
            .set_content_type(target.content_type.clone())
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        target: &Target,
        body: &mut ObjectReader,
        first: Bytes,
    ) -> std::result::Result<(), BackendError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&target.bucket)
            .key(&target.key)
            .acl(target.acl.clone())
            .set_content_type(target.content_type.clone())
            .send()
            .await
            .map_err(service_error)?;
        let upload_id = created
            .upload_id()
            .ok_or(BackendError::MissingMetadata("upload id"))?
            .to_string();
        debug!(key = %target.key, upload_id = %upload_id, "Multipart upload started");

        // dropped with the future on cancellation, which still aborts the upload
        let guard = AbortGuard::new(&self.client, target, &upload_id);
        let result = async {
            let parts = self.upload_parts(target, body, &upload_id, first).await?;
            self.client
                .complete_multipart_upload()
                .bucket(&target.bucket)
                .key(&target.key)
                .upload_id(&upload_id)
                .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
                .send()
                .await
                .map_err(service_error)?;
            Ok::<_, BackendError>(())
        }
        .await;

        match result {
            Ok(()) => {
                guard.disarm();
                Ok(())
            }
            Err(e) => {
                guard.abort().await;
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        target: &Target,
        body: &mut ObjectReader,
        upload_id: &str,
        first: Bytes,
    ) -> std::result::Result<Vec<CompletedPart>, BackendError> {
        let mut parts = vec![];
        let mut part_number: i32 = 1;
        let mut chunk = first;

        while !chunk.is_empty() {
            let size = chunk.len();
            let uploaded = self
                .client
                .upload_part()
                .bucket(&target.bucket)
                .key(&target.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(service_error)?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag)
                    .part_number(part_number)
                    .build(),
            );
            debug!(part_number, size, "Uploaded part");

            // a short part is the last one
            if size < self.part_size {
                break;
            }
            part_number += 1;
            chunk = read_part(body, self.part_size).await?;
        }

        Ok(parts)
    }
}

/// Where an upload goes and how it is stored
struct Target {
    bucket: String,
    key: String,
    content_type: Option<String>,
    acl: ObjectCannedAcl,
}

/// Aborts a multipart upload unless disarmed
///
/// Dropping an armed guard sends the abort from a spawned task, so parts
/// already stored are released even when the upload future is cancelled.
struct AbortGuard {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    armed: bool,
}

impl AbortGuard {
    fn new(client: &Client, target: &Target, upload_id: &str) -> Self {
        Self {
            client: client.clone(),
            bucket: target.bucket.clone(),
            key: target.key.clone(),
            upload_id: upload_id.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    /// Abort in place, for failures seen while the caller is still waiting.
    async fn abort(mut self) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await;
        self.armed = false;
        match result {
            Ok(_) => debug!(upload_id = %self.upload_id, "Multipart upload aborted"),
            Err(e) => warn!(upload_id = %self.upload_id, error = %e, "Failed to abort multipart upload"),
        }
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(upload_id = %self.upload_id, "No runtime left to abort multipart upload");
            return;
        };

        let request = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id);
        let upload_id = std::mem::take(&mut self.upload_id);
        handle.spawn(async move {
            match request.send().await {
                Ok(_) => debug!(upload_id = %upload_id, "Abandoned multipart upload aborted"),
                Err(e) => warn!(upload_id = %upload_id, error = %e, "Failed to abort abandoned multipart upload"),
            }
        });
    }
}

#[async_trait]
impl S3Backend for AwsClient {
    async fn upload(&self, request: UploadRequest) -> std::result::Result<(), BackendError> {
        let UploadRequest {
            bucket,
            key,
            mut body,
            content_type,
            acl,
        } = request;
        let target = Target {
            bucket,
            key,
            content_type: content_type.map(|m| m.to_string()),
            acl: canned_acl(acl),
        };

        let first = read_part(&mut body, self.part_size).await?;
        if first.len() < self.part_size {
            self.put_single(&target, first).await
        } else {
            self.put_multipart(&target, &mut body, first).await
        }
    }

    async fn head_object(&self, bucket: &str, key: &str) -> std::result::Result<Stat, BackendError> {
        let out = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| lookup_error(e, HeadObjectError::is_not_found))?;
        headers(out.last_modified(), out.content_length()).to_stat()
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<(ObjectReader, ObjectHeaders), BackendError> {
        let out = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| lookup_error(e, GetObjectError::is_no_such_key))?;
        let headers = headers(out.last_modified(), out.content_length());
        let body: ObjectReader = Box::pin(out.body.into_async_read());
        Ok((body, headers))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> std::result::Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }
}

/// Read up to `size` bytes, fewer only at end of stream.
async fn read_part(body: &mut ObjectReader, size: usize) -> std::result::Result<Bytes, BackendError> {
    let mut buf = Vec::with_capacity(size);
    body.take(size as u64)
        .read_to_end(&mut buf)
        .await
        .map_err(BackendError::Body)?;
    Ok(Bytes::from(buf))
}

fn canned_acl(acl: CannedAcl) -> ObjectCannedAcl {
    match acl {
        CannedAcl::PublicRead => ObjectCannedAcl::PublicRead,
    }
}

/// Failure of an upload or delete request; no code means a missing key here.
fn service_error<E>(err: SdkError<E, HttpResponse>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    BackendError::Service {
        code: err.code().map(str::to_string),
        source: Box::new(err),
    }
}

/// Classify a HEAD or GET error, by typed variant first and error code second.
fn lookup_error<E>(err: SdkError<E, HttpResponse>, is_not_found: impl FnOnce(&E) -> bool) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let missing = err.as_service_error().is_some_and(is_not_found)
        || err.code().is_some_and(|code| NOT_FOUND_CODES.contains(&code));

    if missing {
        return BackendError::NotFound {
            code: err.code().unwrap_or("NotFound").to_string(),
        };
    }
    service_error(err)
}

fn headers(last_modified: Option<&SmithyDateTime>, content_length: Option<i64>) -> ObjectHeaders {
    ObjectHeaders {
        last_modified: last_modified
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
        content_length: content_length.map(|len| len.max(0) as u64),
    }
}
