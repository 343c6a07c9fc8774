//! In-memory [`S3Backend`] for tests

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use tokio::io::AsyncReadExt;

use super::backend::{BackendError, CannedAcl, ObjectHeaders, S3Backend, UploadRequest};
use super::{ObjectReader, Stat};

#[derive(Debug, Clone)]
pub(crate) struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub acl: CannedAcl,
    pub modified: DateTime<Utc>,
}

/// Calls received per primitive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Calls {
    pub upload: usize,
    pub head: usize,
    pub get: usize,
    pub delete: usize,
}

#[derive(Default)]
struct State {
    objects: HashMap<(String, String), StoredObject>,
    calls: Calls,
    fail_code: Option<String>,
    hang: bool,
}

/// Behaves like S3: deleting a missing key succeeds, HEAD on a missing key
/// reports `NotFound`, GET reports `NoSuchKey`.
#[derive(Default)]
pub(crate) struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object stored under `key` in any bucket
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .iter()
            .find(|((_, k), _)| k == key)
            .map(|(_, object)| object.clone())
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls
    }

    /// Fail every subsequent call with a service error carrying `code`
    pub fn fail_with(&self, code: &str) {
        self.state.lock().unwrap().fail_code = Some(code.to_string());
    }

    /// Never answer any subsequent call
    pub fn hang(&self) {
        self.state.lock().unwrap().hang = true;
    }

    /// Count the call, then apply injected behaviour.
    async fn enter(&self, count: impl FnOnce(&mut Calls)) -> Result<(), BackendError> {
        let (hang, fail_code) = {
            let mut state = self.state.lock().unwrap();
            count(&mut state.calls);
            (state.hang, state.fail_code.clone())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        match fail_code {
            Some(code) => Err(BackendError::Service {
                code: Some(code.clone()),
                source: format!("injected failure {}", code).into(),
            }),
            None => Ok(()),
        }
    }

    fn lookup(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

fn stat_of(object: &StoredObject) -> Stat {
    Stat {
        modified_time: object.modified,
        size: object.data.len() as u64,
    }
}

#[async_trait]
impl S3Backend for MemoryBackend {
    async fn upload(&self, mut request: UploadRequest) -> Result<(), BackendError> {
        self.enter(|calls| calls.upload += 1).await?;

        let mut data = Vec::new();
        request
            .body
            .read_to_end(&mut data)
            .await
            .map_err(BackendError::Body)?;

        let object = StoredObject {
            data,
            content_type: request.content_type.map(|m| m.to_string()),
            acl: request.acl,
            // S3 keeps whole seconds
            modified: Utc::now().trunc_subsecs(0),
        };
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((request.bucket, request.key), object);
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Stat, BackendError> {
        self.enter(|calls| calls.head += 1).await?;
        self.lookup(bucket, key)
            .map(|object| stat_of(&object))
            .ok_or_else(|| BackendError::NotFound {
                code: "NotFound".to_string(),
            })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(ObjectReader, ObjectHeaders), BackendError> {
        self.enter(|calls| calls.get += 1).await?;
        let object = self.lookup(bucket, key).ok_or_else(|| BackendError::NotFound {
            code: "NoSuchKey".to_string(),
        })?;
        let headers = ObjectHeaders {
            last_modified: Some(object.modified),
            content_length: Some(object.data.len() as u64),
        };
        let body: ObjectReader = Box::pin(Cursor::new(object.data));
        Ok((body, headers))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
        self.enter(|calls| calls.delete += 1).await?;
        self.state
            .lock()
            .unwrap()
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}
