// ============================================================================
// Object Store
// ============================================================================
//
// Raw media bytes. Keys have the form `{resource_type}/{uuid}`; the resource
// type is derived from the upload's MIME type.
//
// ============================================================================

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("Object store IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ObjectStoreError> for pulse_error::AppError {
    fn from(err: ObjectStoreError) -> Self {
        pulse_error::AppError::object_store(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

impl ResourceType {
    pub fn from_mime(mime_type: &str) -> Self {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if mime_type.starts_with("image/") {
            ResourceType::Image
        } else if mime_type.starts_with("video/") {
            ResourceType::Video
        } else {
            ResourceType::Raw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(ResourceType::Image),
            "video" => Some(ResourceType::Video),
            "raw" => Some(ResourceType::Raw),
            _ => None,
        }
    }
}

/// Location of an uploaded object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        resource_type: ResourceType,
        data: Bytes,
    ) -> Result<StoredObject, ObjectStoreError>;

    /// Remove an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}

/// Split `{type}/{uuid}` into its parts, rejecting anything else
pub fn parse_key(key: &str) -> Result<(ResourceType, Uuid), ObjectStoreError> {
    let invalid = || ObjectStoreError::InvalidKey(key.to_string());

    let (kind, id) = key.split_once('/').ok_or_else(invalid)?;
    let kind = ResourceType::parse(kind).ok_or_else(invalid)?;
    let id = Uuid::parse_str(id).map_err(|_| invalid())?;
    Ok((kind, id))
}

/// Objects stored as files under a root directory
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        let (kind, id) = parse_key(key)?;
        Ok(self.root.join(kind.as_str()).join(id.to_string()))
    }

    /// Object bytes, or `None` if the key is unknown
    pub async fn read(&self, key: &str) -> Result<Option<Bytes>, ObjectStoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(
        &self,
        resource_type: ResourceType,
        data: Bytes,
    ) -> Result<StoredObject, ObjectStoreError> {
        let key = format!("{}/{}", resource_type.as_str(), Uuid::new_v4());
        let path = self.path_for(&key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;

        tracing::debug!(key = %key, size_bytes = data.len(), "Object stored");
        Ok(StoredObject {
            url: format!("{}/{}", self.public_base_url, key),
            key,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key = %key, "Object already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use memory::InMemoryObjectStore;

#[cfg(any(test, feature = "test-util"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryObjectStore {
        objects: Mutex<HashMap<String, Bytes>>,
        fail_uploads: AtomicBool,
        fail_deletes: AtomicBool,
    }

    impl InMemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn contains(&self, key: &str) -> bool {
            self.objects.lock().unwrap().contains_key(key)
        }

        pub fn len(&self) -> usize {
            self.objects.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn set_fail_uploads(&self, fail: bool) {
            self.fail_uploads.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, Ordering::SeqCst);
        }
    }

    fn injected() -> ObjectStoreError {
        ObjectStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "injected failure",
        ))
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        async fn upload(
            &self,
            resource_type: ResourceType,
            data: Bytes,
        ) -> Result<StoredObject, ObjectStoreError> {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(injected());
            }
            let key = format!("{}/{}", resource_type.as_str(), Uuid::new_v4());
            self.objects.lock().unwrap().insert(key.clone(), data);
            Ok(StoredObject {
                url: format!("memory://{}", key),
                key,
            })
        }

        async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(injected());
            }
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }
    }
}
