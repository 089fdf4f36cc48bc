//! External object storage collaborator
//!
//! Uploaded media lives outside the process. The relay only needs two
//! fallible operations: upload a file and best-effort delete by media ID.
//! The trait seam keeps the coordinator testable without a network.

use std::future::Future;

use serde::Deserialize;

/// Coarse classification of an uploaded file, derived from its declared
/// content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Video,
    /// Anything else (documents, binaries)
    Raw,
}

impl ResourceType {
    /// Classify a declared content type
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.starts_with("image/") => ResourceType::Image,
            Some(ct) if ct.starts_with("video/") => ResourceType::Video,
            _ => ResourceType::Raw,
        }
    }

    /// Path segment used by the storage API
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedMedia {
    /// Public URL clients embed in messages
    pub url: String,
    /// Opaque identifier used for later deletion
    #[serde(rename = "mediaId")]
    pub media_id: String,
}

/// Error type for storage operations
#[derive(Debug)]
pub enum StorageError {
    /// Transport-level failure
    Request(reqwest::Error),
    /// The storage service answered with a non-success status
    Rejected { status: u16, message: String },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Request(e) => write!(f, "Storage request failed: {}", e),
            StorageError::Rejected { status, message } => {
                write!(f, "Storage rejected request ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Request(e) => Some(e),
            StorageError::Rejected { .. } => None,
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Request(e)
    }
}

/// External object storage
///
/// `delete` is best-effort by contract: callers log failures and move on,
/// never retry or block teardown on it.
pub trait ObjectStorage: Send + Sync + 'static {
    /// Upload a file, returning its public URL and media ID
    fn upload(
        &self,
        data: Vec<u8>,
        filename: String,
        resource_type: ResourceType,
    ) -> impl Future<Output = Result<UploadedMedia, StorageError>> + Send;

    /// Delete a previously uploaded asset
    fn delete(&self, media_id: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// HTTP-backed object storage client
///
/// Talks to a storage service with two endpoints:
/// `POST {base}/upload/{resource_type}` (multipart field `file`) and
/// `DELETE {base}/media/{media_id}`, both authorized by a bearer secret.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: String,
    secret: String,
}

impl HttpObjectStorage {
    /// Create a client for the given service base URL
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            secret: secret.into(),
        }
    }
}

impl ObjectStorage for HttpObjectStorage {
    async fn upload(
        &self,
        data: Vec<u8>,
        filename: String,
        resource_type: ResourceType,
    ) -> Result<UploadedMedia, StorageError> {
        let part = reqwest::multipart::Part::bytes(data).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload/{}", self.base_url, resource_type.as_str()))
            .bearer_auth(&self.secret)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let media = response.json::<UploadedMedia>().await?;
        tracing::debug!(media_id = %media.media_id, "Media uploaded");
        Ok(media)
    }

    async fn delete(&self, media_id: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(format!("{}/media/{}", self.base_url, media_id))
            .bearer_auth(&self.secret)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Recording storage double for tests
///
/// Remembers every delete attempt and can be told to fail for specific
/// media IDs.
#[cfg(test)]
pub struct MockStorage {
    pub deleted: std::sync::Mutex<Vec<String>>,
    pub fail_deletes: std::sync::Mutex<std::collections::HashSet<String>>,
}

#[cfg(test)]
impl MockStorage {
    pub fn new() -> Self {
        Self {
            deleted: std::sync::Mutex::new(Vec::new()),
            fail_deletes: std::sync::Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub fn fail_delete_of(&self, media_id: &str) {
        self.fail_deletes.lock().unwrap().insert(media_id.to_string());
    }

    pub fn delete_attempts(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ObjectStorage for MockStorage {
    async fn upload(
        &self,
        _data: Vec<u8>,
        filename: String,
        _resource_type: ResourceType,
    ) -> Result<UploadedMedia, StorageError> {
        Ok(UploadedMedia {
            url: format!("http://storage.test/{}", filename),
            media_id: filename,
        })
    }

    async fn delete(&self, media_id: &str) -> Result<(), StorageError> {
        self.deleted.lock().unwrap().push(media_id.to_string());
        if self.fail_deletes.lock().unwrap().contains(media_id) {
            return Err(StorageError::Rejected {
                status: 500,
                message: "injected failure".into(),
            });
        }
        Ok(())
    }
}
