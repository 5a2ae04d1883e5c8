//! Cloudflare R2 storage implementation.

use opendal::Operator;

use super::mock::MockFileStorage;
use super::traits::FileStorage;
use super::types::{FileMetadata, FileStorageError, FileUploadRequest};

/// Configuration for Cloudflare R2.
#[derive(Clone)]
pub struct CFDiskConfig {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

#[derive(Clone)]
enum Backend {
    R2(Operator),
    Mock(MockFileStorage),
}

/// Cloudflare R2 file storage, or an in-memory stand-in when no bucket is
/// configured (local runs and tests).
#[derive(Clone)]
pub struct CFFileStorage {
    backend: Backend,
}

impl CFFileStorage {
    pub fn new_for_test() -> Self {
        Self::with_mock(MockFileStorage::new())
    }

    /// Share a mock with the caller so tests can inspect what was stored.
    pub fn with_mock(mock: MockFileStorage) -> Self {
        Self {
            backend: Backend::Mock(mock),
        }
    }

    pub fn new(config: &CFDiskConfig) -> Result<Self, FileStorageError> {
        let builder = opendal::services::S3::default()
            .bucket(&config.bucket)
            .region("auto")
            .access_key_id(&config.access_key_id)
            .secret_access_key(&config.secret_access_key)
            .endpoint(&format!(
                "https://{}.r2.cloudflarestorage.com",
                config.account_id
            ));

        let op = Operator::new(builder)
            .map(|op| op.finish())
            .map_err(|e| FileStorageError::ConnectionError(e.to_string()))?;

        Ok(Self {
            backend: Backend::R2(op),
        })
    }
}

impl Default for CFFileStorage {
    fn default() -> Self {
        Self::new_for_test()
    }
}

fn storage_err(e: opendal::Error) -> FileStorageError {
    FileStorageError::StorageError(e.to_string())
}

impl FileStorage for CFFileStorage {
    type Error = FileStorageError;

    async fn upload_file(&self, request: FileUploadRequest) -> Result<FileMetadata, Self::Error> {
        let op = match &self.backend {
            Backend::Mock(mock) => return mock.upload_file(request).await,
            Backend::R2(op) => op,
        };

        let size = request.content.len() as u64;
        op.write_with(&request.path, request.content)
            .content_type(&request.content_type)
            .await
            .map_err(storage_err)?;

        Ok(FileMetadata {
            path: request.path,
            content_type: request.content_type,
            size,
        })
    }

    async fn delete_file(&self, path: &str) -> Result<bool, Self::Error> {
        let op = match &self.backend {
            Backend::Mock(mock) => return mock.delete_file(path).await,
            Backend::R2(op) => op,
        };

        if !op.exists(path).await.map_err(storage_err)? {
            return Ok(false);
        }
        op.delete(path).await.map_err(storage_err)?;
        Ok(true)
    }

    async fn file_exists(&self, path: &str) -> Result<bool, Self::Error> {
        match &self.backend {
            Backend::Mock(mock) => mock.file_exists(path).await,
            Backend::R2(op) => op.exists(path).await.map_err(storage_err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mode_delegates_to_mock() {
        let mock = MockFileStorage::new();
        let storage = CFFileStorage::with_mock(mock.clone());

        let request = FileUploadRequest::new("users/a.png", b"fake image".to_vec(), "image/png");
        let metadata = storage.upload_file(request).await.unwrap();
        assert_eq!(metadata.path, "users/a.png");

        assert!(storage.file_exists("users/a.png").await.unwrap());
        assert_eq!(mock.len(), 1);

        assert!(storage.delete_file("users/a.png").await.unwrap());
        assert!(mock.is_empty());
    }

    #[test]
    fn r2_backend_builds_from_config() {
        let config = CFDiskConfig {
            account_id: "acct".into(),
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            bucket: "images".into(),
        };
        assert!(CFFileStorage::new(&config).is_ok());
    }
}
