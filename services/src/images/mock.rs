//! Mock file storage for testing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::traits::FileStorage;
use super::types::{FileMetadata, FileStorageError, FileUploadRequest};

/// In-memory mock implementation of `FileStorage` for testing.
#[derive(Clone, Default)]
pub struct MockFileStorage {
    files: Arc<RwLock<HashMap<String, MockFile>>>,
}

#[derive(Clone)]
struct MockFile {
    content: Vec<u8>,
    metadata: FileMetadata,
}

impl MockFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored bytes for `path`, if any.
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .expect("lock poisoned")
            .get(path)
            .map(|f| f.content.clone())
    }

    pub fn metadata(&self, path: &str) -> Option<FileMetadata> {
        self.files
            .read()
            .expect("lock poisoned")
            .get(path)
            .map(|f| f.metadata.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .files
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl FileStorage for MockFileStorage {
    type Error = FileStorageError;

    async fn upload_file(&self, request: FileUploadRequest) -> Result<FileMetadata, Self::Error> {
        let metadata = FileMetadata {
            path: request.path.clone(),
            content_type: request.content_type,
            size: request.content.len() as u64,
        };

        let file = MockFile {
            content: request.content,
            metadata: metadata.clone(),
        };

        self.files
            .write()
            .expect("lock poisoned")
            .insert(request.path, file);
        Ok(metadata)
    }

    async fn delete_file(&self, path: &str) -> Result<bool, Self::Error> {
        let mut files = self.files.write().expect("lock poisoned");
        Ok(files.remove(path).is_some())
    }

    async fn file_exists(&self, path: &str) -> Result<bool, Self::Error> {
        let files = self.files.read().expect("lock poisoned");
        Ok(files.contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_delete() {
        let storage = MockFileStorage::new();
        let metadata = storage
            .upload_file(FileUploadRequest::new(
                "cars/a.png",
                b"fake image".to_vec(),
                "image/png",
            ))
            .await
            .unwrap();

        assert_eq!(metadata.path, "cars/a.png");
        assert_eq!(metadata.size, 10);
        assert_eq!(storage.metadata("cars/a.png"), Some(metadata));
        assert!(storage.file_exists("cars/a.png").await.unwrap());
        assert_eq!(storage.content("cars/a.png"), Some(b"fake image".to_vec()));

        assert!(storage.delete_file("cars/a.png").await.unwrap());
        assert!(!storage.delete_file("cars/a.png").await.unwrap());
        assert!(storage.is_empty());
    }
}
