//! File storage types.

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Object key inside the bucket, e.g. `cars/<uuid>.png`.
    pub path: String,
    pub content_type: String,
    pub size: u64,
}

/// Request to upload a file.
#[derive(Debug, Clone)]
pub struct FileUploadRequest {
    pub path: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

impl FileUploadRequest {
    pub fn new(path: impl Into<String>, content: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content,
            content_type: content_type.into(),
        }
    }
}

/// Error type for file storage operations.
#[derive(Debug, thiserror::Error)]
pub enum FileStorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Only JPEG, PNG and WebP images are allowed, got {0}")]
    InvalidFileType(String),

    #[error("Image too large: {size} bytes exceeds maximum {max_size} bytes")]
    FileTooLarge { size: u64, max_size: u64 },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),
}
