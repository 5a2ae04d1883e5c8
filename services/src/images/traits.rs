//! Storage trait definitions.

use super::types::{FileMetadata, FileUploadRequest};
use std::future::Future;

/// Generic interface for object storage backends.
pub trait FileStorage: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn upload_file(
        &self,
        request: FileUploadRequest,
    ) -> impl Future<Output = Result<FileMetadata, Self::Error>> + Send;

    /// Returns `false` when there was nothing to delete.
    fn delete_file(&self, path: &str) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    fn file_exists(&self, path: &str) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}
