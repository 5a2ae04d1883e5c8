//! Image uploads backed by object storage (OpenDAL, Cloudflare R2).
//!
//! [`ImageStore`] validates uploads, keys them as `<folder>/<account>/<id>.<ext>`
//! under `cars/` or `users/`, and returns the public URL with a resize hint
//! for the CDN. Removal is scoped the same way: an account can only delete
//! objects under its own prefix.

mod cloudflare;
mod form;
mod mock;
mod traits;
mod types;

pub use cloudflare::{CFDiskConfig, CFFileStorage};
pub use form::{IMAGE_FIELD, ImageForm};
pub use mock::MockFileStorage;
pub use traits::FileStorage;
pub use types::{FileMetadata, FileStorageError, FileUploadRequest};

use uuid::Uuid;

use crate::config::Config;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_TYPES: [(&str, &str); 4] = [
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Car,
    Avatar,
}

impl ImageKind {
    fn folder(self) -> &'static str {
        match self {
            ImageKind::Car => "cars",
            ImageKind::Avatar => "users",
        }
    }

    fn width(self) -> u32 {
        match self {
            ImageKind::Car => 1280,
            ImageKind::Avatar => 400,
        }
    }
}

/// An image received from a multipart form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Returns the file extension for an accepted content type.
fn extension_for(content_type: &str) -> Option<&'static str> {
    let content_type = content_type.trim().to_ascii_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

pub fn validate_image(upload: &ImageUpload) -> Result<&'static str, FileStorageError> {
    if upload.bytes.len() > MAX_IMAGE_BYTES {
        return Err(FileStorageError::FileTooLarge {
            size: upload.bytes.len() as u64,
            max_size: MAX_IMAGE_BYTES as u64,
        });
    }
    extension_for(&upload.content_type)
        .ok_or_else(|| FileStorageError::InvalidFileType(upload.content_type.clone()))
}

#[derive(Clone)]
pub struct ImageStore {
    storage: CFFileStorage,
    public_url: String,
}

impl ImageStore {
    pub fn new(storage: CFFileStorage, public_url: impl Into<String>) -> Self {
        Self {
            storage,
            public_url: public_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// R2 when credentials are configured, otherwise an in-memory store.
    pub fn from_config(config: &Config) -> Result<Self, FileStorageError> {
        let storage = match (
            config.cf_account_id(),
            config.cf_access_key_id(),
            config.cf_secret_access_key(),
            config.cf_bucket(),
        ) {
            (Some(account_id), Some(access_key_id), Some(secret_access_key), Some(bucket)) => {
                CFFileStorage::new(&CFDiskConfig {
                    account_id: account_id.to_owned(),
                    access_key_id: access_key_id.to_owned(),
                    secret_access_key: secret_access_key.to_owned(),
                    bucket: bucket.to_owned(),
                })?
            }
            _ => {
                tracing::warn!("R2 credentials not configured, images are kept in memory");
                CFFileStorage::new_for_test()
            }
        };
        Ok(Self::new(storage, config.image_public_url()))
    }

    pub fn new_for_test(mock: MockFileStorage) -> Self {
        Self::new(CFFileStorage::with_mock(mock), "https://img.test")
    }

    /// Validate and store an image uploaded by `account`, returning its
    /// public URL.
    pub async fn store(
        &self,
        kind: ImageKind,
        account: Uuid,
        upload: ImageUpload,
    ) -> Result<String, FileStorageError> {
        let extension = validate_image(&upload)?;
        let path = format!(
            "{}/{}/{}.{}",
            kind.folder(),
            account,
            Uuid::new_v4(),
            extension
        );
        tracing::debug!(file_name = ?upload.file_name, %path, "Storing image");

        let metadata = self
            .storage
            .upload_file(FileUploadRequest::new(path, upload.bytes, upload.content_type))
            .await?;

        tracing::debug!(path = %metadata.path, size = metadata.size, "Image stored");
        Ok(self.public_url_for(kind, &metadata.path))
    }

    pub fn public_url_for(&self, kind: ImageKind, path: &str) -> String {
        format!(
            "{}/{}?width={}&format=webp",
            self.public_url,
            path,
            kind.width()
        )
    }

    /// Object key behind one of our public URLs; `None` for foreign URLs.
    pub fn path_from_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        let rest = url.strip_prefix(self.public_url.as_str())?.strip_prefix('/')?;
        let path = rest.split('?').next().unwrap_or(rest);
        (!path.is_empty()).then_some(path)
    }

    /// Object key of an image of `kind` that `account` uploaded; `None` for
    /// foreign URLs and for anything outside the account's prefix.
    pub fn owned_path<'a>(&self, kind: ImageKind, account: Uuid, url: &'a str) -> Option<&'a str> {
        let path = self.path_from_url(url)?;
        let name = path
            .strip_prefix(kind.folder())?
            .strip_prefix('/')?
            .strip_prefix(account.to_string().as_str())?
            .strip_prefix('/')?;
        (!name.is_empty() && !name.contains('/')).then_some(path)
    }

    /// Best-effort removal of an image `account` uploaded. URLs it does not
    /// own are left alone.
    pub async fn remove(&self, kind: ImageKind, account: Uuid, url: &str) {
        let Some(path) = self.owned_path(kind, account, url) else {
            tracing::debug!(%account, "Skipping removal of an image the account does not own");
            return;
        };
        if let Err(e) = self.storage.delete_file(path).await {
            tracing::warn!(%path, error = %e, "Failed to delete replaced image");
        }
    }
}
