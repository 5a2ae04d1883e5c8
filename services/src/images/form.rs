//! Multipart forms carrying text fields and at most one image.

use axum::extract::Multipart;
use std::collections::HashMap;

use super::ImageUpload;
use crate::api::ApiResult;

/// Field name the image is expected under in every upload form.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Default)]
pub struct ImageForm {
    fields: HashMap<String, String>,
    image: Option<ImageUpload>,
}

impl ImageForm {
    /// Drain a multipart body. Text parts are kept by name; the `image` part
    /// is kept as bytes. Parts without a name are skipped.
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            if name == IMAGE_FIELD {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let bytes = field.bytes().await?;
                if bytes.is_empty() {
                    continue;
                }
                form.image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// A text part, trimmed, or `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn take_image(&mut self) -> Option<ImageUpload> {
        self.image.take()
    }

    #[cfg(test)]
    pub(crate) fn with_text(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_owned(), value.to_owned());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_reads_as_missing() {
        let form = ImageForm::default()
            .with_text("carId", "  ")
            .with_text("carData", " {} ");
        assert_eq!(form.text("carId"), None);
        assert_eq!(form.text("carData"), Some("{}"));
        assert_eq!(form.text("other"), None);
    }
}
