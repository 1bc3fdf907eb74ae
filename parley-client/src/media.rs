//! Uploads to the third-party media host. Only the returned URL ever reaches the backend.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use parley_common::MediaKind;
use reqwest::{multipart, Client};
use serde::Deserialize;

use crate::{
    config::MediaConfig,
    error::{ClientError, Result},
};

/// A local file ready to upload.
#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Stores the file and returns its public URL.
    async fn upload(&self, upload: Upload) -> Result<Arc<str>>;
}

/// Guesses the MIME type from the file extension.
pub fn mime_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => return None,
    })
}

/// Image or video, for attachments. Anything else is rejected before uploading.
pub fn classify_attachment(path: &Path) -> Result<(MediaKind, &'static str)> {
    mime_for(path)
        .and_then(|mime| MediaKind::from_mime(mime).map(|kind| (kind, mime)))
        .ok_or_else(|| ClientError::validation("Please select an image or a video"))
}

/// Profile pictures must be jpeg or png.
pub fn check_profile_picture(path: &Path) -> Result<&'static str> {
    match mime_for(path) {
        Some(mime @ ("image/jpeg" | "image/png")) => Ok(mime),
        _ => Err(ClientError::validation("Please select an image (jpeg/png)")),
    }
}

pub async fn read_upload(path: &Path, mime: &'static str) -> Result<Upload> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_owned());
    Ok(Upload {
        file_name,
        mime,
        bytes,
    })
}

/// Unsigned multipart upload in the Cloudinary style.
#[derive(Clone, Debug)]
pub struct UploadHost {
    client: Client,
    config: MediaConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

impl UploadHost {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl MediaHost for UploadHost {
    async fn upload(&self, upload: Upload) -> Result<Arc<str>> {
        let size = upload.bytes.len();
        let part = multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(upload.mime)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.config.upload_preset.clone());
        let response = self
            .client
            .post(self.config.upload_url.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Upload(status.to_string()));
        }
        let body: UploadResponse = response.json().await?;
        let url = body
            .secure_url
            .or(body.url)
            .ok_or_else(|| ClientError::Upload("response has no url".to_owned()))?;
        tracing::debug!(size, %url, "uploaded media");
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_are_images_or_videos() {
        assert_eq!(
            classify_attachment(Path::new("a/b/Photo.JPG")).unwrap(),
            (MediaKind::Image, "image/jpeg")
        );
        assert_eq!(
            classify_attachment(Path::new("clip.mp4")).unwrap().0,
            MediaKind::Video
        );
        assert!(matches!(
            classify_attachment(Path::new("notes.txt")),
            Err(ClientError::Validation(_))
        ));
        assert!(classify_attachment(Path::new("no_extension")).is_err());
    }

    #[test]
    fn profile_pictures_are_jpeg_or_png() {
        assert!(check_profile_picture(Path::new("me.png")).is_ok());
        assert!(check_profile_picture(Path::new("me.jpeg")).is_ok());
        assert!(check_profile_picture(Path::new("me.gif")).is_err());
    }

    #[tokio::test]
    async fn reads_file_into_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, b"png bytes").unwrap();
        let upload = read_upload(&path, "image/png").await.unwrap();
        assert_eq!(upload.file_name, "cat.png");
        assert_eq!(upload.bytes, b"png bytes");
    }
}
