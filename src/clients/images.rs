use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ImageStoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage service returned status {0}")]
    Status(u16),

    #[error("invalid response payload: {0}")]
    InvalidResponse(String),
}

/// External object storage for classroom and profile images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Upload image bytes and return the public URL of the stored object.
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ImageStoreError>;
}

#[derive(Debug, Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: String,
}

/// Server-side Cloudinary upload using an unsigned preset.
#[derive(Debug, Clone)]
pub struct CloudinaryStore {
    http: reqwest::Client,
    cloud_name: String,
    upload_preset: String,
}

impl CloudinaryStore {
    pub fn new(
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
    ) -> Result<Self, ImageStoreError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ImageStoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
        })
    }
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ImageStoreError> {
        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );

        let form = reqwest::multipart::Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
            );

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ImageStoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageStoreError::Status(status.as_u16()));
        }

        let payload: CloudinaryUploadResponse = response
            .json()
            .await
            .map_err(|e| ImageStoreError::InvalidResponse(e.to_string()))?;

        debug!(file_name, url = %payload.secure_url, "Image uploaded");
        Ok(payload.secure_url)
    }
}

/// In-memory store for integration tests: returns deterministic URLs and
/// can be told to fail.
#[cfg(test)]
pub struct MockImageStore {
    uploads: std::sync::Mutex<Vec<String>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockImageStore {
    pub fn new() -> Self {
        Self {
            uploads: std::sync::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn uploaded_files(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ImageStore for MockImageStore {
    async fn upload(&self, file_name: &str, _bytes: Vec<u8>) -> Result<String, ImageStoreError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ImageStoreError::Transport(
                "mock upload failure".to_string(),
            ));
        }

        self.uploads.lock().unwrap().push(file_name.to_string());
        Ok(format!("https://images.test/{file_name}"))
    }
}
