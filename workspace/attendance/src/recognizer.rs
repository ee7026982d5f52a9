//! Client abstraction over the external face-recognition service.
//!
//! The service is consumed, never reimplemented: this module only ships
//! image URLs to it and maps its reply onto [`RecognitionOutcome`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::RecognitionOutcome;

/// Errors from the recognition client, tagged by whether a retry could help.
#[derive(Error, Debug)]
pub enum RecognizerError {
    /// Network-level failure (connect, timeout, TLS)
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status
    #[error("service returned status {0}")]
    Status(u16),

    /// The service answered 2xx but the payload did not parse
    #[error("invalid response payload: {0}")]
    InvalidResponse(String),
}

impl RecognizerError {
    /// Transport failures and 5xx responses are worth retrying later;
    /// 4xx responses and malformed payloads are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(code) => *code >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Trait for the recognition service.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Run recognition over the given classroom images and return which
    /// students were seen.
    async fn recognize(
        &self,
        image_urls: &[String],
    ) -> std::result::Result<RecognitionOutcome, RecognizerError>;

    /// Ask the service to (re)build the face embedding for one student's
    /// profile photo.
    async fn generate_embedding(
        &self,
        student_id: i32,
        image_url: &str,
    ) -> std::result::Result<(), RecognizerError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    image_urls: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeResponse {
    present_student_ids: Vec<i32>,
    /// Keyed by student id rendered as a JSON object key.
    #[serde(default)]
    confidences: HashMap<String, f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest<'a> {
    student_id: i32,
    image_url: &'a str,
}

/// HTTP client for the recognition microservice.
#[derive(Debug, Clone)]
pub struct HttpRecognizer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRecognizer {
    /// Recognition over several photos is slow; the service is given a
    /// generous fixed deadline.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

    pub fn new(base_url: impl Into<String>) -> std::result::Result<Self, RecognizerError> {
        let http = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RecognizerError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(
        &self,
        image_urls: &[String],
    ) -> std::result::Result<RecognitionOutcome, RecognizerError> {
        let url = format!("{}/api/ai/recognize", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&RecognizeRequest { image_urls })
            .send()
            .await
            .map_err(|e| RecognizerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognizerError::Status(status.as_u16()));
        }

        let payload: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| RecognizerError::InvalidResponse(e.to_string()))?;

        let confidences = payload
            .confidences
            .into_iter()
            .filter_map(|(id, confidence)| id.parse::<i32>().ok().map(|id| (id, confidence)))
            .collect();

        Ok(RecognitionOutcome {
            present_student_ids: payload.present_student_ids,
            confidences,
        })
    }

    async fn generate_embedding(
        &self,
        student_id: i32,
        image_url: &str,
    ) -> std::result::Result<(), RecognizerError> {
        let url = format!("{}/api/ai/generate-embedding", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EmbeddingRequest {
                student_id,
                image_url,
            })
            .send()
            .await
            .map_err(|e| RecognizerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognizerError::Status(status.as_u16()));
        }

        Ok(())
    }
}

/// A scriptable recognizer for tests: returns a configured present-list or
/// a transport failure, and records embedding requests.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRecognizer {
    present: std::sync::Mutex<Vec<i32>>,
    confidences: std::sync::Mutex<HashMap<i32, f32>>,
    fail: std::sync::atomic::AtomicBool,
    embeddings: std::sync::Mutex<Vec<(i32, String)>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockRecognizer {
    fn default() -> Self {
        Self {
            present: std::sync::Mutex::new(Vec::new()),
            confidences: std::sync::Mutex::new(HashMap::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
            embeddings: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_present(&self, student_ids: Vec<i32>) {
        *self.present.lock().unwrap() = student_ids;
    }

    pub fn set_confidence(&self, student_id: i32, confidence: f32) {
        self.confidences
            .lock()
            .unwrap()
            .insert(student_id, confidence);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn embedding_requests(&self) -> Vec<(i32, String)> {
        self.embeddings.lock().unwrap().clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(
        &self,
        _image_urls: &[String],
    ) -> std::result::Result<RecognitionOutcome, RecognizerError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RecognizerError::Transport(
                "mock transport failure".to_string(),
            ));
        }

        Ok(RecognitionOutcome {
            present_student_ids: self.present.lock().unwrap().clone(),
            confidences: self.confidences.lock().unwrap().clone(),
        })
    }

    async fn generate_embedding(
        &self,
        student_id: i32,
        image_url: &str,
    ) -> std::result::Result<(), RecognizerError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RecognizerError::Transport(
                "mock transport failure".to_string(),
            ));
        }

        self.embeddings
            .lock()
            .unwrap()
            .push((student_id, image_url.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_transient() {
        assert!(RecognizerError::Transport("timed out".to_string()).is_transient());
        assert!(RecognizerError::Status(503).is_transient());
        assert!(!RecognizerError::Status(422).is_transient());
        assert!(!RecognizerError::InvalidResponse("bad json".to_string()).is_transient());
    }

    #[tokio::test]
    async fn mock_recognizer_returns_configured_presents() {
        let mock = MockRecognizer::new();
        mock.set_present(vec![1, 3]);
        mock.set_confidence(1, 0.92);

        let outcome = mock.recognize(&["http://x/a.jpg".to_string()]).await.unwrap();
        assert_eq!(outcome.present_student_ids, vec![1, 3]);
        assert_eq!(outcome.confidence_for(1), Some(0.92));
        assert_eq!(outcome.confidence_for(3), None);
    }

    #[tokio::test]
    async fn mock_recognizer_fails_when_told_to() {
        let mock = MockRecognizer::new();
        mock.set_fail(true);

        let result = mock.recognize(&[]).await;
        assert!(matches!(result, Err(RecognizerError::Transport(_))));
    }
}
