use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available: build with the `tesseract` feature")]
    NotAvailable,
    #[error("Vision API key is not configured")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Vision API error: {0}")]
    Api(String),
    #[error("No text detected")]
    NoText,
}

/// Abstraction over an OCR backend.
/// Implementations accept raw PNG/JPEG image bytes and return the recognized text.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        (**self).recognize(image_bytes)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string, for exercising the batch pipeline without a
/// network or an OCR engine.
pub struct MockRecognizer {
    pub text: String,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }
}

// ── Google Cloud Vision (REST, API key) ───────────────────────────────────────

#[derive(Deserialize)]
struct AnnotateBatch {
    #[serde(default)]
    responses: Vec<AnnotateResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    description: String,
}

#[derive(Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

/// Full text of the first annotation in an `images:annotate` reply.
fn parse_annotate_response(body: &str) -> Result<String, OcrError> {
    let batch: AnnotateBatch =
        serde_json::from_str(body).map_err(|e| OcrError::Api(format!("malformed response: {e}")))?;
    let response = batch.responses.into_iter().next().ok_or(OcrError::NoText)?;

    if let Some(err) = response.error.filter(|e| !e.message.is_empty()) {
        return Err(OcrError::Api(err.message));
    }
    response
        .text_annotations
        .into_iter()
        .next()
        .map(|a| a.description)
        .ok_or(OcrError::NoText)
}

/// Text detection through the Cloud Vision `images:annotate` endpoint.
pub struct CloudVisionRecognizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl CloudVisionRecognizer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OcrError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(OcrError::MissingApiKey);
        }
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

impl OcrBackend for CloudVisionRecognizer {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        let request = json!({
            "requests": [{
                "image": { "content": general_purpose::STANDARD.encode(image_bytes) },
                "features": [{ "type": "TEXT_DETECTION" }],
            }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(OcrError::Api(format!("status {}: {body}", status.as_u16())));
        }

        let text = parse_annotate_response(&body)?;
        debug!(chars = text.chars().count(), "Vision text detected");
        Ok(text)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use leptess::LepTess;

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}
