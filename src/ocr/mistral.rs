//! Mistral OCR provider (Files API + OCR API).

use super::{OcrDocument, OcrInput, OcrProvider, ProviderError};
use crate::config::BotConfig;
use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub struct MistralOcrProvider {
    api_key: String,
    base_url: String,
    model: String,
    signed_url_expiry: u32,
    client: reqwest::Client,
}

impl MistralOcrProvider {
    pub fn new(config: &BotConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: config.mistral_api_key.clone(),
            base_url: config.mistral_base_url.trim_end_matches('/').to_string(),
            model: config.ocr_model.clone(),
            signed_url_expiry: config.signed_url_expiry,
            client,
        }
    }
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: DocumentSource,
    include_image_base64: bool,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "document_url")]
    Document { document_url: String },
    #[serde(rename = "image_url")]
    Image { image_url: String },
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    url: String,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn name(&self) -> &str {
        "mistral_ocr"
    }

    async fn process(&self, input: OcrInput) -> Result<OcrDocument, ProviderError> {
        let document = match input {
            OcrInput::ImageUrl(image_url) => DocumentSource::Image { image_url },
            OcrInput::Upload { file_name, bytes } => {
                let file_id = self.upload_file(&file_name, bytes).await?;
                let document_url = self.signed_url(&file_id).await?;
                DocumentSource::Document { document_url }
            }
        };

        let body = OcrRequest {
            model: &self.model,
            document,
            include_image_base64: true,
        };

        info!("MistralOcrProvider: calling OCR API with model {}", self.model);

        let resp = self
            .client
            .post(format!("{}/v1/ocr", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_failed)?;
        let raw_text = read_success("OCR", resp).await?;

        debug!(
            "MistralOcrProvider: raw response ({} bytes): {}",
            raw_text.len(),
            raw_text.chars().take(500).collect::<String>()
        );

        let document = OcrDocument::from_json(&raw_text)?;
        info!("MistralOcrProvider: received {} pages", document.pages.len());
        Ok(document)
    }
}

impl MistralOcrProvider {
    /// Upload raw bytes to Mistral Files API, return the file_id.
    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, OcrError> {
        use reqwest::multipart::{Form, Part};

        info!(
            "MistralOcrProvider: uploading {} ({} bytes) to Files API",
            file_name,
            bytes.len()
        );

        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime.as_ref())
            .map_err(request_failed)?;

        let form = Form::new().part("file", part).text("purpose", "ocr");

        let resp = self
            .client
            .post(format!("{}/v1/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(request_failed)?;
        let text = read_success("Files", resp).await?;

        let upload: FileUploadResponse = serde_json::from_str(&text).map_err(|e| {
            OcrError::OcrRequestFailed(format!("Mistral Files API returned no file id: {}", e))
        })?;
        info!("MistralOcrProvider: uploaded file_id={}", upload.id);
        Ok(upload.id)
    }

    /// Ask for a short-lived URL the OCR endpoint can read the upload from.
    async fn signed_url(&self, file_id: &str) -> Result<String, OcrError> {
        let resp = self
            .client
            .get(format!("{}/v1/files/{}/url", self.base_url, file_id))
            .query(&[("expiry", self.signed_url_expiry)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(request_failed)?;
        let text = read_success("signed URL", resp).await?;

        let signed: SignedUrlResponse = serde_json::from_str(&text).map_err(|e| {
            OcrError::OcrRequestFailed(format!("Mistral signed URL response unreadable: {}", e))
        })?;
        debug!("MistralOcrProvider: signed URL issued for file_id={}", file_id);
        Ok(signed.url)
    }
}

fn request_failed(e: reqwest::Error) -> OcrError {
    OcrError::OcrRequestFailed(e.to_string())
}

/// Return the body of a successful response, or the status and body as an error.
async fn read_success(api: &str, resp: reqwest::Response) -> Result<String, OcrError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(OcrError::OcrRequestFailed(format!(
            "Mistral {} API error ({}): {}",
            api, status, text
        )));
    }
    resp.text().await.map_err(request_failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrPage;
    use axum::{
        extract::{Multipart, Path, Query},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn config(base_url: String) -> BotConfig {
        BotConfig {
            bot_token: "123:abc".to_string(),
            mistral_api_key: "test-key".to_string(),
            mistral_base_url: base_url,
            ocr_model: "mistral-ocr-latest".to_string(),
            signed_url_expiry: 5,
            photo_direct_url: true,
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fake_mistral(log: Log) -> Router {
        let upload_log = log.clone();
        let url_log = log.clone();
        let ocr_log = log;

        Router::new()
            .route(
                "/v1/files",
                post(move |headers: HeaderMap, mut multipart: Multipart| {
                    let log = upload_log.clone();
                    async move {
                        assert_eq!(headers["authorization"], "Bearer test-key");
                        let mut purpose = String::new();
                        let mut file_name = String::new();
                        while let Some(field) = multipart.next_field().await.unwrap() {
                            let name = field.name().map(str::to_string);
                            match name.as_deref() {
                                Some("purpose") => purpose = field.text().await.unwrap(),
                                Some("file") => {
                                    file_name = field.file_name().unwrap_or_default().to_string();
                                    let _ = field.bytes().await.unwrap();
                                }
                                _ => {}
                            }
                        }
                        log.lock().unwrap().push(format!("upload {} {}", file_name, purpose));
                        Json(serde_json::json!({"id": "file-1"}))
                    }
                }),
            )
            .route(
                "/v1/files/:id/url",
                get(move |Path(id): Path<String>, Query(q): Query<HashMap<String, String>>| {
                    let log = url_log.clone();
                    async move {
                        log.lock().unwrap().push(format!("sign {} {}", id, q["expiry"]));
                        Json(serde_json::json!({"url": "https://files.example/signed"}))
                    }
                }),
            )
            .route(
                "/v1/ocr",
                post(move |Json(body): Json<serde_json::Value>| {
                    let log = ocr_log.clone();
                    async move {
                        log.lock().unwrap().push(format!("ocr {}", body["document"]));
                        assert_eq!(body["include_image_base64"], true);
                        assert_eq!(body["model"], "mistral-ocr-latest");
                        Json(serde_json::json!({
                            "pages": [{"index": 0, "markdown": "Hello", "images": []}]
                        }))
                    }
                }),
            )
    }

    #[tokio::test]
    async fn test_upload_sign_then_ocr() {
        let log: Log = Arc::default();
        let base = serve(fake_mistral(log.clone())).await;
        let provider = MistralOcrProvider::new(&config(base), reqwest::Client::new());

        let doc = provider
            .process(OcrInput::Upload {
                file_name: "scan.pdf".to_string(),
                bytes: b"%PDF-1.4".to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(doc.pages, vec![OcrPage::Markdown("Hello".to_string())]);
        let log = log.lock().unwrap();
        assert_eq!(log[0], "upload scan.pdf ocr");
        assert_eq!(log[1], "sign file-1 5");
        assert!(log[2].contains("document_url"));
        assert!(log[2].contains("https://files.example/signed"));
    }

    #[tokio::test]
    async fn test_image_url_skips_upload() {
        let log: Log = Arc::default();
        let base = serve(fake_mistral(log.clone())).await;
        let provider = MistralOcrProvider::new(&config(base), reqwest::Client::new());

        provider
            .process(OcrInput::ImageUrl("https://cdn.example/photo.jpg".to_string()))
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("\"type\":\"image_url\""));
        assert!(log[0].contains("https://cdn.example/photo.jpg"));
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status() {
        let app = Router::new().route(
            "/v1/ocr",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = serve(app).await;
        let provider = MistralOcrProvider::new(&config(base), reqwest::Client::new());

        let err = provider
            .process(OcrInput::ImageUrl("https://cdn.example/photo.jpg".to_string()))
            .await
            .unwrap_err();

        match err {
            ProviderError::Request(OcrError::OcrRequestFailed(msg)) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("bad key"));
            }
            other => panic!("expected OcrRequestFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreadable_body_is_normalization_failure() {
        let app = Router::new().route("/v1/ocr", post(|| async { "{\"result\": 1}" }));
        let base = serve(app).await;
        let provider = MistralOcrProvider::new(&config(base), reqwest::Client::new());

        let err = provider
            .process(OcrInput::ImageUrl("https://cdn.example/photo.jpg".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Shape(_)));
    }
}
