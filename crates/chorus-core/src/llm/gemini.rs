//! Google Gemini provider using the Files and generateContent APIs.
//!
//! Each attempt uploads the image through the resumable Files API, asks for
//! a caption referencing the uploaded file by URI, and deletes the file
//! afterwards. Uploaded files expire on their own after 48 hours, so a failed
//! delete only leaks storage quota for a while.

use super::provider::{ImageInput, LlmProvider, LlmRequest, LlmResponse, RemoteFile, StagedImage};
use crate::error::{RunError, RunResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Gemini provider with upload/delete around every request.
pub struct GeminiProvider {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.trim_start_matches("models/").to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }

    async fn http_error(context: &str, resp: reqwest::Response) -> RunError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        RunError::Invocation {
            message: format!("Gemini {context} HTTP {status}: {text}"),
            status_code: Some(status.as_u16()),
        }
    }
}

// --- Files API types ---

#[derive(Serialize)]
struct UploadStart {
    file: UploadMetadata,
}

#[derive(Serialize)]
struct UploadMetadata {
    display_name: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    name: String,
    uri: String,
    mime_type: Option<String>,
}

// --- generateContent request types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    response_mime_type: String,
}

// --- generateContent response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u32>,
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn stage(&self, image: &ImageInput) -> RunResult<StagedImage> {
        let bytes = image.bytes()?;

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.endpoint))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", &image.media_type)
            .json(&UploadStart {
                file: UploadMetadata {
                    display_name: "chorus-upload".to_string(),
                },
            })
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| RunError::invocation(format!("Gemini upload request failed: {e}")))?;

        if !start.status().is_success() {
            return Err(Self::http_error("upload start", start).await);
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| RunError::invocation("Gemini upload start returned no upload URL"))?;

        let finish = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| RunError::invocation(format!("Gemini upload failed: {e}")))?;

        if !finish.status().is_success() {
            return Err(Self::http_error("upload", finish).await);
        }

        let uploaded: UploadResponse = finish.json().await.map_err(|e| {
            RunError::invocation(format!("Failed to parse Gemini upload response: {e}"))
        })?;

        tracing::debug!("Uploaded image as {}", uploaded.file.name);

        Ok(StagedImage::Remote(RemoteFile {
            name: uploaded.file.name,
            uri: uploaded.file.uri,
            media_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| image.media_type.clone()),
        }))
    }

    async fn generate(&self, request: &LlmRequest) -> RunResult<LlmResponse> {
        let start = Instant::now();

        let image_part = match &request.image {
            StagedImage::Remote(file) => Part::File {
                file_data: FileData {
                    mime_type: file.media_type.clone(),
                    file_uri: file.uri.clone(),
                },
            },
            StagedImage::Inline(image) => Part::Inline {
                inline_data: InlineData {
                    mime_type: image.media_type.clone(),
                    data: image.data.clone(),
                },
            },
        };

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part::Text {
                        text: request.prompt.clone(),
                    },
                    image_part,
                ],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                response_mime_type: "application/json".to_string(),
            },
        };

        let resp = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| RunError::invocation(format!("Gemini request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Self::http_error("generate", resp).await);
        }

        let generated: GenerateResponse = resp.json().await.map_err(|e| {
            RunError::invocation(format!("Failed to parse Gemini response: {e}"))
        })?;

        let text = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(RunError::invocation(
                "Gemini returned no candidates (blocked or empty response)",
            ));
        }

        Ok(LlmResponse {
            text,
            model: generated.model_version.unwrap_or_else(|| self.model.clone()),
            tokens_used: generated.usage_metadata.and_then(|u| u.total_token_count),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn release(&self, staged: &StagedImage) -> RunResult<()> {
        let StagedImage::Remote(file) = staged else {
            return Ok(());
        };

        let resp = self
            .client
            .delete(format!("{}/v1beta/{}", self.endpoint, file.name))
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| RunError::Release {
                resource: file.name.clone(),
                message: e.to_string(),
            })?;

        if resp.status().is_success() {
            tracing::debug!("Deleted uploaded file {}", file.name);
            Ok(())
        } else {
            Err(RunError::Release {
                resource: file.name.clone(),
                message: format!("HTTP {}", resp.status()),
            })
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
}
