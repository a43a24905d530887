//! Gemini File API and generateContent client.
//!
//! A video is analyzed in three steps: a resumable upload to the File API,
//! polling the file until it leaves `PROCESSING`, then one generateContent
//! call that references the uploaded file.

use std::path::Path;

use reqwest::{Body, Client, Response};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::config::GeminiConfig;
use crate::error::{AiError, AiResult};
use crate::prompt::HIGHLIGHT_PROMPT;

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    #[serde(other)]
    StateUnspecified,
}

/// File resource returned by the File API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default = "unspecified")]
    pub state: FileState,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

fn unspecified() -> FileState {
    FileState::StateUnspecified
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Serialize)]
struct StartUploadRequest<'a> {
    file: StartUploadFile<'a>,
}

#[derive(Debug, Serialize)]
struct StartUploadFile<'a> {
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    FileData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(rename = "fileUri")]
        file_uri: String,
    },
    Text(String),
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Header carrying the API key, so it never appears in a URL.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini API client.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Create a new Gemini client.
    pub fn new(config: GeminiConfig) -> AiResult<Self> {
        if config.api_key.is_empty() {
            return Err(AiError::config("GEMINI_API_KEY not set"));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> AiResult<Self> {
        Self::new(GeminiConfig::from_env())
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Upload, wait for activation, ask for highlights; returns the raw reply text.
    ///
    /// The remote file is deleted afterwards on a best-effort basis.
    pub async fn analyze_video(&self, path: &Path) -> AiResult<String> {
        let uploaded = self.upload_file(path).await?;
        info!(file = %uploaded.name, "Uploaded video for analysis");

        let result = async {
            let active = self.wait_until_active(&uploaded.name).await?;
            self.generate_content(&active, HIGHLIGHT_PROMPT).await
        }
        .await;

        if let Err(e) = self.delete_file(&uploaded.name).await {
            debug!(file = %uploaded.name, "Failed to delete remote file: {}", e);
        }

        result
    }

    /// Upload a local file with the resumable upload protocol.
    pub async fn upload_file(&self, path: &Path) -> AiResult<RemoteFile> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let mime_type = guess_mime_type(path);
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());

        let start_url = format!("{}/upload/v1beta/files", self.config.base_url);
        let response = self
            .http
            .post(&start_url)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&StartUploadRequest {
                file: StartUploadFile {
                    display_name: &display_name,
                },
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        let upload_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AiError::upload("missing x-goog-upload-url header"))?;

        debug!(bytes = size, mime = mime_type, "Sending video bytes");

        let response = self
            .http
            .post(&upload_url)
            .header("Content-Length", size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        let response = check_status(response).await?;

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| AiError::upload(format!("unreadable upload response: {}", e.without_url())))?;
        Ok(uploaded.file)
    }

    /// Fetch the current state of an uploaded file.
    pub async fn get_file(&self, name: &str) -> AiResult<RemoteFile> {
        let url = format!("{}/v1beta/{}", self.config.base_url, name);
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Poll until the file leaves `PROCESSING`.
    pub async fn wait_until_active(&self, name: &str) -> AiResult<RemoteFile> {
        for poll in 0..self.config.max_polls {
            let file = self.get_file(name).await?;
            match file.state {
                FileState::Active => return Ok(file),
                FileState::Failed => {
                    let detail = file
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no details".to_string());
                    return Err(AiError::FileFailed(format!("{}: {}", name, detail)));
                }
                FileState::Processing => {
                    debug!(file = name, poll, "Remote file still processing");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                FileState::StateUnspecified => {
                    // Treated as usable once it has a URI
                    if !file.uri.is_empty() {
                        return Ok(file);
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        Err(AiError::NotReady(self.config.max_polls))
    }

    /// Ask the model about an active file; returns the concatenated reply text.
    pub async fn generate_content(&self, file: &RemoteFile, prompt: &str) -> AiResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let mime_type = if file.mime_type.is_empty() {
            "video/mp4".to_string()
        } else {
            file.mime_type.clone()
        };

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::FileData {
                        mime_type,
                        file_uri: file.uri.clone(),
                    },
                    Part::Text(prompt.to_string()),
                ],
            }],
        };

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AiError::invalid_response(format!("unreadable generateContent body: {}", e.without_url())))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AiError::invalid_response("no text in Gemini response"));
        }
        Ok(text)
    }

    /// Delete an uploaded file.
    pub async fn delete_file(&self, name: &str) -> AiResult<()> {
        let url = format!("{}/v1beta/{}", self.config.base_url, name);
        let response = self
            .http
            .delete(&url)
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> AiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Gemini API error");
    Err(AiError::Api {
        status: status.as_u16(),
        body,
    })
}

/// MIME type for a video path, by extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        "3gp" => "video/3gpp",
        "flv" => "video/x-flv",
        "wmv" => "video/x-ms-wmv",
        _ => "video/mp4",
    }
}
