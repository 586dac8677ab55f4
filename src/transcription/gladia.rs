//! Gladia pre-recorded transcription API client.
//!
//! Upload streams the file body, so memory stays bounded for long
//! recordings. Retrieval polls the result endpoint at a fixed interval with
//! a bounded overall timeout.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

use super::{TranscriptionClient, TranscriptionListItem};
use crate::config::GladiaConfig;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    audio_url: String,
}

#[derive(Debug, Serialize)]
struct TranscriptRequest {
    audio_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    status: TranscriptStatus,
    #[serde(default)]
    result: Option<TranscriptResult>,
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum TranscriptStatus {
    Queued,
    Processing,
    Done,
    Error,
}

#[derive(Debug, Deserialize)]
struct TranscriptResult {
    transcription: TranscriptionBody,
}

#[derive(Debug, Deserialize)]
struct TranscriptionBody {
    full_transcript: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    id: String,
    #[serde(default)]
    custom_metadata: Option<serde_json::Value>,
    #[serde(default)]
    created_at: Option<String>,
}

pub struct GladiaClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl GladiaClient {
    pub fn new(config: &GladiaConfig) -> Self {
        info!("Initialized Gladia client with base URL: {}", config.base_url);
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(config.poll_interval_seconds.max(1)),
            poll_timeout: Duration::from_secs(config.poll_timeout_seconds),
        }
    }

    /// Stream the file to the upload endpoint, returning the audio URL the
    /// transcript request needs.
    async fn upload_audio(&self, path: &Path, mime_type: &str) -> Result<String> {
        let url = format!("{}/upload", self.base_url);
        debug!("Uploading audio file to Gladia: {:?}", path);

        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {path:?}"))?;
        let length = file
            .metadata()
            .await
            .context("Failed to read file metadata")?
            .len();

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length)
            .file_name(file_name)
            .mime_str(mime_type)
            .context("Invalid MIME type for upload")?;
        let form = Form::new().part("audio", part);

        let response = self
            .client
            .post(&url)
            .header("x-gladia-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to upload audio to Gladia")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read upload response body")?;

        if !status.is_success() {
            error!("Gladia upload failed with status {}: {}", status, body);
            bail!("Gladia upload failed with status {}: {}", status, body);
        }

        let upload: UploadResponse =
            serde_json::from_str(&body).context("Failed to parse upload response")?;
        debug!("Audio uploaded: {}", upload.audio_url);
        Ok(upload.audio_url)
    }

    async fn create_transcript(&self, audio_url: String) -> Result<String> {
        let url = format!("{}/pre-recorded", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-gladia-key", &self.api_key)
            .json(&TranscriptRequest { audio_url })
            .send()
            .await
            .context("Failed to submit transcription request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read transcription response body")?;

        if !status.is_success() {
            error!(
                "Gladia transcription request failed with status {}: {}",
                status, body
            );
            bail!(
                "Gladia transcription request failed with status {}: {}",
                status,
                body
            );
        }

        let created: TranscriptCreated =
            serde_json::from_str(&body).context("Failed to parse transcription response")?;
        debug!("Transcription created with id: {}", created.id);
        Ok(created.id)
    }
}

#[async_trait]
impl TranscriptionClient for GladiaClient {
    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn upload(&self, path: &Path, mime_type: &str) -> Result<String> {
        let audio_url = self.upload_audio(path, mime_type).await?;
        self.create_transcript(audio_url).await
    }

    async fn retrieve(&self, remote_id: &str) -> Result<String> {
        let url = format!("{}/pre-recorded/{}", self.base_url, remote_id);
        let max_attempts =
            (self.poll_timeout.as_secs() / self.poll_interval.as_secs().max(1)).max(1);

        for attempt in 1..=max_attempts {
            debug!(
                "Polling transcript {} (attempt {}/{})",
                remote_id, attempt, max_attempts
            );

            let response = self
                .client
                .get(&url)
                .header("x-gladia-key", &self.api_key)
                .send()
                .await
                .context("Failed to poll transcript status")?;

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read poll response body")?;

            if !status.is_success() {
                error!("Gladia poll failed with status {}: {}", status, body);
                bail!("Gladia poll failed with status {}: {}", status, body);
            }

            let transcript: TranscriptResponse =
                serde_json::from_str(&body).context("Failed to parse poll response")?;

            match transcript.status {
                TranscriptStatus::Done => {
                    let text = transcript
                        .result
                        .map(|r| r.transcription.full_transcript.trim().to_string())
                        .unwrap_or_default();
                    info!("Transcript {} ready: {} chars", remote_id, text.len());
                    return Ok(text);
                }
                TranscriptStatus::Error => {
                    let code = transcript
                        .error_code
                        .unwrap_or_else(|| "unknown error".to_string());
                    bail!("Transcription failed: {}", code);
                }
                TranscriptStatus::Queued | TranscriptStatus::Processing => {
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        bail!(
            "Transcript {} not ready after {} seconds",
            remote_id,
            self.poll_timeout.as_secs()
        );
    }

    async fn list_all(
        &self,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<TranscriptionListItem>> {
        let url = format!(
            "{}/pre-recorded?limit={}&offset={}",
            self.base_url, page_size, offset
        );

        let response = self
            .client
            .get(&url)
            .header("x-gladia-key", &self.api_key)
            .send()
            .await
            .context("Failed to list transcriptions")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read list response body")?;

        if !status.is_success() {
            bail!("Gladia list failed with status {}: {}", status, body);
        }

        let page: ListResponse =
            serde_json::from_str(&body).context("Failed to parse list response")?;

        Ok(page
            .items
            .into_iter()
            .map(|item| TranscriptionListItem {
                remote_id: item.id,
                file_name: item
                    .custom_metadata
                    .as_ref()
                    .and_then(|m| m.get("file_name"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                created_at: item.created_at,
            })
            .collect())
    }

    async fn delete(&self, remote_id: &str) -> Result<bool> {
        let url = format!("{}/pre-recorded/{}", self.base_url, remote_id);

        let response = self
            .client
            .delete(&url)
            .header("x-gladia-key", &self.api_key)
            .send()
            .await
            .context("Failed to delete transcription")?;

        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => {
                debug!("Transcription {} already gone", remote_id);
                Ok(false)
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                error!("Gladia delete {} failed with status {}: {}", remote_id, s, body);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: &str) -> GladiaConfig {
        GladiaConfig {
            api_key: api_key.to_string(),
            base_url: "https://api.gladia.io/v2/".to_string(),
            poll_interval_seconds: 3,
            poll_timeout_seconds: 600,
        }
    }

    #[test]
    fn test_is_configured_requires_api_key() {
        assert!(GladiaClient::new(&config("key")).is_configured());
        assert!(!GladiaClient::new(&config("")).is_configured());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = GladiaClient::new(&config("key"));
        assert_eq!(client.base_url, "https://api.gladia.io/v2");
    }

    #[test]
    fn test_poll_interval_floor_of_one_second() {
        let mut cfg = config("key");
        cfg.poll_interval_seconds = 0;
        let client = GladiaClient::new(&cfg);
        assert_eq!(client.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_transcript_response_parsing() {
        let body = r#"{
            "status": "done",
            "result": { "transcription": { "full_transcript": "  hello there  " } }
        }"#;
        let parsed: TranscriptResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, TranscriptStatus::Done);
        assert_eq!(
            parsed.result.unwrap().transcription.full_transcript.trim(),
            "hello there"
        );

        let queued: TranscriptResponse =
            serde_json::from_str(r#"{ "status": "queued" }"#).unwrap();
        assert_eq!(queued.status, TranscriptStatus::Queued);
    }
}
