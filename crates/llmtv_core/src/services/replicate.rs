//! Music and transcription through the Replicate predictions API.
//!
//! A prediction is created, then polled until it reaches a terminal
//! status. Files needed as model input are uploaded first and passed by
//! URL.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

use crate::config::ServiceSettings;
use crate::models::{AudioTrack, LyricsDocument, RawTranscription};

use super::error::{ServiceError, ServiceResult};
use super::http::{download_to, env_credential, send_json};
use super::probe::probe_duration;
use super::{MusicService, TranscriptionService};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Authenticated access to the predictions API.
#[derive(Clone)]
pub struct ReplicateClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    poll_interval: Duration,
}

impl ReplicateClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::failed("replicate", e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn from_settings(settings: &ServiceSettings) -> ServiceResult<Self> {
        let token = env_credential("replicate", &settings.replicate_api_token_env)?;
        Self::new(&settings.replicate_base_url, token)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the latest version of an `owner/name` model and return its output.
    pub async fn run_model(&self, service: &str, model: &str, input: Value) -> ServiceResult<Value> {
        let url = format!("{}/models/{}/predictions", self.base_url, model);
        tracing::debug!("POST {}", url);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "input": input }));

        let prediction = send_json(service, request).await?;
        self.wait(service, prediction).await
    }

    /// Run a pinned model version and return its output.
    pub async fn run_version(
        &self,
        service: &str,
        version: &str,
        input: Value,
    ) -> ServiceResult<Value> {
        let url = format!("{}/predictions", self.base_url);
        tracing::debug!("POST {} (version {})", url, version);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "version": version, "input": input }));

        let prediction = send_json(service, request).await?;
        self.wait(service, prediction).await
    }

    /// Upload a local file and return the URL models can read it from.
    pub async fn upload_file(&self, service: &str, path: &Path) -> ServiceResult<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ServiceError::failed(service, format!("read {}: {}", path.display(), e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| ServiceError::failed(service, e.to_string()))?;

        let url = format!("{}/files", self.base_url);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .multipart(Form::new().part("content", part));

        let body = send_json(service, request).await?;
        body.pointer("/urls/get")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::malformed(service, "upload response has no file URL"))
    }

    /// Poll a prediction until it succeeds, fails or is cancelled.
    async fn wait(&self, service: &str, mut prediction: Value) -> ServiceResult<Value> {
        let poll_url = match prediction.pointer("/urls/get").and_then(|v| v.as_str()) {
            Some(url) => url.to_string(),
            None => {
                let id = prediction
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ServiceError::malformed(service, "prediction has no id"))?;
                format!("{}/predictions/{}", self.base_url, id)
            }
        };

        loop {
            match prediction_status(service, &prediction)? {
                PredictionStatus::Succeeded(output) => return Ok(output),
                PredictionStatus::Pending => {}
            }

            tokio::time::sleep(self.poll_interval).await;
            let request = self.client.get(&poll_url).bearer_auth(&self.token);
            prediction = send_json(service, request).await?;
        }
    }
}

enum PredictionStatus {
    Pending,
    Succeeded(Value),
}

fn prediction_status(service: &str, prediction: &Value) -> ServiceResult<PredictionStatus> {
    let status = prediction
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match status {
        "starting" | "processing" => Ok(PredictionStatus::Pending),
        "succeeded" => match prediction.get("output") {
            Some(output) if !output.is_null() => Ok(PredictionStatus::Succeeded(output.clone())),
            _ => Err(ServiceError::malformed(service, "prediction succeeded without output")),
        },
        "failed" => {
            let message = prediction
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("prediction failed")
                .to_string();
            let lower = message.to_lowercase();
            if lower.contains("sensitive") || lower.contains("flagged") || lower.contains("nsfw") {
                Err(ServiceError::content_policy(service, message))
            } else {
                Err(ServiceError::unavailable(service, message))
            }
        }
        "canceled" => Err(ServiceError::failed(service, "prediction was canceled")),
        other => Err(ServiceError::malformed(
            service,
            format!("unknown prediction status '{}'", other),
        )),
    }
}

/// First URL in a prediction output (a string or a list of strings).
fn output_url(output: &Value) -> Option<&str> {
    match output {
        Value::String(url) => Some(url.as_str()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str()),
        _ => None,
    }
}

/// Song generation with a text-to-music model.
pub struct ReplicateMusicService {
    client: ReplicateClient,
    model: String,
    ffprobe: String,
}

impl ReplicateMusicService {
    pub fn new(client: ReplicateClient, model: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait]
impl MusicService for ReplicateMusicService {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        lyrics: &LyricsDocument,
        style: &str,
        dest: &Path,
    ) -> ServiceResult<AudioTrack> {
        let input = json!({
            "lyrics": lyrics.to_tagged_text(),
            "prompt": style,
            "bitrate": 256000,
            "sample_rate": 44100,
            "audio_format": "mp3",
        });

        let output = self.client.run_model("music", &self.model, input).await?;
        let url = output_url(&output)
            .ok_or_else(|| ServiceError::malformed("music", "output has no audio URL"))?;

        download_to("music", self.client.client.get(url), dest).await?;
        let duration = probe_duration(&self.ffprobe, dest).await?;

        Ok(AudioTrack::new(dest, duration))
    }
}

/// Timestamped transcription with a Whisper model.
pub struct ReplicateTranscriptionService {
    client: ReplicateClient,
    version: String,
}

impl ReplicateTranscriptionService {
    pub fn new(client: ReplicateClient, version: impl Into<String>) -> Self {
        Self {
            client,
            version: version.into(),
        }
    }
}

#[async_trait]
impl TranscriptionService for ReplicateTranscriptionService {
    fn name(&self) -> &str {
        &self.version
    }

    async fn transcribe(&self, audio: &AudioTrack) -> ServiceResult<RawTranscription> {
        let audio_url = self.client.upload_file("transcription", &audio.path).await?;
        let input = json!({ "audio": audio_url, "batch_size": 64 });

        let output = self
            .client
            .run_version("transcription", &self.version, input)
            .await?;

        serde_json::from_value(output)
            .map_err(|e| ServiceError::malformed("transcription", e.to_string()))
    }
}
