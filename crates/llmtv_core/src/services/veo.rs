//! Clip generation through the Gemini long-running video operation.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::{ClipSettings, ServiceSettings};
use crate::models::{ClipDescriptor, VideoClip};

use super::error::{ServiceError, ServiceResult};
use super::http::{download_to, env_credential, send_json};
use super::probe::probe_duration;
use super::VideoClipService;

const SERVICE: &str = "veo";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct VeoClipService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    poll_interval: Duration,
    ffprobe: String,
}

impl VeoClipService {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        poll_interval: Duration,
        ffprobe: impl Into<String>,
    ) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::failed(SERVICE, e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            poll_interval,
            ffprobe: ffprobe.into(),
        })
    }

    pub fn from_settings(
        services: &ServiceSettings,
        clips: &ClipSettings,
        ffprobe: &str,
    ) -> ServiceResult<Self> {
        let api_key = env_credential(SERVICE, &services.gemini_api_key_env)?;
        Self::new(
            &services.gemini_base_url,
            api_key,
            &services.video_model,
            Duration::from_secs(clips.poll_interval_secs.max(1)),
            ffprobe,
        )
    }

    async fn start(&self, prompt: &str) -> ServiceResult<String> {
        let url = format!("{}/models/{}:predictLongRunning", self.base_url, self.model);
        let request = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({ "instances": [{ "prompt": prompt }] }));

        let body = send_json(SERVICE, request).await?;
        body.get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::malformed(SERVICE, "operation has no name"))
    }

    /// Poll the operation until done, returning the video URI.
    async fn wait(
        &self,
        operation: &str,
        segment_index: usize,
        cancel: &CancellationToken,
    ) -> ServiceResult<String> {
        let url = format!("{}/{}", self.base_url, operation);
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            let request = self.client.get(&url).header(API_KEY_HEADER, &self.api_key);
            let body = send_json(SERVICE, request).await?;

            if let Some(uri) = operation_result(&body)? {
                return Ok(uri);
            }

            polls += 1;
            if polls % 6 == 0 {
                tracing::info!(
                    "Segment {}: still generating ({:.0}s elapsed)",
                    segment_index,
                    started.elapsed().as_secs_f64()
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ServiceError::failed(SERVICE, "generation abandoned on cancellation"));
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// Video URI of a finished operation, `None` while it is still running.
fn operation_result(body: &Value) -> ServiceResult<Option<String>> {
    if !body.get("done").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Ok(None);
    }

    if let Some(error) = body.get("error") {
        let code = error
            .get("code")
            .and_then(|v| v.as_u64())
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(500);
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("operation failed")
            .to_string();
        return Err(ServiceError::from_status(SERVICE, code, message));
    }

    let response = body
        .pointer("/response/generateVideoResponse")
        .ok_or_else(|| ServiceError::malformed(SERVICE, "operation finished without a response"))?;

    if let Some(reasons) = response.get("raiMediaFilteredReasons").and_then(|v| v.as_array()) {
        if !reasons.is_empty() {
            let joined: Vec<&str> = reasons.iter().filter_map(|r| r.as_str()).collect();
            return Err(ServiceError::content_policy(SERVICE, joined.join("; ")));
        }
    }

    response
        .pointer("/generatedSamples/0/video/uri")
        .and_then(|v| v.as_str())
        .map(|uri| Some(uri.to_string()))
        .ok_or_else(|| ServiceError::malformed(SERVICE, "operation produced no video"))
}

#[async_trait]
impl VideoClipService for VeoClipService {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        descriptor: &ClipDescriptor,
        dest: &Path,
        cancel: CancellationToken,
    ) -> ServiceResult<VideoClip> {
        let index = descriptor.segment_index;
        let operation = self.start(&descriptor.prompt_text()).await?;
        tracing::debug!("Segment {}: started operation {}", index, operation);

        let uri = self.wait(&operation, index, &cancel).await?;

        let request = self.client.get(&uri).header(API_KEY_HEADER, &self.api_key);
        download_to(SERVICE, request, dest).await?;

        let native_duration_secs = probe_duration(&self.ffprobe, dest).await?;

        Ok(VideoClip {
            segment_index: index,
            path: dest.to_path_buf(),
            native_duration_secs,
        })
    }
}
