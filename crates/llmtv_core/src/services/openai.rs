//! Lyrics through an OpenAI-compatible chat completions endpoint.
//!
//! The `provider/` prefix of the configured model picks the endpoint and
//! credential: OpenAI itself, Anthropic's compatibility API, or Gemini's
//! `/openai` surface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::config::ServiceSettings;
use crate::models::{LyricsDocument, Prompt};

use super::error::{ServiceError, ServiceResult};
use super::http::{env_credential, send_json};
use super::LyricsService;

const SERVICE: &str = "lyrics";

const SYSTEM_PROMPT: &str = "You are a creative lyricist. Generate engaging song lyrics based on the user's prompt.

CRITICAL: Keep lyrics under 550 characters total (will be truncated at 599).

Format your output with structure tags like:
[Intro]
lyrics here

[Verse]
lyrics here

[Chorus]
lyrics here

Keep verses concise and catchy. Make the song between 30-60 seconds when performed.
Only output the lyrics with tags, no additional commentary.";

/// Hosted chat provider named by a model's `provider/` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatProvider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ChatProvider {
    /// Provider for `model_id`; an unprefixed model is an OpenAI model.
    pub fn from_model_id(model_id: &str) -> Option<Self> {
        match model_id.split_once('/') {
            None => Some(Self::OpenAi),
            Some(("openai", _)) => Some(Self::OpenAi),
            Some(("anthropic", _)) => Some(Self::Anthropic),
            Some(("gemini", _)) => Some(Self::Gemini),
            Some(_) => None,
        }
    }

    /// Base URL and credential variable for this provider.
    pub fn endpoint(self, settings: &ServiceSettings) -> (String, &str) {
        match self {
            Self::OpenAi => (settings.llm_base_url.clone(), &settings.llm_api_key_env),
            Self::Anthropic => (
                settings.anthropic_base_url.clone(),
                &settings.anthropic_api_key_env,
            ),
            Self::Gemini => (
                format!("{}/openai", settings.gemini_base_url.trim_end_matches('/')),
                &settings.gemini_api_key_env,
            ),
        }
    }
}

pub struct OpenAiLyricsService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Configured identifier, e.g. `openai/gpt-4o`.
    model_id: String,
    temperature: f64,
    max_chars: usize,
}

impl OpenAiLyricsService {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model_id: impl Into<String>,
        temperature: f64,
        max_chars: usize,
        timeout: Duration,
    ) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::failed(SERVICE, e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_id: model_id.into(),
            temperature,
            max_chars,
        })
    }

    /// Build from settings, reading the API key of the model's provider.
    pub fn from_settings(settings: &ServiceSettings) -> ServiceResult<Self> {
        let provider = ChatProvider::from_model_id(&settings.lyrics_model).ok_or_else(|| {
            ServiceError::failed(
                SERVICE,
                format!(
                    "unsupported lyrics model '{}': use openai/, anthropic/ or gemini/",
                    settings.lyrics_model
                ),
            )
        })?;
        let (base_url, key_env) = provider.endpoint(settings);
        let api_key = env_credential(SERVICE, key_env)?;
        Self::new(
            api_key,
            base_url,
            &settings.lyrics_model,
            settings.lyrics_temperature,
            settings.max_lyrics_chars,
            Duration::from_secs(settings.call_timeout_secs),
        )
    }

    /// Model name as the endpoint expects it (provider prefix removed).
    fn api_model(&self) -> &str {
        self.model_id
            .split_once('/')
            .map(|(_, model)| model)
            .unwrap_or(&self.model_id)
    }

    fn build_headers(&self) -> ServiceResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| ServiceError::authentication(SERVICE, e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_payload(&self, prompt: &Prompt) -> Value {
        json!({
            "model": self.api_model(),
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": format!("Write song lyrics about: {}", prompt.concept()) },
            ],
            "temperature": self.temperature,
        })
    }

    fn parse_response(&self, body: &Value) -> ServiceResult<LyricsDocument> {
        let content = body
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();

        let truncated: String = content.chars().take(self.max_chars).collect();

        LyricsDocument::parse_tagged(&truncated)
            .ok_or_else(|| ServiceError::malformed(SERVICE, "response contained no lyric lines"))
    }
}

#[async_trait]
impl LyricsService for OpenAiLyricsService {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, prompt: &Prompt) -> ServiceResult<LyricsDocument> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("POST {} (model {})", url, self.api_model());

        let request = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&self.build_payload(prompt));

        let body = send_json(SERVICE, request).await?;
        self.parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(max_chars: usize) -> OpenAiLyricsService {
        OpenAiLyricsService::new(
            "key",
            "https://example.invalid/v1/",
            "openai/gpt-4o",
            0.8,
            max_chars,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn strips_provider_prefix_and_slash() {
        let svc = service(599);
        assert_eq!(svc.api_model(), "gpt-4o");
        assert_eq!(svc.name(), "openai/gpt-4o");
        assert_eq!(svc.base_url, "https://example.invalid/v1");
    }

    #[test]
    fn provider_prefix_picks_endpoint_and_credential() {
        let settings = ServiceSettings::default();
        let endpoint = |model: &str| {
            ChatProvider::from_model_id(model).map(|p| {
                let (url, key) = p.endpoint(&settings);
                (url, key.to_string())
            })
        };

        assert_eq!(
            endpoint("openai/gpt-4o"),
            Some(("https://api.openai.com/v1".to_string(), "OPENAI_API_KEY".to_string()))
        );
        assert_eq!(
            endpoint("anthropic/claude-3-5-sonnet-20241022"),
            Some(("https://api.anthropic.com/v1".to_string(), "ANTHROPIC_API_KEY".to_string()))
        );
        assert_eq!(
            endpoint("gemini/gemini-2.0-flash-exp"),
            Some((
                "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
                "GEMINI_API_KEY".to_string()
            ))
        );
        assert_eq!(endpoint("gpt-4o").map(|(_, key)| key), Some("OPENAI_API_KEY".to_string()));
        assert_eq!(endpoint("mistral/large"), None);
    }

    #[test]
    fn anthropic_model_is_sent_without_prefix() {
        let svc = OpenAiLyricsService::new(
            "key",
            "https://api.anthropic.com/v1",
            "anthropic/claude-3-5-haiku-20241022",
            0.8,
            599,
            Duration::from_secs(5),
        )
        .unwrap();
        let payload = svc.build_payload(&Prompt::new("cats", None).unwrap());
        assert_eq!(payload["model"], "claude-3-5-haiku-20241022");
    }

    #[test]
    fn unknown_provider_is_rejected_before_any_request() {
        let settings = ServiceSettings {
            lyrics_model: "mistral/large".to_string(),
            ..ServiceSettings::default()
        };
        let err = OpenAiLyricsService::from_settings(&settings).err().unwrap();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("mistral/large"));
    }

    #[test]
    fn payload_carries_concept_and_temperature() {
        let svc = service(599);
        let prompt = Prompt::new("cats in space", None).unwrap();
        let payload = svc.build_payload(&prompt);
        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["temperature"], 0.8);
        assert_eq!(
            payload["messages"][1]["content"],
            "Write song lyrics about: cats in space"
        );
    }

    #[test]
    fn parses_and_truncates_content() {
        let svc = service(30);
        let body = json!({
            "choices": [{ "message": { "content": "[Verse]\nfirst line here\nsecond line that is cut" } }]
        });
        let doc = svc.parse_response(&body).unwrap();
        let text: Vec<&str> = doc.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(text[0], "first line here");
        assert!(text.len() == 2 && text[1].len() < "second line that is cut".len());
    }

    #[test]
    fn empty_content_is_malformed() {
        let svc = service(599);
        let body = json!({ "choices": [{ "message": { "content": "   " } }] });
        let err = svc.parse_response(&body).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse { .. }));
    }
}
