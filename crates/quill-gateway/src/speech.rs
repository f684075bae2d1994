use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use quill_core::errors::UpstreamError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Output shape requested from the speech collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
    Srt,
    VerboseJson,
    Vtt,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Srt => "srt",
            Self::VerboseJson => "verbose_json",
            Self::Vtt => "vtt",
        }
    }

    /// Parse a client-supplied format name, falling back to text for
    /// anything unrecognized (the original handler behaves the same way).
    pub fn parse_or_text(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            "srt" => Self::Srt,
            "verbose_json" => Self::VerboseJson,
            "vtt" => Self::Vtt,
            _ => Self::Text,
        }
    }
}

/// Options forwarded with the audio. Each has a documented default.
#[derive(Clone, Debug)]
pub struct TranscribeOptions {
    pub model: String,
    pub language: String,
    pub prompt: String,
    pub response_format: ResponseFormat,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini-transcribe".into(),
            language: "en".into(),
            prompt: String::new(),
            response_format: ResponseFormat::Text,
        }
    }
}

/// External speech-to-text collaborator: audio bytes in, transcript out.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio: Bytes,
        filename: &str,
        options: &TranscribeOptions,
    ) -> Result<String, UpstreamError>;
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub base_url: String,
}

impl OpenAiConfig {
    /// Read OPENAI_API_KEY from the environment.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        if api_key.is_empty() {
            return None;
        }
        Some(Self {
            api_key: SecretString::from(api_key),
            base_url: "https://api.openai.com".into(),
        })
    }
}

/// OpenAI audio transcription client (multipart upload).
pub struct OpenAiSpeech {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiSpeech {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            config,
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionPayload {
    text: String,
}

fn mime_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl SpeechToText for OpenAiSpeech {
    #[instrument(skip(self, audio, options), fields(filename, bytes = audio.len(), model = %options.model))]
    async fn transcribe(
        &self,
        audio: Bytes,
        filename: &str,
        options: &TranscribeOptions,
    ) -> Result<String, UpstreamError> {
        let url = format!("{}/v1/audio/transcriptions", self.config.base_url);

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))
            .map_err(|e| UpstreamError::InvalidRequest(format!("bad mime type: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", options.model.clone())
            .text("language", options.language.clone())
            .text("prompt", options.prompt.clone())
            .text("response_format", options.response_format.as_str());

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status.as_u16(), body));
        }

        match options.response_format {
            ResponseFormat::Json | ResponseFormat::VerboseJson => {
                let payload: TranscriptionPayload = resp.json().await.map_err(|e| {
                    UpstreamError::InvalidRequest(format!("bad transcription payload: {e}"))
                })?;
                Ok(payload.text)
            }
            // text / srt / vtt come back as a plain body
            _ => resp
                .text()
                .await
                .map_err(|e| UpstreamError::NetworkError(e.to_string())),
        }
    }
}
