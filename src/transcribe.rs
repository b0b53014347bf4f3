//! Speech-to-text for auto-captions.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tempfile::tempdir;
use tracing::{debug, info, warn};

use crate::caption::Caption;
use crate::config::Config;
use crate::error::{ComposeError, Result};
use crate::ffmpeg::Ffmpeg;

const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Produces timed captions from the audio of a media file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media: &Path) -> Result<Vec<Caption>>;
}

#[derive(Debug, Deserialize)]
struct WhisperVerboseJson {
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

/// Turn a `verbose_json` transcription response into captions, dropping empty
/// or zero-length segments.
pub fn parse_transcription(json: &str) -> Result<Vec<Caption>> {
    let response: WhisperVerboseJson =
        serde_json::from_str(json).map_err(|e| ComposeError::Transcription(format!("unparseable response: {e}")))?;
    let segments = response
        .segments
        .ok_or_else(|| ComposeError::Transcription("response has no segments (verbose_json required)".to_string()))?;

    let captions: Vec<Caption> = segments
        .into_iter()
        .filter_map(|seg| {
            let text = seg.text.trim();
            if text.is_empty() {
                return None;
            }
            match Caption::new(seg.start.max(0.0), seg.end, text) {
                Ok(caption) => Some(caption),
                Err(e) => {
                    warn!("skipping transcription segment: {e}");
                    None
                }
            }
        })
        .collect();
    Ok(captions)
}

/// OpenAI Whisper API client. Audio is extracted locally as 16 kHz mono WAV and
/// uploaded as multipart form data.
#[derive(Debug, Clone)]
pub struct WhisperApiTranscriber {
    ffmpeg: Ffmpeg,
    client: reqwest::Client,
    api_key: String,
    model: String,
    language: Option<String>,
}

impl WhisperApiTranscriber {
    pub fn new(ffmpeg: Ffmpeg, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            ffmpeg,
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            language: None,
        }
    }

    /// Requires `OPENAI_API_KEY` to be configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| ComposeError::Transcription("set OPENAI_API_KEY to enable transcription".to_string()))?;
        Ok(Self::new(Ffmpeg::new(config), api_key, config.whisper_model.clone()))
    }

    /// ISO-639-1 hint for the spoken language. Auto-detected when unset.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    async fn request(&self, wav: Vec<u8>) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| ComposeError::Transcription(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let resp = self
            .client
            .post(TRANSCRIPTIONS_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ComposeError::Transcription(format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ComposeError::Transcription(format!("API error {status}: {body}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    async fn transcribe(&self, media: &Path) -> Result<Vec<Caption>> {
        let tmp = tempdir()?;
        let wav_path = tmp.path().join("audio_16k_mono.wav");

        let ffmpeg = self.ffmpeg.clone();
        let input = media.to_path_buf();
        let wav_out = wav_path.clone();
        tokio::task::spawn_blocking(move || ffmpeg.extract_audio(&input, &wav_out))
            .await
            .map_err(|e| ComposeError::Transcription(format!("audio extraction task failed: {e}")))??;

        let wav = tokio::fs::read(&wav_path).await?;
        debug!("uploading {} bytes of audio to {}", wav.len(), TRANSCRIPTIONS_URL);
        let body = self.request(wav).await?;
        let captions = parse_transcription(&body)?;
        info!("transcribed {} segment(s) from {}", captions.len(), media.display());
        Ok(captions)
    }
}
