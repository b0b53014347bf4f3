use std::env;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Encoder settings shared by every ffmpeg invocation that re-encodes video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub crf: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
        }
    }
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// TrueType font for rendered captions. `None` lets ffmpeg pick via fontconfig;
    /// the raster backend falls back to a system font search.
    pub font_file: Option<PathBuf>,
    pub encode: EncodeSettings,
    pub openai_api_key: Option<String>,
    pub whisper_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: find_binary("ffmpeg"),
            ffprobe_path: find_binary("ffprobe"),
            font_file: None,
            encode: EncodeSettings::default(),
            openai_api_key: None,
            whisper_model: "whisper-1".to_string(),
        }
    }
}

impl Config {
    /// Build from the environment (call `dotenvy::dotenv()` first to include `.env`).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env_var("CLIP_FFMPEG") {
            config.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(path) = env_var("CLIP_FFPROBE") {
            config.ffprobe_path = PathBuf::from(path);
        }
        config.font_file = env_var("CLIP_FONT_FILE").map(PathBuf::from);
        if let Some(codec) = env_var("CLIP_VIDEO_CODEC") {
            config.encode.video_codec = codec;
        }
        if let Some(codec) = env_var("CLIP_AUDIO_CODEC") {
            config.encode.audio_codec = codec;
        }
        if let Some(preset) = env_var("CLIP_PRESET") {
            config.encode.preset = preset;
        }
        if let Some(raw) = env_var("CLIP_CRF") {
            match raw.parse::<u8>() {
                Ok(crf) if crf <= 51 => config.encode.crf = crf,
                _ => warn!("ignoring CLIP_CRF={raw}: expected an integer in 0..=51"),
            }
        }
        config.openai_api_key = env_var("OPENAI_API_KEY");
        if let Some(model) = env_var("CLIP_WHISPER_MODEL") {
            config.whisper_model = model;
        }
        config
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn find_binary(name: &str) -> PathBuf {
    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// First bold sans-serif font found in the usual system locations.
pub fn find_system_font() -> Option<PathBuf> {
    FONT_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|p| p.is_file())
        .map(Path::to_path_buf)
}
