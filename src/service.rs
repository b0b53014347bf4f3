//! The top-level operations: inspect, transcribe, cut a clip, assemble a
//! supercut and burn captions into a whole file.
//!
//! Every operation checks its arguments before any external process runs, then
//! writes into a uniquely named temp file next to the final output and renames it
//! into place once rendering succeeded.

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::assemble::{self, rebase_captions, AssemblyOptions};
use crate::caption::{validate_captions, validate_segments, Caption, Segment};
use crate::config::Config;
use crate::error::{ComposeError, Result};
use crate::ffmpeg::{Ffmpeg, MediaInfo, MediaProbe};
use crate::format::OutputFormat;
use crate::plan::RenderPlan;
use crate::render::{CaptionRenderer, FrameBurnRenderer, GraphRenderer, RendererKind};
use crate::style::StyleConfig;
use crate::timeline::Timeline;
use crate::transcribe::{Transcriber, WhisperApiTranscriber};

/// Where captions for a clip or supercut come from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CaptionSource {
    #[default]
    None,
    /// Captions timed against the produced clip.
    Provided(Vec<Caption>),
    /// Transcribe the source and map the result onto the produced clip.
    Transcribe,
}

/// Caption settings shared by every operation that can draw captions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionOptions {
    pub source: CaptionSource,
    pub style: StyleConfig,
    pub renderer: RendererKind,
}

impl CaptionOptions {
    pub fn provided(captions: Vec<Caption>) -> Self {
        Self {
            source: CaptionSource::Provided(captions),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    pub source: PathBuf,
    pub start: f64,
    pub end: f64,
    pub format: OutputFormat,
    pub captions: CaptionOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupercutRequest {
    pub source: PathBuf,
    pub segments: Vec<Segment>,
    pub assembly: AssemblyOptions,
    pub format: OutputFormat,
    pub captions: CaptionOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BurnRequest {
    pub source: PathBuf,
    pub captions: Vec<Caption>,
    pub style: StyleConfig,
    pub renderer: RendererKind,
}

/// Owns the media engine and the lazily created transcriber.
pub struct ClipService {
    config: Config,
    ffmpeg: Ffmpeg,
    probe: Box<dyn MediaProbe + Send + Sync>,
    transcriber: OnceCell<Box<dyn Transcriber>>,
    show_progress: bool,
}

impl ClipService {
    pub fn new(config: Config) -> Self {
        let ffmpeg = Ffmpeg::new(&config);
        Self {
            probe: Box::new(ffmpeg.clone()),
            ffmpeg,
            config,
            transcriber: OnceCell::new(),
            show_progress: false,
        }
    }

    /// Replace ffprobe with another probe.
    pub fn with_probe(mut self, probe: Box<dyn MediaProbe + Send + Sync>) -> Self {
        self.probe = probe;
        self
    }

    /// Use `transcriber` instead of creating the Whisper client on first use.
    pub fn with_transcriber(mut self, transcriber: Box<dyn Transcriber>) -> Self {
        self.transcriber = OnceCell::from(transcriber);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metadata(&self, path: &Path) -> Result<MediaInfo> {
        ensure_exists(path)?;
        self.probe.probe(path)
    }

    pub async fn transcribe(&self, path: &Path) -> Result<Vec<Caption>> {
        ensure_exists(path)?;
        self.transcriber().await?.transcribe(path).await
    }

    /// Cut `[start, end]` out of the source, optionally reframed and captioned.
    pub async fn extract_clip(&self, request: &ClipRequest) -> Result<PathBuf> {
        let segment = Segment::new(request.start, request.end);
        let supercut = SupercutRequest {
            source: request.source.clone(),
            segments: vec![segment],
            assembly: AssemblyOptions::default(),
            format: request.format,
            captions: request.captions.clone(),
        };
        self.compose(&supercut, "clip").await
    }

    /// Join segments of the source in the order given.
    pub async fn create_supercut(&self, request: &SupercutRequest) -> Result<PathBuf> {
        self.compose(request, "supercut").await
    }

    /// Draw captions over the whole source, keeping its framing and audio.
    pub async fn burn_captions(&self, request: &BurnRequest) -> Result<PathBuf> {
        if request.captions.is_empty() {
            return Err(ComposeError::Validation("caption list is empty".to_string()));
        }
        validate_captions(&request.captions)?;
        ensure_exists(&request.source)?;
        let renderer = self.renderer(request.renderer)?;

        let media = self.probe.probe(&request.source)?;
        let timeline = Timeline::from_source(&request.source, &media)?;
        let plan = RenderPlan::build(&request.captions, timeline.canvas, &request.style)?;

        let output = output_path(&request.source, "burn", OutputFormat::Original.tag());
        let blocks = plan.blocks.len();
        write_output(output.clone(), move |staged| renderer.render(timeline, &plan, staged)).await?;
        info!("burned {blocks} caption(s) into {}", output.display());
        Ok(output)
    }

    async fn compose(&self, request: &SupercutRequest, operation: &str) -> Result<PathBuf> {
        validate_segments(&request.segments)?;
        assemble::validate(&request.segments, &request.assembly)?;
        if let CaptionSource::Provided(captions) = &request.captions.source {
            validate_captions(captions)?;
        }
        ensure_exists(&request.source)?;
        let renderer = match request.captions.source {
            CaptionSource::None => None,
            _ => Some(self.renderer(request.captions.renderer)?),
        };

        let media = self.probe.probe(&request.source)?;
        let mut timeline = assemble::assemble(&request.source, &media, &request.segments, &request.assembly)?;
        if let Some(target) = request.format.dimensions() {
            timeline.reframe(target)?;
        }

        let captions = match &request.captions.source {
            CaptionSource::None => Vec::new(),
            CaptionSource::Provided(captions) => captions.clone(),
            CaptionSource::Transcribe => {
                let transcript = self.transcribe(&request.source).await?;
                rebase_captions(&transcript, &request.segments, request.assembly.crossfade)
            }
        };

        let output = output_path(&request.source, operation, request.format.tag());
        match renderer {
            Some(renderer) if !captions.is_empty() => {
                let plan = RenderPlan::build(&captions, timeline.canvas, &request.captions.style)?;
                debug!("{} caption block(s) on a {}x{} canvas", plan.blocks.len(), plan.canvas.width, plan.canvas.height);
                write_output(output.clone(), move |staged| renderer.render(timeline, &plan, staged)).await?;
            }
            _ => {
                let ffmpeg = self.ffmpeg.clone();
                write_output(output.clone(), move |staged| ffmpeg.encode(&timeline, staged)).await?;
            }
        }
        info!("{operation} written to {}", output.display());
        Ok(output)
    }

    async fn transcriber(&self) -> Result<&dyn Transcriber> {
        let transcriber = self
            .transcriber
            .get_or_try_init(|| async {
                debug!("creating Whisper transcriber ({})", self.config.whisper_model);
                WhisperApiTranscriber::from_config(&self.config).map(|t| Box::new(t) as Box<dyn Transcriber>)
            })
            .await?;
        Ok(&**transcriber)
    }

    fn renderer(&self, kind: RendererKind) -> Result<Box<dyn CaptionRenderer>> {
        Ok(match kind {
            RendererKind::FilterGraph => Box::new(GraphRenderer::new(self.ffmpeg.clone(), self.config.font_file.clone())),
            RendererKind::FrameBurn => Box::new(
                FrameBurnRenderer::new(self.ffmpeg.clone(), self.config.font_file.as_deref())?
                    .with_progress(self.show_progress),
            ),
        })
    }
}

/// Run `render` on the blocking pool against a fresh temp file beside `output`,
/// then move the file into place.
async fn write_output<F>(output: PathBuf, render: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let staged = staging_path(&output)?;
        render(&staged)?;
        staged.persist(&output).map_err(|e| ComposeError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| ComposeError::Io(std::io::Error::other(format!("render task failed: {e}"))))?
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ComposeError::SourceNotFound(path.to_path_buf()))
    }
}

fn staging_path(output: &Path) -> Result<TempPath> {
    let dir = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file = tempfile::Builder::new().prefix(".clip-").suffix(".mp4").tempfile_in(dir)?;
    Ok(file.into_temp_path())
}

/// `<dir>/<stem>_<operation>_<format>.mp4` next to the input.
pub fn output_path(input: &Path, operation: &str, format_tag: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output");
    let dir = input.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{stem}_{operation}_{format_tag}.mp4"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::tests::media;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedProbe(MediaInfo);

    impl MediaProbe for FixedProbe {
        fn probe(&self, _path: &Path) -> Result<MediaInfo> {
            Ok(self.0.clone())
        }
    }

    struct CountingTranscriber(Arc<AtomicUsize>);

    #[async_trait]
    impl Transcriber for CountingTranscriber {
        async fn transcribe(&self, _media: &Path) -> Result<Vec<Caption>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Caption::new(0.0, 1.0, "hello").unwrap()])
        }
    }

    fn offline_config() -> Config {
        Config {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe_path: PathBuf::from("/nonexistent/ffprobe"),
            ..Config::default()
        }
    }

    #[test]
    fn test_output_path_naming() {
        assert_eq!(
            output_path(Path::new("/videos/talk.final.mp4"), "clip", "short"),
            PathBuf::from("/videos/talk.final_clip_short.mp4")
        );
        assert_eq!(
            output_path(Path::new("talk.mov"), "burn", "original"),
            PathBuf::from("talk_burn_original.mp4")
        );
    }

    #[test]
    fn test_staging_path_is_unique_and_beside_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let a = staging_path(&output).unwrap();
        let b = staging_path(&output).unwrap();
        assert_ne!(a.to_path_buf(), b.to_path_buf());
        assert_eq!(a.parent(), Some(dir.path()));
    }

    #[tokio::test]
    async fn test_clip_missing_source_fails_before_probe() {
        let service = ClipService::new(offline_config());
        let request = ClipRequest {
            source: PathBuf::from("/definitely/missing.mp4"),
            start: 0.0,
            end: 2.0,
            format: OutputFormat::from_tag("custom", Some("1:3")).unwrap(),
            captions: CaptionOptions::default(),
        };
        let err = service.extract_clip(&request).await.unwrap_err();
        assert!(matches!(err, ComposeError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_supercut_crossfade_guard() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp4");
        std::fs::write(&source, b"not really a video").unwrap();
        let service = ClipService::new(offline_config()).with_probe(Box::new(FixedProbe(media(1920, 1080, 60.0, true))));
        let request = SupercutRequest {
            source,
            segments: vec![Segment::new(0.0, 5.0), Segment::new(10.0, 10.4)],
            assembly: AssemblyOptions {
                crossfade: Some(1.0),
                fade: None,
            },
            format: OutputFormat::Original,
            captions: CaptionOptions::default(),
        };
        let err = service.create_supercut(&request).await.unwrap_err();
        assert!(err.is_validation(), "{err}");
    }

    #[tokio::test]
    async fn test_invalid_captions_rejected_before_work() {
        let service = ClipService::new(offline_config());
        let bad = Caption {
            start: 2.0,
            end: 1.0,
            text: "backwards".to_string(),
        };
        let request = ClipRequest {
            source: PathBuf::from("/definitely/missing.mp4"),
            start: 0.0,
            end: 2.0,
            format: OutputFormat::Original,
            captions: CaptionOptions::provided(vec![bad]),
        };
        let err = service.extract_clip(&request).await.unwrap_err();
        assert!(matches!(err, ComposeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_burn_requires_captions() {
        let service = ClipService::new(offline_config());
        let request = BurnRequest {
            source: PathBuf::from("/definitely/missing.mp4"),
            captions: Vec::new(),
            style: StyleConfig::default(),
            renderer: RendererKind::FilterGraph,
        };
        assert!(matches!(service.burn_captions(&request).await, Err(ComposeError::Validation(_))));
    }

    #[tokio::test]
    async fn test_failed_encode_leaves_only_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mp4");
        std::fs::write(&source, b"not really a video").unwrap();
        let service = ClipService::new(offline_config()).with_probe(Box::new(FixedProbe(media(1920, 1080, 60.0, true))));
        let request = ClipRequest {
            source: source.clone(),
            start: 1.0,
            end: 3.0,
            format: OutputFormat::Original,
            captions: CaptionOptions::default(),
        };
        let err = service.extract_clip(&request).await.unwrap_err();
        assert!(matches!(err, ComposeError::ExternalTool { .. }), "{err:?}");
        let names: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names, vec![std::ffi::OsString::from("in.mp4")]);
    }

    #[tokio::test]
    async fn test_write_output_persists_from_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let main_thread = std::thread::current().id();
        let worker = Arc::new(std::sync::Mutex::new(None));
        let seen = worker.clone();
        write_output(output.clone(), move |staged| {
            *seen.lock().unwrap() = Some(std::thread::current().id());
            std::fs::write(staged, b"frames")?;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"frames");
        assert_ne!(worker.lock().unwrap().unwrap(), main_thread);
    }

    #[tokio::test]
    async fn test_transcriber_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("talk.mp4");
        std::fs::write(&source, b"x").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let service = ClipService::new(offline_config()).with_transcriber(Box::new(CountingTranscriber(calls.clone())));
        assert_eq!(service.transcribe(&source).await.unwrap().len(), 1);
        assert_eq!(service.transcribe(&source).await.unwrap().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transcribe_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("talk.mp4");
        std::fs::write(&source, b"x").unwrap();
        let config = Config {
            openai_api_key: None,
            ..offline_config()
        };
        let err = ClipService::new(config).transcribe(&source).await.unwrap_err();
        assert!(matches!(err, ComposeError::Transcription(_)));
    }
}
