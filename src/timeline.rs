use std::path::{Path, PathBuf};

use crate::compositor::blurred_background;
use crate::error::{ComposeError, Result};
use crate::ffmpeg::MediaInfo;
use crate::format::Dimensions;
use crate::graph::{FilterGraph, Stream, StreamKind};
use crate::layout::Canvas;

/// A composed video (and optional audio) built from one source file, described as
/// a filter graph that has not been executed yet.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub source: PathBuf,
    pub graph: FilterGraph,
    pub video: Stream,
    pub audio: Option<Stream>,
    /// Length of the composed result in seconds.
    pub duration: f64,
    pub canvas: Canvas,
}

impl Timeline {
    /// The whole source, untouched.
    pub fn from_source(source: &Path, media: &MediaInfo) -> Result<Self> {
        let canvas = source_canvas(source, media)?;
        let mut graph = FilterGraph::new();
        let video = graph.source(0, StreamKind::Video);
        let audio = media.has_audio().then(|| graph.source(0, StreamKind::Audio));
        Ok(Self {
            source: source.to_path_buf(),
            graph,
            video,
            audio,
            duration: media.duration,
            canvas,
        })
    }

    /// True when encoding this timeline needs no filter graph.
    pub fn is_passthrough(&self) -> bool {
        self.graph.is_empty()
    }

    /// Reframe the video onto `target` over a blurred fill. Audio is untouched.
    pub fn reframe(&mut self, target: Dimensions) -> Result<()> {
        self.video = blurred_background(&mut self.graph, &self.video, target)?;
        self.canvas = Canvas::new(target.width, target.height);
        Ok(())
    }
}

pub(crate) fn source_canvas(source: &Path, media: &MediaInfo) -> Result<Canvas> {
    let video = media.video.as_ref().ok_or_else(|| ComposeError::SourceOpen {
        path: source.to_path_buf(),
        reason: "no video stream".to_string(),
    })?;
    if video.width == 0 || video.height == 0 {
        return Err(ComposeError::SourceOpen {
            path: source.to_path_buf(),
            reason: "video stream reports no frame size".to_string(),
        });
    }
    Ok(Canvas::new(video.width, video.height))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ffmpeg::{AudioInfo, VideoInfo};

    pub(crate) fn media(width: u32, height: u32, duration: f64, audio: bool) -> MediaInfo {
        MediaInfo {
            duration,
            video: Some(VideoInfo {
                width,
                height,
                fps: 30.0,
                codec: "h264".to_string(),
                frame_count: None,
            }),
            audio: audio.then(|| AudioInfo {
                codec: "aac".to_string(),
                sample_rate: Some(48000),
                channels: Some(2),
            }),
        }
    }

    #[test]
    fn test_passthrough_timeline() {
        let timeline = Timeline::from_source(Path::new("in.mp4"), &media(1920, 1080, 12.0, true)).unwrap();
        assert!(timeline.is_passthrough());
        assert_eq!(timeline.video.map_arg(), "0:v:0");
        assert_eq!(timeline.audio.as_ref().map(Stream::map_arg).as_deref(), Some("0:a:0"));
        assert_eq!(timeline.canvas, Canvas::new(1920, 1080));
    }

    #[test]
    fn test_reframe_updates_canvas() {
        let mut timeline = Timeline::from_source(Path::new("in.mp4"), &media(1920, 1080, 12.0, false)).unwrap();
        assert!(timeline.audio.is_none());
        timeline.reframe(Dimensions::new(1080, 1920).unwrap()).unwrap();
        assert!(!timeline.is_passthrough());
        assert_eq!(timeline.canvas, Canvas::new(1080, 1920));
    }

    #[test]
    fn test_source_without_video() {
        let mut info = media(0, 0, 3.0, true);
        info.video = None;
        assert!(matches!(
            Timeline::from_source(Path::new("song.mp3"), &info),
            Err(ComposeError::SourceOpen { .. })
        ));
    }
}
