use std::fs;
use std::path::Path;

use fontdue::{Font, FontSettings};
use indicatif::{ProgressBar, ProgressStyle};
use tempfile::TempPath;
use tracing::{debug, info};

use super::raster::{fill_rounded_rect, Frame, Rect, TextPainter};
use super::CaptionRenderer;
use crate::config::find_system_font;
use crate::error::{ComposeError, Result};
use crate::ffmpeg::{Ffmpeg, MediaInfo, MediaProbe, RawVideoReader, RawVideoWriter};
use crate::layout::{layout_text, line_height, Canvas, LayoutLine, TextMeasure, BOX_PADDING};
use crate::plan::{RenderPlan, TEXT_HEIGHT_FACTOR};
use crate::style::Style;
use crate::timeline::Timeline;

const CORNER_RADIUS: u32 = 12;

/// Parse a TrueType/OpenType font file.
pub fn load_font(path: &Path) -> Result<Font> {
    let bytes = fs::read(path).map_err(|e| ComposeError::Validation(format!("cannot read font {}: {e}", path.display())))?;
    Font::from_bytes(bytes, FontSettings::default())
        .map_err(|e| ComposeError::Validation(format!("cannot parse font {}: {e}", path.display())))
}

/// Frame-burn backend: decode every frame, draw the active captions, encode a
/// video-only intermediate and put the source audio back on it.
///
/// Renders a rounded backdrop and text per line. Karaoke windows in the plan are
/// ignored.
pub struct FrameBurnRenderer {
    ffmpeg: Ffmpeg,
    font: Font,
    show_progress: bool,
}

impl FrameBurnRenderer {
    /// Use `font_file`, or the first system font found when `None`.
    pub fn new(ffmpeg: Ffmpeg, font_file: Option<&Path>) -> Result<Self> {
        let path = match font_file {
            Some(path) => path.to_path_buf(),
            None => find_system_font().ok_or_else(|| {
                ComposeError::Validation("no usable font found; set CLIP_FONT_FILE to a .ttf file".to_string())
            })?,
        };
        debug!("frame burn font: {}", path.display());
        Ok(Self {
            ffmpeg,
            font: load_font(&path)?,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    fn burn(&self, source: &Path, media: &MediaInfo, plan: &RenderPlan, intermediate: &Path) -> Result<u64> {
        let video = media.video.as_ref().ok_or_else(|| ComposeError::SourceOpen {
            path: source.to_path_buf(),
            reason: "no video stream".to_string(),
        })?;

        let mut reader = self.ffmpeg.open_decoder(source, video.width, video.height)?;
        let mut writer = match self.ffmpeg.open_encoder(intermediate, video.width, video.height, video.fps) {
            Ok(writer) => writer,
            Err(e) => {
                reader.abort();
                return Err(e);
            }
        };

        let mut painter = TextPainter::new(&self.font, plan.style.font_size as f32);
        let canvas = Canvas::new(video.width, video.height);
        let blocks = BurnBlock::layout(plan, canvas, &painter);
        let anchor_y = plan.style.position.anchor_y(canvas.height);
        let progress = self.progress_bar(video.frame_count);

        let mut cursor = FrameCursor::new(video.fps);
        let pumped = pump_frames(
            &mut reader,
            &mut writer,
            &mut cursor,
            |frame, t| draw_active(frame, canvas, t, anchor_y, &blocks, &plan.style, &mut painter),
            &progress,
        );
        progress.finish_and_clear();

        match pumped {
            Ok(()) => {
                let frames = cursor.close();
                if let Err(e) = reader.finish() {
                    writer.abort();
                    return Err(if frames == 0 { source_open(source, e) } else { e });
                }
                writer.finish()?;
                Ok(frames)
            }
            Err(e) => {
                cursor.close();
                reader.abort();
                writer.abort();
                Err(e)
            }
        }
    }

    fn progress_bar(&self, frames: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        match frames {
            Some(total) => {
                let pb = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::with_template("{spinner} burning captions [{bar:40}] {pos}/{len} frames ({eta})") {
                    pb.set_style(style.progress_chars("=> "));
                }
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_message("burning captions");
                pb
            }
        }
    }
}

impl CaptionRenderer for FrameBurnRenderer {
    fn render(&self, timeline: Timeline, plan: &RenderPlan, output: &Path) -> Result<()> {
        let dir = output_dir(output);

        // Cuts and reframes are encoded first so the burn pass reads plain frames.
        let staged = if timeline.is_passthrough() {
            None
        } else {
            let staged = temp_path(dir, ".stage.mp4")?;
            self.ffmpeg.encode(&timeline, &staged)?;
            Some(staged)
        };
        let source: &Path = staged.as_deref().unwrap_or(timeline.source.as_path());
        let media = self.ffmpeg.probe(source).map_err(|e| source_open(source, e))?;

        let intermediate = temp_path(dir, ".burn.mp4")?;
        let frames = self.burn(source, &media, plan, &intermediate)?;
        debug!("burned {frames} frame(s) into {}", intermediate.display());

        match AudioStep::for_media(&media) {
            AudioStep::Remux => {
                self.ffmpeg
                    .remux(&intermediate, source, output)
                    .map_err(|e| ComposeError::Remux(e.to_string()))?;
            }
            AudioStep::VideoOnly => {
                info!("source has no audio, keeping video-only output");
                intermediate.persist(output).map_err(|e| ComposeError::Io(e.error))?;
            }
        }
        Ok(())
    }
}

/// A tool that ran and rejected the burn source means it cannot be decoded.
/// Tools that never started keep their own error.
fn source_open(source: &Path, error: ComposeError) -> ComposeError {
    match error {
        ComposeError::ExternalTool { stderr, status, .. }
            if status.starts_with("exit status") || status.starts_with("signal") =>
        {
            ComposeError::SourceOpen {
                path: source.to_path_buf(),
                reason: if stderr.is_empty() { status } else { stderr },
            }
        }
        other => other,
    }
}

/// What happens to the burned video once all frames are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AudioStep {
    /// Copy the source's audio next to the burned video.
    Remux,
    /// The burned video is the result.
    VideoOnly,
}

impl AudioStep {
    fn for_media(media: &MediaInfo) -> Self {
        if media.has_audio() {
            Self::Remux
        } else {
            Self::VideoOnly
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Opened,
    Reading,
    Done,
    Closed,
}

/// Frame index and presentation time over a decoded stream.
#[derive(Debug)]
struct FrameCursor {
    fps: f64,
    index: u64,
    state: CursorState,
}

impl FrameCursor {
    fn new(fps: f64) -> Self {
        Self {
            fps: if fps > 0.0 { fps } else { 30.0 },
            index: 0,
            state: CursorState::Opened,
        }
    }

    /// Time of the next frame if one was read, `None` once the stream is exhausted.
    fn advance(&mut self, has_frame: bool) -> Option<f64> {
        match (self.state, has_frame) {
            (CursorState::Opened | CursorState::Reading, true) => {
                self.state = CursorState::Reading;
                let t = self.index as f64 / self.fps;
                self.index += 1;
                Some(t)
            }
            (CursorState::Opened | CursorState::Reading, false) => {
                self.state = CursorState::Done;
                None
            }
            (CursorState::Done | CursorState::Closed, _) => None,
        }
    }

    /// Frames seen so far.
    fn close(&mut self) -> u64 {
        self.state = CursorState::Closed;
        self.index
    }
}

fn pump_frames<F>(
    reader: &mut RawVideoReader,
    writer: &mut RawVideoWriter,
    cursor: &mut FrameCursor,
    mut draw: F,
    progress: &ProgressBar,
) -> Result<()>
where
    F: FnMut(&mut [u8], f64),
{
    let mut frame = vec![0u8; reader.frame_size()];
    loop {
        let has_frame = reader.read_frame(&mut frame)?;
        let Some(t) = cursor.advance(has_frame) else {
            return Ok(());
        };
        draw(&mut frame, t);
        writer.write_frame(&frame)?;
        progress.inc(1);
    }
}

/// A caption re-laid out with exact glyph widths.
struct BurnBlock {
    start: f64,
    end: f64,
    lines: Vec<LayoutLine>,
}

impl BurnBlock {
    fn layout<M: TextMeasure>(plan: &RenderPlan, canvas: Canvas, measure: &M) -> Vec<Self> {
        plan.blocks
            .iter()
            .map(|block| Self {
                start: block.start,
                end: block.end,
                lines: layout_text(&block.text(), canvas, &plan.style, measure),
            })
            .collect()
    }

    fn is_active_at(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Lines of every caption active at `t`, stacked downwards from `anchor_y` in plan order.
fn stack_active(blocks: &[BurnBlock], t: f64, anchor_y: i32, step: i32) -> Vec<(&LayoutLine, i32)> {
    blocks
        .iter()
        .filter(|b| b.is_active_at(t))
        .flat_map(|b| b.lines.iter())
        .enumerate()
        .map(|(i, line)| (line, anchor_y + i as i32 * step))
        .collect()
}

fn draw_active(
    data: &mut [u8],
    canvas: Canvas,
    t: f64,
    anchor_y: i32,
    blocks: &[BurnBlock],
    style: &Style,
    painter: &mut TextPainter<'_>,
) {
    let lines = stack_active(blocks, t, anchor_y, line_height(style.font_size));
    if lines.is_empty() {
        return;
    }

    let mut frame = Frame {
        data,
        width: canvas.width,
        height: canvas.height,
    };
    let text_h = (style.font_size as f32 * TEXT_HEIGHT_FACTOR) as u32;
    let pad = BOX_PADDING as u32;
    let bg = style.bg_color.to_rgba();
    let fg = style.font_color.to_rgba();

    for (line, y) in lines {
        let x = line.x as i32;
        let rect = Rect {
            x: (x - BOX_PADDING).max(0) as u32,
            y: (y - BOX_PADDING).max(0) as u32,
            w: line.width.ceil() as u32 + 2 * pad,
            h: text_h + 2 * pad,
        };
        fill_rounded_rect(&mut frame, rect, CORNER_RADIUS, bg);
        painter.draw_line(&mut frame, x, y, &line.text(), fg);
    }
}

fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Empty temp file next to the output, removed when dropped.
fn temp_path(dir: &Path, suffix: &str) -> Result<TempPath> {
    let file = tempfile::Builder::new().prefix(".clip-").suffix(suffix).tempfile_in(dir)?;
    Ok(file.into_temp_path())
}
