//! Backend-agnostic render plan.
//!
//! A [`RenderPlan`] holds the layout and timing of every caption for one render
//! call. The filter-graph backend turns it into drawing operations; the raster
//! backend walks its blocks frame by frame.

use crate::caption::{validate_captions, Caption};
use crate::error::Result;
use crate::karaoke::{word_windows, WordWindow};
use crate::layout::{layout_text, line_height, Canvas, HeuristicMeasure, LayoutLine};
use crate::style::{Style, StyleConfig};

pub const HIGHLIGHT_PADDING: i32 = 5;
pub const TEXT_HEIGHT_FACTOR: f32 = 1.15;

/// Layout and timing for one non-empty caption.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionBlock {
    pub start: f64,
    pub end: f64,
    pub lines: Vec<LayoutLine>,
    pub windows: Vec<WordWindow>,
}

impl CaptionBlock {
    pub fn is_active_at(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    /// Caption text with whitespace normalized.
    pub fn text(&self) -> String {
        self.lines.iter().map(LayoutLine::text).collect::<Vec<_>>().join(" ")
    }
}

/// One drawing operation, in the order it must be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Opaque box behind a line, sized by the renderer's own text measurement.
    Backdrop { text: String, y: i32, start: f64, end: f64 },
    /// Filled rectangle behind the word being spoken.
    Highlight {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        start: f64,
        end: f64,
    },
    /// The visible line of text, centered by the renderer.
    Text { text: String, y: i32, start: f64, end: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub canvas: Canvas,
    pub style: Style,
    pub blocks: Vec<CaptionBlock>,
}

impl RenderPlan {
    /// Validate the captions and lay them out for `canvas`. Captions whose text is
    /// blank are dropped.
    pub fn build(captions: &[Caption], canvas: Canvas, style: &StyleConfig) -> Result<Self> {
        validate_captions(captions)?;
        let style = style.resolve(canvas.height);
        let measure = HeuristicMeasure::new(style.font_size);

        let blocks = captions
            .iter()
            .filter_map(|caption| {
                let lines = layout_text(&caption.text, canvas, &style, &measure);
                if lines.is_empty() {
                    return None;
                }
                let windows = if style.karaoke {
                    word_windows(caption, &lines, &measure)
                } else {
                    Vec::new()
                };
                Some(CaptionBlock {
                    start: caption.start,
                    end: caption.end,
                    lines,
                    windows,
                })
            })
            .collect();

        Ok(Self {
            canvas,
            style,
            blocks,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn line_height(&self) -> i32 {
        line_height(self.style.font_size)
    }

    pub fn active_blocks(&self, t: f64) -> impl Iterator<Item = &CaptionBlock> {
        self.blocks.iter().filter(move |b| b.is_active_at(t))
    }

    /// Three layers per caption: backdrops, karaoke highlights, then text.
    pub fn ops(&self) -> Vec<DrawOp> {
        let text_h = (self.style.font_size as f32 * TEXT_HEIGHT_FACTOR) as i32;
        let mut ops = Vec::new();

        for block in &self.blocks {
            ops.extend(block.lines.iter().map(|line| DrawOp::Backdrop {
                text: line.text(),
                y: line.y as i32,
                start: block.start,
                end: block.end,
            }));

            ops.extend(block.windows.iter().map(|w| DrawOp::Highlight {
                x: w.x as i32 - HIGHLIGHT_PADDING,
                y: w.y as i32 - HIGHLIGHT_PADDING,
                width: (w.width + 2.0 * HIGHLIGHT_PADDING as f32) as u32,
                height: (text_h + 2 * HIGHLIGHT_PADDING) as u32,
                start: w.active_start,
                end: w.active_end,
            }));

            ops.extend(block.lines.iter().map(|line| DrawOp::Text {
                text: line.text(),
                y: line.y as i32,
                start: block.start,
                end: block.end,
            }));
        }
        ops
    }
}
