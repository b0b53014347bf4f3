//! Caption rendering backends.
//!
//! Both backends consume the same [`RenderPlan`]. The filter-graph backend adds
//! drawing filters to the timeline and encodes once. The frame-burn backend
//! rasterizes captions into decoded frames and reattaches the audio afterwards.

mod burn;
mod drawtext;
mod raster;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use burn::{load_font, FrameBurnRenderer};
pub use drawtext::{CaptionGraphBuilder, GraphRenderer};

use crate::error::{ComposeError, Result};
use crate::plan::RenderPlan;
use crate::timeline::Timeline;

/// Turns a composed timeline plus a caption plan into a finished file.
pub trait CaptionRenderer: Send {
    /// Write `timeline` with `plan` drawn over it to `output`, replacing any
    /// existing file.
    fn render(&self, timeline: Timeline, plan: &RenderPlan, output: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererKind {
    /// drawtext/drawbox filters, single encode. Supports karaoke highlighting.
    #[default]
    FilterGraph,
    /// Per-frame raster drawing with exact glyph metrics. No karaoke.
    FrameBurn,
}

impl RendererKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::FilterGraph => "filter-graph",
            Self::FrameBurn => "frame-burn",
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RendererKind {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filter-graph" | "graph" | "ffmpeg" => Ok(Self::FilterGraph),
            "frame-burn" | "burn" | "raster" => Ok(Self::FrameBurn),
            other => Err(ComposeError::Validation(format!(
                "unknown renderer '{other}', expected filter-graph or frame-burn"
            ))),
        }
    }
}
