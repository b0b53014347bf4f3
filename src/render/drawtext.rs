use std::path::{Path, PathBuf};

use tracing::debug;

use super::CaptionRenderer;
use crate::error::{ComposeError, Result};
use crate::ffmpeg::Ffmpeg;
use crate::graph::{between, escape_drawtext, Filter, FilterGraph, Stream};
use crate::layout::BOX_PADDING;
use crate::plan::{DrawOp, RenderPlan};
use crate::timeline::Timeline;

const TEXT_BORDER: u32 = 2;
const CENTER_X: &str = "(w-text_w)/2";

/// Appends drawtext/drawbox layers for a [`RenderPlan`] to a filter graph.
///
/// Backdrops and text are centered by drawtext itself. Highlight boxes use the
/// heuristic word positions from the plan, so they can drift slightly from the
/// rendered glyphs with proportional fonts.
#[derive(Debug, Clone, Default)]
pub struct CaptionGraphBuilder {
    font_file: Option<PathBuf>,
}

impl CaptionGraphBuilder {
    pub fn new(font_file: Option<PathBuf>) -> Self {
        Self { font_file }
    }

    pub fn apply(&self, graph: &mut FilterGraph, video: &Stream, plan: &RenderPlan) -> Result<Stream> {
        if !graph.contains(video) {
            return Err(ComposeError::InvalidStream(video.label().to_string()));
        }
        let mut stream = video.clone();
        for op in plan.ops() {
            stream = graph.apply(&stream, self.filter(&op, plan))?;
        }
        Ok(stream)
    }

    fn filter(&self, op: &DrawOp, plan: &RenderPlan) -> Filter {
        let style = &plan.style;
        match op {
            DrawOp::Backdrop { text, y, start, end } => self
                .drawtext(text, style.font_size)
                .arg("fontcolor", "white@0")
                .arg("box", 1)
                .arg("boxcolor", style.bg_color.to_ffmpeg())
                .arg("boxborderw", BOX_PADDING)
                .arg("x", CENTER_X)
                .arg("y", y)
                .arg("enable", between(*start, *end)),
            DrawOp::Highlight {
                x,
                y,
                width,
                height,
                start,
                end,
            } => Filter::new("drawbox")
                .arg("x", x)
                .arg("y", y)
                .arg("w", width)
                .arg("h", height)
                .arg("color", style.highlight_color.to_ffmpeg())
                .arg("t", "fill")
                .arg("enable", between(*start, *end)),
            DrawOp::Text { text, y, start, end } => self
                .drawtext(text, style.font_size)
                .arg("fontcolor", style.font_color.to_ffmpeg())
                .arg("borderw", TEXT_BORDER)
                .arg("bordercolor", "black")
                .arg("x", CENTER_X)
                .arg("y", y)
                .arg("enable", between(*start, *end)),
        }
    }

    fn drawtext(&self, text: &str, font_size: u32) -> Filter {
        let filter = Filter::new("drawtext");
        let filter = match &self.font_file {
            Some(path) => filter.arg("fontfile", path.display()),
            None => filter,
        };
        filter.arg("text", escape_drawtext(text)).arg("fontsize", font_size)
    }
}

/// Filter-graph backend: captions become part of the timeline's graph and the
/// result is encoded in one ffmpeg run.
#[derive(Debug, Clone)]
pub struct GraphRenderer {
    ffmpeg: Ffmpeg,
    builder: CaptionGraphBuilder,
}

impl GraphRenderer {
    pub fn new(ffmpeg: Ffmpeg, font_file: Option<PathBuf>) -> Self {
        Self {
            ffmpeg,
            builder: CaptionGraphBuilder::new(font_file),
        }
    }
}

impl CaptionRenderer for GraphRenderer {
    fn render(&self, mut timeline: Timeline, plan: &RenderPlan, output: &Path) -> Result<()> {
        if !plan.is_empty() {
            timeline.video = self.builder.apply(&mut timeline.graph, &timeline.video, plan)?;
        }
        debug!(
            "encoding {} caption(s) with {} filter(s)",
            plan.blocks.len(),
            timeline.graph.len()
        );
        self.ffmpeg.encode(&timeline, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::Caption;
    use crate::graph::StreamKind;
    use crate::layout::Canvas;
    use crate::style::StyleConfig;

    fn plan(captions: &[(f64, f64, &str)], style: &StyleConfig) -> RenderPlan {
        let captions: Vec<Caption> = captions
            .iter()
            .map(|&(s, e, t)| Caption::new(s, e, t).unwrap())
            .collect();
        RenderPlan::build(&captions, Canvas::new(1080, 1920), style).unwrap()
    }

    #[test]
    fn test_layers_in_order() {
        let mut graph = FilterGraph::new();
        let video = graph.source(0, StreamKind::Video);
        let plan = plan(&[(0.5, 2.5, "Testing single clip caption")], &StyleConfig::default());
        let out = CaptionGraphBuilder::default().apply(&mut graph, &video, &plan).unwrap();
        assert_eq!(out.kind(), StreamKind::Video);

        let filters: Vec<&Filter> = graph.filters().collect();
        assert_eq!(filters.len(), 1 + 4 + 1);
        assert_eq!(filters[0].name(), "drawtext");
        assert_eq!(filters[0].get("fontcolor"), Some("white@0"));
        assert_eq!(filters[0].get("box"), Some("1"));
        assert_eq!(filters[0].get("boxborderw"), Some("10"));
        assert!(filters[1..5].iter().all(|f| f.name() == "drawbox" && f.get("t") == Some("fill")));
        assert_eq!(filters[5].get("fontcolor"), Some("0xFFFFFF"));
        assert_eq!(filters[5].get("borderw"), Some("2"));
        assert_eq!(filters[5].get("x"), Some("(w-text_w)/2"));
    }

    #[test]
    fn test_highlight_enable_windows() {
        let mut graph = FilterGraph::new();
        let video = graph.source(0, StreamKind::Video);
        let plan = plan(&[(0.0, 2.0, "one two")], &StyleConfig::default());
        CaptionGraphBuilder::default().apply(&mut graph, &video, &plan).unwrap();
        let enables: Vec<&str> = graph
            .filters()
            .filter(|f| f.name() == "drawbox")
            .filter_map(|f| f.get("enable"))
            .collect();
        assert_eq!(enables, vec!["between(t,0.000,1.000)", "between(t,1.000,2.000)"]);
    }

    #[test]
    fn test_style_colors_reach_filters() {
        let style = StyleConfig::from_json(r##"{"bg_color": "black@0.5", "highlight_color": "#00FF00", "karaoke": true}"##).unwrap();
        let mut graph = FilterGraph::new();
        let video = graph.source(0, StreamKind::Video);
        let plan = plan(&[(0.0, 1.0, "hi")], &style);
        CaptionGraphBuilder::default().apply(&mut graph, &video, &plan).unwrap();
        let rendered = graph.render();
        assert!(rendered.contains("boxcolor=0x000000@0.50"));
        assert!(rendered.contains("color=0x00FF00"));
    }

    #[test]
    fn test_text_is_escaped_in_graph() {
        let mut graph = FilterGraph::new();
        let video = graph.source(0, StreamKind::Video);
        let plan = plan(&[(0.0, 1.0, "it's 5:00")], &StyleConfig::default());
        CaptionGraphBuilder::new(Some(PathBuf::from("/fonts/Sans.ttf")))
            .apply(&mut graph, &video, &plan)
            .unwrap();
        let rendered = graph.render();
        assert!(rendered.contains("it\u{2019}s 5\\\\:00"));
        assert!(rendered.contains("fontfile=/fonts/Sans.ttf"));
    }

    #[test]
    fn test_consumed_stream_is_invalid() {
        let mut graph = FilterGraph::new();
        let video = graph.source(0, StreamKind::Video);
        let scaled = graph.apply(&video, Filter::new("null")).unwrap();
        graph.apply(&scaled, Filter::new("null")).unwrap();
        let plan = plan(&[(0.0, 1.0, "hi")], &StyleConfig::default());
        let err = CaptionGraphBuilder::default().apply(&mut graph, &scaled, &plan).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidStream(_)));
    }

    #[test]
    fn test_empty_plan_leaves_stream_unchanged() {
        let mut graph = FilterGraph::new();
        let video = graph.source(0, StreamKind::Video);
        let plan = plan(&[(0.0, 1.0, "  ")], &StyleConfig::default());
        let out = CaptionGraphBuilder::default().apply(&mut graph, &video, &plan).unwrap();
        assert_eq!(out, video);
        assert!(graph.is_empty());
    }
}
