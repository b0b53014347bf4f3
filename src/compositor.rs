//! Reframing onto a target canvas with a blurred fill.
//!
//! The source is drawn twice: once scaled to cover the canvas, cropped and
//! blurred as a background, and once scaled to the canvas width on top of it.

use crate::error::Result;
use crate::format::Dimensions;
use crate::graph::{Filter, FilterGraph, Stream, StreamKind};

const BLUR_RADIUS: u32 = 20;
const BLUR_POWER: u32 = 2;

/// Add the blurred-background composition for `target` to `graph`.
///
/// The returned stream is always exactly `target` in size, whatever the source
/// aspect ratio.
pub fn blurred_background(graph: &mut FilterGraph, video: &Stream, target: Dimensions) -> Result<Stream> {
    let Dimensions { width, height } = target;
    let branches = graph.split(video, 2)?;

    let bg = graph.apply(
        &branches[0],
        Filter::new("scale")
            .arg("w", width)
            .arg("h", height)
            .arg("force_original_aspect_ratio", "increase"),
    )?;
    let bg = graph.apply(&bg, Filter::new("crop").arg("w", width).arg("h", height))?;
    let bg = graph.apply(
        &bg,
        Filter::new("boxblur")
            .arg("luma_radius", BLUR_RADIUS)
            .arg("luma_power", BLUR_POWER),
    )?;

    // -2 keeps the aspect ratio and rounds the height to an even value
    let fg = graph.apply(&branches[1], Filter::new("scale").arg("w", width).arg("h", -2))?;

    let mut out = graph.apply_multi(
        &[&bg, &fg],
        Filter::new("overlay").arg("x", "(W-w)/2").arg("y", "(H-h)/2"),
        &[StreamKind::Video],
    )?;
    let composed = out.remove(0);
    graph.apply(&composed, Filter::new("setsar").value(1))
}
