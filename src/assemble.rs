//! Cutting one or more ranges out of a source and joining them into a single
//! timeline, optionally with cross-fades between ranges and fades at both ends.

use std::path::Path;

use tracing::{debug, warn};

use crate::caption::{validate_segments, Caption, Segment};
use crate::error::{ComposeError, Result};
use crate::ffmpeg::MediaInfo;
use crate::graph::{seconds, Filter, FilterGraph, Stream, StreamKind};
use crate::timeline::{source_canvas, Timeline};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AssemblyOptions {
    /// Overlap, in seconds, of a cross-dissolve between consecutive segments.
    /// `None` joins segments with hard cuts.
    pub crossfade: Option<f64>,
    /// Length, in seconds, of a fade from and to black/silence at both ends.
    pub fade: Option<f64>,
}

/// Segments clipped to the source length, ready for graph building.
fn effective_segments(segments: &[Segment], media: &MediaInfo) -> Result<Vec<Segment>> {
    validate_segments(segments)?;
    if media.duration <= 0.0 {
        return Ok(segments.to_vec());
    }
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            if segment.start >= media.duration {
                return Err(ComposeError::Validation(format!(
                    "segment {i} starts at {}s, past the end of the source ({}s)",
                    segment.start, media.duration
                )));
            }
            if segment.end > media.duration {
                warn!(
                    "segment {i} ends at {}s, clipping to source length {}s",
                    segment.end, media.duration
                );
                return Ok(Segment::new(segment.start, media.duration));
            }
            Ok(*segment)
        })
        .collect()
}

fn positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ComposeError::Validation(format!(
            "{name} must be a positive number of seconds, got {value}"
        )))
    }
}

/// Length of the assembled result.
fn assembled_duration(segments: &[Segment], crossfade: Option<f64>) -> f64 {
    let total: f64 = segments.iter().map(Segment::duration).sum();
    let overlaps = segments.len().saturating_sub(1) as f64;
    total - crossfade.map_or(0.0, |t| t * overlaps)
}

/// Check segments and options before the source has been looked at.
///
/// [`assemble`] repeats these checks once segments are clipped to the source.
pub fn validate(segments: &[Segment], options: &AssemblyOptions) -> Result<()> {
    validate_options(segments.to_vec(), options).map(|_| ())
}

fn plan_segments(segments: &[Segment], media: &MediaInfo, options: &AssemblyOptions) -> Result<Vec<Segment>> {
    validate_options(effective_segments(segments, media)?, options)
}

fn validate_options(segments: Vec<Segment>, options: &AssemblyOptions) -> Result<Vec<Segment>> {
    validate_segments(&segments)?;

    if let Some(transition) = options.crossfade {
        let transition = positive("crossfade duration", transition)?;
        if let Some((i, short)) = segments
            .iter()
            .enumerate()
            .find(|(_, s)| s.duration() < transition)
        {
            return Err(ComposeError::Validation(format!(
                "segment {i} lasts {:.3}s, shorter than the {transition}s crossfade",
                short.duration()
            )));
        }
    }

    if let Some(fade) = options.fade {
        let fade = positive("fade duration", fade)?;
        let total = assembled_duration(&segments, options.crossfade);
        if fade * 2.0 > total {
            return Err(ComposeError::Validation(format!(
                "fade of {fade}s at both ends does not fit in {total:.3}s of output"
            )));
        }
    }
    Ok(segments)
}

/// Build the timeline for `segments` of `source`, in the order given.
pub fn assemble(source: &Path, media: &MediaInfo, segments: &[Segment], options: &AssemblyOptions) -> Result<Timeline> {
    let segments = plan_segments(segments, media, options)?;
    let canvas = source_canvas(source, media)?;
    let with_audio = media.has_audio();

    let mut graph = FilterGraph::new();
    let src_video = graph.source(0, StreamKind::Video);
    let src_audio = with_audio.then(|| graph.source(0, StreamKind::Audio));

    let mut pieces: Vec<(Stream, Option<Stream>)> = Vec::with_capacity(segments.len());
    for segment in &segments {
        let video = trim(&mut graph, &src_video, segment)?;
        let audio = match &src_audio {
            Some(a) => Some(trim(&mut graph, a, segment)?),
            None => None,
        };
        pieces.push((video, audio));
    }

    let (mut video, mut audio) = match options.crossfade {
        Some(transition) => crossfade_join(&mut graph, pieces, &segments, transition)?,
        None => concat_join(&mut graph, pieces, with_audio)?,
    };
    let duration = assembled_duration(&segments, options.crossfade);

    if let Some(fade) = options.fade {
        video = fade_ends(&mut graph, &video, fade, duration)?;
        if let Some(a) = audio.take() {
            audio = Some(fade_ends(&mut graph, &a, fade, duration)?);
        }
    }

    debug!(
        "assembled {} segment(s) into {:.3}s ({} filters)",
        segments.len(),
        duration,
        graph.len()
    );
    Ok(Timeline {
        source: source.to_path_buf(),
        graph,
        video,
        audio,
        duration,
        canvas,
    })
}

fn trim(graph: &mut FilterGraph, input: &Stream, segment: &Segment) -> Result<Stream> {
    let (trim, setpts) = match input.kind() {
        StreamKind::Video => ("trim", "setpts"),
        StreamKind::Audio => ("atrim", "asetpts"),
    };
    let cut = graph.apply(
        input,
        Filter::new(trim)
            .arg("start", seconds(segment.start))
            .arg("end", seconds(segment.end)),
    )?;
    graph.apply(&cut, Filter::new(setpts).value("PTS-STARTPTS"))
}

fn concat_join(
    graph: &mut FilterGraph,
    mut pieces: Vec<(Stream, Option<Stream>)>,
    with_audio: bool,
) -> Result<(Stream, Option<Stream>)> {
    if pieces.len() == 1 {
        return Ok(pieces.remove(0));
    }
    let mut inputs: Vec<&Stream> = Vec::with_capacity(pieces.len() * 2);
    for (video, audio) in &pieces {
        inputs.push(video);
        if let Some(audio) = audio {
            inputs.push(audio);
        }
    }
    let filter = Filter::new("concat")
        .arg("n", pieces.len())
        .arg("v", 1)
        .arg("a", u8::from(with_audio));
    let outputs: &[StreamKind] = if with_audio {
        &[StreamKind::Video, StreamKind::Audio]
    } else {
        &[StreamKind::Video]
    };
    let mut joined = graph.apply_multi(&inputs, filter, outputs)?.into_iter();
    let video = joined
        .next()
        .ok_or_else(|| ComposeError::InvalidStream("concat".to_string()))?;
    Ok((video, joined.next()))
}

fn crossfade_join(
    graph: &mut FilterGraph,
    pieces: Vec<(Stream, Option<Stream>)>,
    segments: &[Segment],
    transition: f64,
) -> Result<(Stream, Option<Stream>)> {
    let mut pieces = pieces.into_iter();
    let (mut video, mut audio) = pieces
        .next()
        .ok_or_else(|| ComposeError::Validation("segment list is empty".to_string()))?;
    let mut cumulative = segments[0].duration();

    for ((next_video, next_audio), segment) in pieces.zip(&segments[1..]) {
        let offset = cumulative - transition;
        video = graph
            .apply_multi(
                &[&video, &next_video],
                Filter::new("xfade")
                    .arg("transition", "fade")
                    .arg("duration", seconds(transition))
                    .arg("offset", seconds(offset)),
                &[StreamKind::Video],
            )?
            .remove(0);
        audio = match (audio, next_audio) {
            (Some(a), Some(b)) => Some(
                graph
                    .apply_multi(
                        &[&a, &b],
                        Filter::new("acrossfade").arg("d", seconds(transition)),
                        &[StreamKind::Audio],
                    )?
                    .remove(0),
            ),
            _ => None,
        };
        cumulative += segment.duration() - transition;
    }
    Ok((video, audio))
}

fn fade_ends(graph: &mut FilterGraph, input: &Stream, fade: f64, duration: f64) -> Result<Stream> {
    let name = match input.kind() {
        StreamKind::Video => "fade",
        StreamKind::Audio => "afade",
    };
    let faded_in = graph.apply(
        input,
        Filter::new(name).arg("t", "in").arg("st", 0).arg("d", seconds(fade)),
    )?;
    graph.apply(
        &faded_in,
        Filter::new(name)
            .arg("t", "out")
            .arg("st", seconds(duration - fade))
            .arg("d", seconds(fade)),
    )
}

/// Map captions timed against the source onto the assembled output.
///
/// Each caption is cut to the segments it overlaps and shifted to where that
/// segment lands in the output. Pieces that end up with no duration are dropped.
pub fn rebase_captions(captions: &[Caption], segments: &[Segment], crossfade: Option<f64>) -> Vec<Caption> {
    let overlap = crossfade.unwrap_or(0.0);
    let mut offset = 0.0;
    let mut rebased = Vec::new();
    for segment in segments {
        for caption in captions {
            let start = caption.start.max(segment.start);
            let end = caption.end.min(segment.end);
            if end <= start {
                continue;
            }
            if let Ok(piece) = Caption::new(start - segment.start + offset, end - segment.start + offset, caption.text.clone()) {
                rebased.push(piece);
            }
        }
        offset += segment.duration() - overlap;
    }
    rebased
}
