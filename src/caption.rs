//! Caption and segment inputs, their validation, and SRT export.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ComposeError, Result};

/// A timed span of text, in seconds relative to the clip it is drawn on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Caption {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Result<Self> {
        let caption = Self {
            start,
            end,
            text: text.into(),
        };
        caption.validate(0)?;
        Ok(caption)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// Closed interval: a caption is visible on both its first and last instant.
    pub fn is_active_at(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    fn validate(&self, index: usize) -> Result<()> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(ComposeError::Validation(format!(
                "caption {index}: timestamps must be finite"
            )));
        }
        if self.start < 0.0 {
            return Err(ComposeError::Validation(format!(
                "caption {index}: start {} is negative",
                self.start
            )));
        }
        if self.end <= self.start {
            return Err(ComposeError::Validation(format!(
                "caption {index}: end {} must be after start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }
}

pub fn validate_captions(captions: &[Caption]) -> Result<()> {
    captions
        .iter()
        .enumerate()
        .try_for_each(|(i, caption)| caption.validate(i))
}

pub fn parse_captions(raw: &str) -> Result<Vec<Caption>> {
    let captions: Vec<Caption> = serde_json::from_str(raw)
        .map_err(|e| ComposeError::Validation(format!("invalid caption list: {e}")))?;
    validate_captions(&captions)?;
    Ok(captions)
}

pub fn load_captions(path: &Path) -> Result<Vec<Caption>> {
    if !path.exists() {
        return Err(ComposeError::SourceNotFound(path.to_path_buf()));
    }
    parse_captions(&std::fs::read_to_string(path)?)
}

/// A source time range, given on the wire as a `[start, end]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Segment {
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl From<(f64, f64)> for Segment {
    fn from((start, end): (f64, f64)) -> Self {
        Self { start, end }
    }
}

impl From<Segment> for (f64, f64) {
    fn from(segment: Segment) -> Self {
        (segment.start, segment.end)
    }
}

pub fn validate_segments(segments: &[Segment]) -> Result<()> {
    if segments.is_empty() {
        return Err(ComposeError::Validation("segment list is empty".to_string()));
    }
    for (i, segment) in segments.iter().enumerate() {
        if !segment.start.is_finite() || !segment.end.is_finite() || segment.start < 0.0 {
            return Err(ComposeError::Validation(format!(
                "segment {i}: [{}, {}] is not a valid time range",
                segment.start, segment.end
            )));
        }
        if segment.start >= segment.end {
            return Err(ComposeError::Validation(format!(
                "segment {i}: start {} must be before end {}",
                segment.start, segment.end
            )));
        }
    }
    Ok(())
}

pub fn parse_segments(raw: &str) -> Result<Vec<Segment>> {
    let segments: Vec<Segment> = serde_json::from_str(raw)
        .map_err(|e| ComposeError::Validation(format!("invalid segment list: {e}")))?;
    validate_segments(&segments)?;
    Ok(segments)
}

pub fn to_srt(captions: &[Caption]) -> String {
    let mut out = String::new();
    for (i, caption) in captions.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}\n{} --> {}\n{}\n",
            i + 1,
            format_srt_time(caption.start),
            format_srt_time(caption.end),
            caption.text.trim()
        );
    }
    out
}

pub fn write_srt(path: &Path, captions: &[Caption]) -> Result<()> {
    std::fs::write(path, to_srt(captions))?;
    Ok(())
}

fn format_srt_time(seconds: f64) -> String {
    // HH:MM:SS,mmm
    let total_ms = (seconds * 1000.0).round() as i64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let s = total_secs % 60;
    let total_mins = total_secs / 60;
    let m = total_mins % 60;
    let h = total_mins / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption_validation() {
        assert!(Caption::new(0.5, 2.5, "hello").is_ok());
        assert!(Caption::new(2.0, 2.0, "zero length").is_err());
        assert!(Caption::new(-1.0, 2.0, "negative").is_err());
        assert!(Caption::new(0.0, f64::NAN, "nan").is_err());
    }

    #[test]
    fn test_caption_active_interval_is_closed() {
        let c = Caption::new(1.0, 2.0, "x").unwrap();
        assert!(c.is_active_at(1.0));
        assert!(c.is_active_at(2.0));
        assert!(!c.is_active_at(0.999));
        assert!(!c.is_active_at(2.001));
    }

    #[test]
    fn test_parse_captions_json() {
        let captions =
            parse_captions(r#"[{"start": 0, "end": 1.5, "text": "Hi there"}, {"start": 1, "end": 3, "text": "  "}]"#)
                .unwrap();
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[0].words(), vec!["Hi", "there"]);
        assert!(captions[1].words().is_empty());
    }

    #[test]
    fn test_parse_captions_rejects_inverted_times() {
        let err = parse_captions(r#"[{"start": 3, "end": 1, "text": "backwards"}]"#).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_parse_segments_pairs() {
        let segments = parse_segments("[[10, 12.5], [2, 4]]").unwrap();
        assert_eq!(segments, vec![Segment::new(10.0, 12.5), Segment::new(2.0, 4.0)]);
        assert!((segments[0].duration() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_segment_validation() {
        assert!(parse_segments("[]").is_err());
        assert!(parse_segments("[[5, 5]]").is_err());
        assert!(parse_segments("[[-1, 5]]").is_err());
        assert!(parse_segments("[[1, 2, 3]]").is_err());
    }

    #[test]
    fn test_srt_output() {
        let captions = vec![
            Caption::new(0.5, 2.25, "First line").unwrap(),
            Caption::new(3661.0, 3662.0, "Later").unwrap(),
        ];
        let srt = to_srt(&captions);
        assert!(srt.starts_with("1\n00:00:00,500 --> 00:00:02,250\nFirst line\n"));
        assert!(srt.contains("2\n01:01:01,000 --> 01:01:02,000\nLater\n"));
    }
}
