//! Per-word timing for karaoke highlighting.
//!
//! Speech timing inside a caption is unknown, so its duration is split evenly
//! across the words, assuming a constant speaking rate.

use crate::caption::Caption;
use crate::layout::{LayoutLine, TextMeasure};

#[derive(Debug, Clone, PartialEq)]
pub struct WordWindow {
    pub word: String,
    pub active_start: f64,
    pub active_end: f64,
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

impl WordWindow {
    pub fn duration(&self) -> f64 {
        self.active_end - self.active_start
    }
}

/// Word `i` of `n` is active during `[start + i/n * d, start + (i+1)/n * d)`.
///
/// Windows are contiguous and the last one ends exactly at `caption.end`. Returns
/// nothing when the caption has no words or no duration.
pub fn word_windows<M: TextMeasure>(caption: &Caption, lines: &[LayoutLine], measure: &M) -> Vec<WordWindow> {
    let total: usize = lines.iter().map(|l| l.words.len()).sum();
    let duration = caption.duration();
    if total == 0 || duration <= 0.0 {
        return Vec::new();
    }

    let boundary = |k: usize| {
        if k == total {
            caption.end
        } else {
            caption.start + duration * k as f64 / total as f64
        }
    };

    let mut windows = Vec::with_capacity(total);
    let mut index = 0;
    for line in lines {
        let mut cursor = line.x;
        for word in &line.words {
            let width = measure.word_width(word);
            windows.push(WordWindow {
                word: word.clone(),
                active_start: boundary(index),
                active_end: boundary(index + 1),
                x: cursor,
                y: line.y,
                width,
            });
            cursor += width + measure.space_width();
            index += 1;
        }
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{layout_text, Canvas, HeuristicMeasure};
    use crate::style::StyleConfig;

    fn windows_for(caption: &Caption, canvas: Canvas) -> Vec<WordWindow> {
        let style = StyleConfig::default().resolve(canvas.height);
        let measure = HeuristicMeasure::new(style.font_size);
        let lines = layout_text(&caption.text, canvas, &style, &measure);
        word_windows(caption, &lines, &measure)
    }

    #[test]
    fn test_windows_partition_caption_span() {
        let caption = Caption::new(0.5, 2.5, "Testing single clip caption").unwrap();
        let windows = windows_for(&caption, Canvas::new(1080, 1920));
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0].active_start, 0.5);
        assert_eq!(windows[3].active_end, 2.5);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].active_end, pair[1].active_start);
        }
        let total: f64 = windows.iter().map(WordWindow::duration).sum();
        assert!((total - 2.0).abs() < 1e-9);
        assert!((windows[1].active_start - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_windows_advance_left_to_right() {
        let caption = Caption::new(0.0, 3.0, "one two three").unwrap();
        let windows = windows_for(&caption, Canvas::new(1080, 1920));
        let measure = HeuristicMeasure::new(54);
        assert!((windows[1].x - (windows[0].x + windows[0].width + measure.space_width())).abs() < 1e-3);
        assert!(windows[2].x > windows[1].x);
    }

    #[test]
    fn test_windows_follow_wrapped_lines() {
        let caption = Caption::new(0.0, 10.0, "alpha beta gamma delta epsilon zeta eta theta").unwrap();
        let windows = windows_for(&caption, Canvas::new(300, 1920));
        assert_eq!(windows.len(), 8);
        let first_y = windows[0].y;
        assert!(windows.iter().any(|w| w.y > first_y));
    }

    #[test]
    fn test_no_windows_without_words() {
        let caption = Caption {
            start: 0.0,
            end: 1.0,
            text: "   ".to_string(),
        };
        assert!(windows_for(&caption, Canvas::new(1080, 1920)).is_empty());
    }

    #[test]
    fn test_no_windows_without_duration() {
        let caption = Caption {
            start: 2.0,
            end: 2.0,
            text: "frozen".to_string(),
        };
        let measure = HeuristicMeasure::new(30);
        let line = LayoutLine {
            words: vec!["frozen".to_string()],
            x: 10.0,
            y: 10.0,
            width: 99.0,
        };
        assert!(word_windows(&caption, &[line], &measure).is_empty());
    }
}
