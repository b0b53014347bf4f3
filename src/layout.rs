//! Heuristic caption layout.
//!
//! Widths are estimated from an average character width instead of real glyph
//! metrics. The estimate drives line wrapping and the karaoke highlight boxes;
//! renderers that can measure text exactly are free to re-center each line.

use crate::style::Style;

/// Horizontal space kept free across both sides of the canvas.
pub const HORIZONTAL_MARGIN: f32 = 60.0;
pub const CHAR_WIDTH_FACTOR: f32 = 0.55;
pub const SPACE_WIDTH_FACTOR: f32 = 0.28;
pub const LINE_HEIGHT_FACTOR: f32 = 1.6;
/// Padding around the backdrop box; also the minimum left edge of a line.
pub const BOX_PADDING: i32 = 10;

/// Pixel size of the frame captions are laid out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn max_line_width(&self) -> f32 {
        (self.width as f32 - HORIZONTAL_MARGIN).max(0.0)
    }
}

/// Measures words for layout.
pub trait TextMeasure {
    fn word_width(&self, word: &str) -> f32;
    fn space_width(&self) -> f32;

    fn line_width(&self, words: &[String]) -> f32 {
        let words_w: f32 = words.iter().map(|w| self.word_width(w)).sum();
        words_w + words.len().saturating_sub(1) as f32 * self.space_width()
    }
}

/// Average-character-width estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicMeasure {
    pub char_width: f32,
    pub space_width: f32,
}

impl HeuristicMeasure {
    pub fn new(font_size: u32) -> Self {
        let size = font_size as f32;
        Self {
            char_width: size * CHAR_WIDTH_FACTOR,
            space_width: size * SPACE_WIDTH_FACTOR,
        }
    }
}

impl TextMeasure for HeuristicMeasure {
    fn word_width(&self, word: &str) -> f32 {
        word.chars().count() as f32 * self.char_width
    }

    fn space_width(&self) -> f32 {
        self.space_width
    }
}

/// One wrapped caption line, positioned on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutLine {
    pub words: Vec<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
}

impl LayoutLine {
    pub fn text(&self) -> String {
        self.words.join(" ")
    }
}

pub fn line_height(font_size: u32) -> i32 {
    (font_size as f32 * LINE_HEIGHT_FACTOR) as i32
}

/// Greedy line fill. A word that alone exceeds `max_width` still gets its own line.
pub fn wrap_words<M: TextMeasure>(words: &[&str], measure: &M, max_width: f32) -> Vec<Vec<String>> {
    let mut lines = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_w = 0.0_f32;

    for word in words {
        let word_w = measure.word_width(word);
        let needed = if current.is_empty() {
            word_w
        } else {
            word_w + measure.space_width()
        };
        if current_w + needed > max_width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push((*word).to_string());
            current_w = word_w;
        } else {
            current.push((*word).to_string());
            current_w += needed;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wrap `text` and place each line: horizontally centered (never left of the box
/// padding), stacked downwards from the style's anchor.
pub fn layout_text<M: TextMeasure>(text: &str, canvas: Canvas, style: &Style, measure: &M) -> Vec<LayoutLine> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let anchor_y = style.position.anchor_y(canvas.height);
    let step = line_height(style.font_size);

    wrap_words(&words, measure, canvas.max_line_width())
        .into_iter()
        .enumerate()
        .map(|(i, words)| {
            let width = measure.line_width(&words);
            let x = ((canvas.width as f32 - width) / 2.0).floor().max(BOX_PADDING as f32);
            LayoutLine {
                words,
                x,
                y: (anchor_y + i as i32 * step) as f32,
                width,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Position, StyleConfig};

    fn style(height: u32) -> Style {
        StyleConfig::default().resolve(height)
    }

    #[test]
    fn test_heuristic_widths() {
        let m = HeuristicMeasure::new(20);
        assert!((m.word_width("hello") - 55.0).abs() < 1e-3);
        assert!((m.space_width() - 5.6).abs() < 1e-3);
        let words = vec!["ab".to_string(), "cd".to_string()];
        assert!((m.line_width(&words) - (22.0 + 22.0 + 5.6)).abs() < 1e-3);
    }

    #[test]
    fn test_wrap_keeps_short_text_on_one_line() {
        let m = HeuristicMeasure::new(54);
        let lines = wrap_words(&["Testing", "single", "clip", "caption"], &m, 1020.0);
        assert_eq!(lines, vec![vec!["Testing", "single", "clip", "caption"]]);
    }

    #[test]
    fn test_wrap_never_exceeds_limit_with_multiple_words() {
        let m = HeuristicMeasure::new(54);
        let text = "the quick brown fox jumps over the lazy dog while everyone watches the \
                    incredibly long sentence continue well past the edge of a vertical frame";
        let words: Vec<&str> = text.split_whitespace().collect();
        for max in [300.0, 500.0, 1020.0] {
            for line in wrap_words(&words, &m, max) {
                assert!(line.len() == 1 || m.line_width(&line) <= max, "{line:?} at {max}");
            }
        }
    }

    #[test]
    fn test_overlong_word_gets_its_own_line() {
        let m = HeuristicMeasure::new(54);
        let long = "x".repeat(60);
        let lines = wrap_words(&["a", &long, "b"], &m, 1020.0);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], vec![long]);
    }

    #[test]
    fn test_layout_positions() {
        let canvas = Canvas::new(1080, 1920);
        let style = style(1920);
        let lines = layout_text("Testing single clip caption", canvas, &style, &HeuristicMeasure::new(style.font_size));
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.width <= 1020.0);
        assert_eq!(line.y, 1440.0);
        assert!((line.x - ((1080.0 - line.width) / 2.0).floor()).abs() < 1e-3);
    }

    #[test]
    fn test_layout_stacks_lines_by_line_height() {
        let canvas = Canvas::new(400, 1000);
        let mut style = style(1000);
        style.position = Position::Top;
        let lines = layout_text(
            "one two three four five six seven eight nine ten",
            canvas,
            &style,
            &HeuristicMeasure::new(style.font_size),
        );
        assert!(lines.len() > 1);
        let step = line_height(style.font_size) as f32;
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(line.y, 80.0 + i as f32 * step);
            assert!(line.x >= BOX_PADDING as f32);
        }
    }

    #[test]
    fn test_empty_text_has_no_lines() {
        let style = style(1080);
        let lines = layout_text("   \n\t ", Canvas::new(1920, 1080), &style, &HeuristicMeasure::new(30));
        assert!(lines.is_empty());
    }
}
