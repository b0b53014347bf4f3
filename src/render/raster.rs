//! Software drawing onto RGBA frames.

use std::collections::HashMap;

use fontdue::layout::{CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle, VerticalAlign, WrapStyle};
use fontdue::Font;

use crate::layout::TextMeasure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A mutable view of one packed RGBA frame.
pub(super) struct Frame<'a> {
    pub data: &'a mut [u8],
    pub width: u32,
    pub height: u32,
}

struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

/// Measures and draws single lines of text at one size, caching rasterized glyphs.
pub(super) struct TextPainter<'f> {
    font: &'f Font,
    font_size: f32,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl<'f> TextPainter<'f> {
    pub fn new(font: &'f Font, font_size: f32) -> Self {
        Self {
            font,
            font_size,
            glyph_cache: HashMap::new(),
        }
    }

    fn advance(&self, text: &str) -> f32 {
        text.chars()
            .map(|c| self.font.metrics(c, self.font_size).advance_width)
            .sum()
    }

    /// Draw `text` with its top-left corner at (`x`, `y`).
    pub fn draw_line(&mut self, frame: &mut Frame<'_>, x: i32, y: i32, text: &str, color: [u8; 4]) {
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: x as f32,
            y: y as f32,
            max_width: None,
            max_height: None,
            horizontal_align: HorizontalAlign::Left,
            vertical_align: VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: WrapStyle::Letter,
            wrap_hard_breaks: false,
        });
        layout.append(&[self.font], &TextStyle::new(text, self.font_size, 0));

        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let font = self.font;
            let bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });
            blend_glyph(frame, glyph.x.round() as i32, glyph.y.round() as i32, bitmap, color);
        }
    }
}

impl TextMeasure for TextPainter<'_> {
    fn word_width(&self, word: &str) -> f32 {
        self.advance(word)
    }

    fn space_width(&self) -> f32 {
        self.advance(" ")
    }
}

pub(super) fn fill_rounded_rect(frame: &mut Frame<'_>, rect: Rect, radius: u32, color: [u8; 4]) {
    let x0 = rect.x.min(frame.width);
    let y0 = rect.y.min(frame.height);
    let x1 = rect.x.saturating_add(rect.w).min(frame.width);
    let y1 = rect.y.saturating_add(rect.h).min(frame.height);
    let radius = radius.min(rect.w / 2).min(rect.h / 2);

    for yy in y0..y1 {
        let row_start = yy as usize * frame.width as usize * 4;
        for xx in x0..x1 {
            if rounded_rect_contains(xx, yy, rect, radius) {
                blend_pixel(frame.data, row_start + xx as usize * 4, color);
            }
        }
    }
}

fn rounded_rect_contains(x: u32, y: u32, rect: Rect, radius: u32) -> bool {
    if rect.w == 0 || rect.h == 0 {
        return false;
    }
    let left = rect.x;
    let right = rect.x + rect.w - 1;
    let top = rect.y;
    let bottom = rect.y + rect.h - 1;
    if x < left || x > right || y < top || y > bottom {
        return false;
    }
    if radius == 0 {
        return true;
    }

    // inside the cross formed by the two straight bands
    if (x >= left + radius && x <= right - radius) || (y >= top + radius && y <= bottom - radius) {
        return true;
    }

    let cx = if x < left + radius { left + radius } else { right - radius };
    let cy = if y < top + radius { top + radius } else { bottom - radius };
    let dx = i64::from(x) - i64::from(cx);
    let dy = i64::from(y) - i64::from(cy);
    dx * dx + dy * dy <= i64::from(radius) * i64::from(radius)
}

fn blend_glyph(frame: &mut Frame<'_>, x: i32, y: i32, glyph: &GlyphBitmap, color: [u8; 4]) {
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= frame.height as i32 {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= frame.width as i32 {
                continue;
            }
            let mask = glyph.bitmap[row * glyph.width + col];
            if mask == 0 {
                continue;
            }
            let alpha = ((u16::from(mask) * u16::from(color[3])) / 255) as u8;
            let idx = (py as usize * frame.width as usize + px as usize) * 4;
            blend_pixel(frame.data, idx, [color[0], color[1], color[2], alpha]);
        }
    }
}

/// Source-over blend of a straight-alpha color onto an opaque pixel.
fn blend_pixel(data: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }
    let inv_alpha = 255 - alpha;
    for channel in 0..3 {
        let dst = u16::from(data[idx + channel]);
        let src_c = u16::from(src[channel]);
        data[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    data[idx + 3] = 255;
}
