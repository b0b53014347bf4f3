//! Caption styling: colors, anchoring and the per-call resolved style.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ComposeError, Result};

/// An sRGB color with opacity, accepted in ffmpeg's notation
/// (`white`, `black@0.6`, `#FFE2A5@0.86`, `0xFFE2A5`).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: f32,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, alpha: 1.0 }
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }

    /// Color string understood by ffmpeg filters.
    pub fn to_ffmpeg(&self) -> String {
        let hex = format!("0x{:02X}{:02X}{:02X}", self.r, self.g, self.b);
        if self.alpha >= 1.0 {
            hex
        } else {
            format!("{hex}@{:.2}", self.alpha)
        }
    }

    /// Straight (non-premultiplied) RGBA bytes for raster drawing.
    pub fn to_rgba(&self) -> [u8; 4] {
        let a = (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        [self.r, self.g, self.b, a]
    }

    fn named(name: &str) -> Option<Self> {
        let color = match name {
            "white" => Self::rgb(255, 255, 255),
            "black" => Self::rgb(0, 0, 0),
            "red" => Self::rgb(255, 0, 0),
            "green" => Self::rgb(0, 128, 0),
            "blue" => Self::rgb(0, 0, 255),
            "yellow" => Self::rgb(255, 255, 0),
            "gold" => Self::rgb(255, 215, 0),
            "orange" => Self::rgb(255, 165, 0),
            "cyan" => Self::rgb(0, 255, 255),
            "magenta" => Self::rgb(255, 0, 255),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            _ => return None,
        };
        Some(color)
    }
}

impl FromStr for Color {
    type Err = ComposeError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || ComposeError::Validation(format!("invalid color '{raw}'"));
        let value = raw.trim();
        let (base, alpha) = match value.split_once('@') {
            Some((base, alpha)) => {
                let alpha: f32 = alpha.trim().parse().map_err(|_| invalid())?;
                if !(0.0..=1.0).contains(&alpha) {
                    return Err(invalid());
                }
                (base.trim(), alpha)
            }
            None => (value, 1.0),
        };

        let hex = base
            .strip_prefix('#')
            .or_else(|| base.strip_prefix("0x"))
            .or_else(|| base.strip_prefix("0X"));
        let color = match hex {
            Some(hex) if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
                let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
                Self::rgb(channel(0)?, channel(2)?, channel(4)?)
            }
            Some(_) => return Err(invalid()),
            None => Self::named(&base.to_ascii_lowercase()).ok_or_else(invalid)?,
        };
        Ok(color.with_alpha(alpha))
    }
}

impl TryFrom<String> for Color {
    type Error = ComposeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ffmpeg())
    }
}

/// Vertical anchor of the first caption line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Top,
    Center,
    #[default]
    Bottom,
}

impl Position {
    /// Fraction of the canvas height where the first line starts.
    pub fn anchor_fraction(self) -> f32 {
        match self {
            Self::Top => 0.08,
            Self::Center => 0.45,
            Self::Bottom => 0.75,
        }
    }

    pub fn anchor_y(self, canvas_height: u32) -> i32 {
        (canvas_height as f32 * self.anchor_fraction()).round() as i32
    }
}

impl FromStr for Position {
    type Err = ComposeError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "center" => Ok(Self::Center),
            "bottom" => Ok(Self::Bottom),
            other => Err(ComposeError::Validation(format!(
                "invalid caption position '{other}', expected top, center or bottom"
            ))),
        }
    }
}

/// Caller-supplied style overrides. Every field is optional and unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub font_size: Option<u32>,
    pub font_color: Option<Color>,
    pub highlight_color: Option<Color>,
    pub bg_color: Option<Color>,
    pub position: Option<Position>,
    pub karaoke: Option<bool>,
}

impl StyleConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ComposeError::Validation(format!("invalid style: {e}")))
    }

    /// Fill in defaults for a canvas of the given height.
    pub fn resolve(&self, canvas_height: u32) -> Style {
        Style {
            font_size: self
                .font_size
                .filter(|size| *size > 0)
                .unwrap_or_else(|| default_font_size(canvas_height)),
            font_color: self.font_color.unwrap_or(Color::rgb(255, 255, 255)),
            highlight_color: self
                .highlight_color
                .unwrap_or(Color::rgb(0xFF, 0xE2, 0xA5).with_alpha(0.86)),
            bg_color: self.bg_color.unwrap_or(Color::rgb(0, 0, 0).with_alpha(0.6)),
            position: self.position.unwrap_or_default(),
            karaoke: self.karaoke.unwrap_or(true),
        }
    }
}

/// Font size derived from the canvas height when the caller gives none.
pub fn default_font_size(canvas_height: u32) -> u32 {
    (canvas_height / 35).max(16)
}

/// Fully resolved style, fixed for the duration of one render call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub font_size: u32,
    pub font_color: Color,
    pub highlight_color: Color,
    pub bg_color: Color,
    pub position: Position,
    pub karaoke: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parsing() {
        assert_eq!("white".parse::<Color>().unwrap(), Color::rgb(255, 255, 255));
        let c: Color = "#FFE2A5@0.86".parse().unwrap();
        assert_eq!((c.r, c.g, c.b), (0xFF, 0xE2, 0xA5));
        assert!((c.alpha - 0.86).abs() < f32::EPSILON);
        assert_eq!("0x102030".parse::<Color>().unwrap(), Color::rgb(0x10, 0x20, 0x30));
        assert_eq!("black@0.6".parse::<Color>().unwrap().to_ffmpeg(), "0x000000@0.60");
        assert_eq!("white".parse::<Color>().unwrap().to_ffmpeg(), "0xFFFFFF");
    }

    #[test]
    fn test_color_rejects_garbage() {
        for bad in ["", "#12345", "#GGGGGG", "chartreuse-ish", "white@2", "white@x"] {
            assert!(bad.parse::<Color>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_color_rgba() {
        let c = Color::rgb(1, 2, 3).with_alpha(0.6);
        assert_eq!(c.to_rgba(), [1, 2, 3, 153]);
    }

    #[test]
    fn test_style_defaults() {
        let style = StyleConfig::default().resolve(1920);
        assert_eq!(style.font_size, 54);
        assert_eq!(style.position, Position::Bottom);
        assert!(style.karaoke);
        assert_eq!(style.font_color, Color::rgb(255, 255, 255));

        // small canvases never go below 16px
        assert_eq!(StyleConfig::default().resolve(240).font_size, 16);
    }

    #[test]
    fn test_style_json_ignores_unknown_keys() {
        let cfg = StyleConfig::from_json(
            r#"{"font_size": 40, "position": "top", "karaoke": false, "shadow": true}"#,
        )
        .unwrap();
        let style = cfg.resolve(1080);
        assert_eq!(style.font_size, 40);
        assert_eq!(style.position, Position::Top);
        assert!(!style.karaoke);
    }

    #[test]
    fn test_style_json_rejects_bad_color() {
        assert!(StyleConfig::from_json(r#"{"font_color": "not-a-color"}"#).is_err());
    }

    #[test]
    fn test_anchor_y() {
        assert_eq!(Position::Bottom.anchor_y(1920), 1440);
        assert_eq!(Position::Top.anchor_y(1000), 80);
        assert_eq!(Position::Center.anchor_y(1000), 450);
    }
}
