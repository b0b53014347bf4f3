use std::fmt;
use std::str::FromStr;

use crate::error::{ComposeError, Result};

const SHORT_WIDTH: u32 = 1080;
const SHORT_HEIGHT: u32 = 1920;

/// Target canvas size. Both axes are even and at least 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width < 2 || height < 2 || width % 2 != 0 || height % 2 != 0 {
            return Err(ComposeError::Validation(format!(
                "dimensions must be even and >= 2, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A parsed "W:H" ratio together with the canvas it resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
    canvas: Dimensions,
}

impl AspectRatio {
    pub fn canvas(&self) -> Dimensions {
        self.canvas
    }
}

impl FromStr for AspectRatio {
    type Err = ComposeError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || ComposeError::InvalidRatio(raw.to_string());
        let (w_raw, h_raw) = raw.split_once(':').ok_or_else(invalid)?;
        if h_raw.contains(':') {
            return Err(invalid());
        }
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(w_raw) || !digits(h_raw) {
            return Err(invalid());
        }
        let ratio_w: u32 = w_raw.parse().map_err(|_| invalid())?;
        let ratio_h: u32 = h_raw.parse().map_err(|_| invalid())?;
        if ratio_w == 0 || ratio_h == 0 {
            return Err(invalid());
        }

        let (rw, rh) = (u64::from(ratio_w), u64::from(ratio_h));
        // Landscape and square ratios pin the width, portrait ratios pin the height.
        let (w, h) = if rw >= rh {
            (u64::from(SHORT_WIDTH), u64::from(SHORT_WIDTH) * rh / rw)
        } else {
            (u64::from(SHORT_HEIGHT) * rw / rh, u64::from(SHORT_HEIGHT))
        };
        let (w, h) = (w - w % 2, h - h % 2);
        let width = u32::try_from(w).map_err(|_| invalid())?;
        let height = u32::try_from(h).map_err(|_| invalid())?;
        let canvas = Dimensions::new(width, height).map_err(|_| invalid())?;

        Ok(Self {
            width: ratio_w,
            height: ratio_h,
            canvas,
        })
    }
}

/// Requested output framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Keep the source framing.
    #[default]
    Original,
    /// Vertical 9:16, 1080x1920.
    Short,
    /// 1080x1080.
    Square,
    Custom(AspectRatio),
}

impl OutputFormat {
    /// Resolve a format tag and its optional companion ratio string.
    pub fn from_tag(tag: &str, ratio: Option<&str>) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(Self::Original),
            "short" => Ok(Self::Short),
            "square" => Ok(Self::Square),
            "custom" => {
                let ratio = ratio
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .ok_or(ComposeError::MissingRatio)?;
                Ok(Self::Custom(ratio.parse()?))
            }
            other => Err(ComposeError::Validation(format!(
                "unknown output format '{other}', expected original, short, square or custom"
            ))),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Short => "short",
            Self::Square => "square",
            Self::Custom(_) => "custom",
        }
    }

    /// Target canvas, or `None` when the source framing is kept.
    pub fn dimensions(&self) -> Option<Dimensions> {
        match self {
            Self::Original => None,
            Self::Short => Some(Dimensions {
                width: SHORT_WIDTH,
                height: SHORT_HEIGHT,
            }),
            Self::Square => Some(Dimensions {
                width: SHORT_WIDTH,
                height: SHORT_WIDTH,
            }),
            Self::Custom(ratio) => Some(ratio.canvas()),
        }
    }
}
