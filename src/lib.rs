//! Clip extraction, reframing and caption burn-in on top of ffmpeg.
//!
//! Captions are laid out once into a [`RenderPlan`] and drawn by one of two
//! backends: ffmpeg drawtext filters or per-frame rasterization.

pub mod assemble;
pub mod caption;
pub mod compositor;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod format;
pub mod graph;
pub mod karaoke;
pub mod layout;
pub mod plan;
pub mod render;
pub mod service;
pub mod style;
pub mod timeline;
pub mod transcribe;

pub use assemble::AssemblyOptions;
pub use caption::{Caption, Segment};
pub use config::Config;
pub use error::{ComposeError, Result};
pub use ffmpeg::{Ffmpeg, MediaInfo, MediaProbe};
pub use format::{AspectRatio, Dimensions, OutputFormat};
pub use plan::RenderPlan;
pub use render::{CaptionRenderer, RendererKind};
pub use service::{BurnRequest, CaptionOptions, CaptionSource, ClipRequest, ClipService, SupercutRequest};
pub use style::{Color, Position, StyleConfig};
pub use timeline::Timeline;
pub use transcribe::Transcriber;
