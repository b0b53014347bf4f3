use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use clip_captioner::caption::{load_captions, parse_segments, write_srt};
use clip_captioner::{
    AssemblyOptions, BurnRequest, CaptionOptions, CaptionSource, ClipRequest, ClipService, Config, OutputFormat,
    RendererKind, StyleConfig, SupercutRequest,
};

#[derive(Parser, Debug)]
#[command(name = "clip-captioner", version, about = "Cut, reframe and caption video clips with ffmpeg")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print duration and stream details of a media file as JSON
    Metadata {
        /// Input media file
        input: PathBuf,
    },
    /// Transcribe the audio of a media file with timestamps
    Transcribe {
        /// Input media file
        input: PathBuf,

        /// Also write the transcript as SRT subtitles
        #[arg(long)]
        srt: Option<PathBuf>,

        /// Print captions as JSON instead of "[start - end] text" lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Extract one time range, optionally reframed and captioned
    Clip {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Start time in seconds
        #[arg(long)]
        start: f64,

        /// End time in seconds
        #[arg(long)]
        end: f64,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Join several ranges of one video, in the order given
    Supercut {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Segments as JSON `[[start, end], ...]`, inline or a file path
        #[arg(long)]
        segments: String,

        /// Cross-dissolve this many seconds between segments instead of hard cuts
        #[arg(long)]
        crossfade: Option<f64>,

        /// Fade in from and out to black for this many seconds
        #[arg(long)]
        fade: Option<f64>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Burn captions over a whole video, keeping its framing
    Burn {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Captions JSON file: `[{"start": 0.0, "end": 1.5, "text": "..."}]`
        #[arg(long)]
        captions: PathBuf,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output framing: original, short (9:16), square or custom
    #[arg(long, default_value = "original")]
    format: String,

    /// Aspect ratio "W:H" for --format custom
    #[arg(long)]
    ratio: Option<String>,

    /// Captions JSON file, timed against the produced clip
    #[arg(long, conflicts_with = "auto_captions")]
    captions: Option<PathBuf>,

    /// Transcribe the source and caption the clip with the result
    #[arg(long, default_value_t = false)]
    auto_captions: bool,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Caption style as JSON, inline or a file path
    #[arg(long)]
    style: Option<String>,

    /// Caption renderer: filter-graph or frame-burn
    #[arg(long, default_value = "filter-graph")]
    renderer: String,
}

impl RenderArgs {
    fn style(&self) -> Result<StyleConfig> {
        match &self.style {
            Some(raw) => Ok(StyleConfig::from_json(&inline_or_file(raw)?)?),
            None => Ok(StyleConfig::default()),
        }
    }

    fn renderer(&self) -> Result<RendererKind> {
        Ok(self.renderer.parse()?)
    }
}

impl OutputArgs {
    fn format(&self) -> Result<OutputFormat> {
        Ok(OutputFormat::from_tag(&self.format, self.ratio.as_deref())?)
    }

    fn captions(&self) -> Result<CaptionOptions> {
        let source = match (&self.captions, self.auto_captions) {
            (Some(path), _) => CaptionSource::Provided(load_captions(path)?),
            (None, true) => CaptionSource::Transcribe,
            (None, false) => CaptionSource::None,
        };
        Ok(CaptionOptions {
            source,
            style: self.render.style()?,
            renderer: self.render.renderer()?,
        })
    }
}

/// JSON given directly on the command line, or the contents of the file it names.
fn inline_or_file(raw: &str) -> Result<String> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(raw.to_string());
    }
    fs::read_to_string(raw).with_context(|| format!("Read JSON from {raw}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn spinner(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        progress.set_style(style.tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "));
    }
    progress.enable_steady_tick(std::time::Duration::from_millis(100));
    progress
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let service = ClipService::new(Config::from_env()).with_progress(true);

    match cli.command {
        Commands::Metadata { input } => {
            let info = service.metadata(&input)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Transcribe { input, srt, json } => {
            let progress = spinner(true);
            progress.set_message("Transcribing audio (OpenAI Whisper)...");
            let captions = service.transcribe(&input).await;
            progress.finish_and_clear();
            let captions = captions.with_context(|| format!("Transcribe {}", input.display()))?;

            if let Some(path) = &srt {
                write_srt(path, &captions).with_context(|| format!("Write SRT to {}", path.display()))?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&captions)?);
            } else {
                for caption in &captions {
                    println!("[{:.2} - {:.2}] {}", caption.start, caption.end, caption.text);
                }
            }
        }
        Commands::Clip {
            input,
            start,
            end,
            output,
        } => {
            let request = ClipRequest {
                source: input,
                start,
                end,
                format: output.format()?,
                captions: output.captions()?,
            };
            let progress = spinner(request.captions.renderer != RendererKind::FrameBurn);
            progress.set_message("Extracting clip with ffmpeg...");
            let result = service.extract_clip(&request).await;
            report(&progress, result)?;
        }
        Commands::Supercut {
            input,
            segments,
            crossfade,
            fade,
            output,
        } => {
            let request = SupercutRequest {
                source: input,
                segments: parse_segments(&inline_or_file(&segments)?)?,
                assembly: AssemblyOptions { crossfade, fade },
                format: output.format()?,
                captions: output.captions()?,
            };
            let progress = spinner(request.captions.renderer != RendererKind::FrameBurn);
            progress.set_message("Assembling supercut with ffmpeg...");
            let result = service.create_supercut(&request).await;
            report(&progress, result)?;
        }
        Commands::Burn { input, captions, render } => {
            let request = BurnRequest {
                source: input,
                captions: load_captions(&captions)?,
                style: render.style()?,
                renderer: render.renderer()?,
            };
            let progress = spinner(request.renderer != RendererKind::FrameBurn);
            progress.set_message("Burning captions...");
            let result = service.burn_captions(&request).await;
            report(&progress, result)?;
        }
    }
    Ok(())
}

fn report(progress: &ProgressBar, result: clip_captioner::Result<PathBuf>) -> Result<()> {
    match result {
        Ok(path) => {
            progress.finish_and_clear();
            println!("{}", path.display());
            Ok(())
        }
        Err(e) => {
            progress.finish_and_clear();
            Err(e.into())
        }
    }
}
