//! The external media engine boundary: ffprobe, one-shot ffmpeg runs and raw
//! RGBA frame pipes.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Config, EncodeSettings};
use crate::error::{ComposeError, Result};
use crate::timeline::Timeline;

/// What the pipeline needs to know about a media file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration: f64,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub frame_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioInfo {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

impl MediaInfo {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Looks up duration and stream layout of a media file.
pub trait MediaProbe {
    fn probe(&self, path: &Path) -> Result<MediaInfo>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display rotation in degrees, from the display matrix or the legacy `rotate` tag.
    fn rotation(&self) -> i64 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| self.tags.get("rotate").and_then(|r| r.trim().parse().ok()))
            .map(|deg| deg.round() as i64)
            .unwrap_or(0)
    }

    /// Frame size as decoded; ffmpeg autorotates quarter-turned streams.
    fn display_size(&self) -> (u32, u32) {
        let (w, h) = (self.width.unwrap_or(0), self.height.unwrap_or(0));
        if self.rotation().rem_euclid(180) == 90 {
            (h, w)
        } else {
            (w, h)
        }
    }
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(json: &str) -> Result<MediaInfo> {
    let output: ProbeOutput = serde_json::from_str(json).map_err(|e| ComposeError::ExternalTool {
        tool: "ffprobe".to_string(),
        status: "unparseable output".to_string(),
        stderr: e.to_string(),
    })?;

    let duration = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| {
            let fps = s
                .avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
                .unwrap_or(30.0);
            let (width, height) = s.display_size();
            VideoInfo {
                width,
                height,
                fps,
                codec: s.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
                frame_count: s.nb_frames.as_deref().and_then(|n| n.parse().ok()),
            }
        });

    let audio = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioInfo {
            codec: s.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
            sample_rate: s.sample_rate.as_deref().and_then(|r| r.parse().ok()),
            channels: s.channels,
        });

    Ok(MediaInfo {
        duration,
        video,
        audio,
    })
}

/// "30000/1001" or "25" to frames per second. Zero rates are treated as unknown.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    (fps > 0.0 && fps.is_finite()).then_some(fps)
}

/// Runs the ffmpeg/ffprobe executables.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    encode: EncodeSettings,
}

impl Ffmpeg {
    pub fn new(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            encode: config.encode.clone(),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Run ffmpeg to completion, surfacing its stderr on failure.
    pub fn run(&self, args: &[OsString]) -> Result<()> {
        debug!("ffmpeg args: {:?}", args);
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error("ffmpeg", &self.ffmpeg_path, e))?;
        if !output.status.success() {
            return Err(ComposeError::tool("ffmpeg", output.status, &output.stderr));
        }
        Ok(())
    }

    /// Encode a composed timeline into `output`.
    pub fn encode(&self, timeline: &Timeline, output: &Path) -> Result<()> {
        self.run(&self.encode_args(timeline, output))
    }

    pub fn encode_args(&self, timeline: &Timeline, output: &Path) -> Vec<OsString> {
        let mut args = ArgList::default();
        args.push("-y").push("-i").push(timeline.source.as_os_str());
        if !timeline.graph.is_empty() {
            args.push("-filter_complex").push(timeline.graph.render());
        }
        args.push("-map").push(timeline.video.map_arg());
        match &timeline.audio {
            Some(audio) => {
                args.push("-map").push(audio.map_arg());
            }
            None => {
                args.push("-an");
            }
        }
        self.push_video_codec(&mut args);
        if timeline.audio.is_some() {
            args.push("-c:a").push(&self.encode.audio_codec);
        }
        args.push("-movflags").push("+faststart").push(output.as_os_str());
        args.0
    }

    fn push_video_codec(&self, args: &mut ArgList) {
        args.push("-c:v")
            .push(&self.encode.video_codec)
            .push("-preset")
            .push(&self.encode.preset)
            .push("-crf")
            .push(self.encode.crf.to_string())
            .push("-pix_fmt")
            .push("yuv420p");
    }

    /// 16 kHz mono PCM WAV, the input format speech recognizers expect.
    pub fn extract_audio(&self, input: &Path, wav_out: &Path) -> Result<()> {
        let mut args = ArgList::default();
        args.push("-y")
            .push("-i")
            .push(input.as_os_str())
            .push("-vn")
            .push("-acodec")
            .push("pcm_s16le")
            .push("-ar")
            .push("16000")
            .push("-ac")
            .push("1")
            .push(wav_out.as_os_str());
        self.run(&args.0)
    }

    /// Combine the video of `video` with the first audio track of `audio_source`,
    /// copying both streams.
    pub fn remux(&self, video: &Path, audio_source: &Path, output: &Path) -> Result<()> {
        let mut args = ArgList::default();
        args.push("-y")
            .push("-i")
            .push(video.as_os_str())
            .push("-i")
            .push(audio_source.as_os_str())
            .push("-map")
            .push("0:v:0")
            .push("-map")
            .push("1:a:0")
            .push("-c:v")
            .push("copy")
            .push("-c:a")
            .push("copy")
            .push("-shortest")
            .push("-movflags")
            .push("+faststart")
            .push(output.as_os_str());
        self.run(&args.0)
    }

    /// Decode the first video stream of `source` as raw RGBA frames.
    pub fn open_decoder(&self, source: &Path, width: u32, height: u32) -> Result<RawVideoReader> {
        let frame_size = frame_size(width, height).ok_or_else(|| ComposeError::SourceOpen {
            path: source.to_path_buf(),
            reason: format!("frame size {width}x{height} overflows"),
        })?;

        let mut args = ArgList::default();
        args.push("-hide_banner")
            .push("-loglevel")
            .push("error")
            .push("-nostdin")
            .push("-i")
            .push(source.as_os_str())
            .push("-map")
            .push("0:v:0")
            .push("-f")
            .push("rawvideo")
            .push("-pix_fmt")
            .push("rgba")
            .push("-");
        debug!("ffmpeg decoder args: {:?}", args.0);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args.0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ComposeError::SourceOpen {
                path: source.to_path_buf(),
                reason: spawn_error("ffmpeg", &self.ffmpeg_path, e).to_string(),
            })?;
        let stdout = child.stdout.take().ok_or_else(|| ComposeError::SourceOpen {
            path: source.to_path_buf(),
            reason: "failed to capture ffmpeg stdout".to_string(),
        })?;
        let stderr = collect_stderr(&mut child);

        Ok(RawVideoReader {
            child,
            stdout,
            stderr: Some(stderr),
            frame_size,
        })
    }

    /// Encode raw RGBA frames into a video-only file.
    pub fn open_encoder(&self, output: &Path, width: u32, height: u32, fps: f64) -> Result<RawVideoWriter> {
        let frame_size = frame_size(width, height).ok_or_else(|| ComposeError::EncoderOpen {
            path: output.to_path_buf(),
            reason: format!("frame size {width}x{height} overflows"),
        })?;

        let mut args = ArgList::default();
        args.push("-hide_banner")
            .push("-loglevel")
            .push("error")
            .push("-y")
            .push("-f")
            .push("rawvideo")
            .push("-pix_fmt")
            .push("rgba")
            .push("-s:v")
            .push(format!("{width}x{height}"))
            .push("-r")
            .push(format!("{fps}"))
            .push("-i")
            .push("-")
            .push("-an");
        self.push_video_codec(&mut args);
        args.push(output.as_os_str());
        debug!("ffmpeg encoder args: {:?}", args.0);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args.0)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ComposeError::EncoderOpen {
                path: output.to_path_buf(),
                reason: spawn_error("ffmpeg", &self.ffmpeg_path, e).to_string(),
            })?;
        let stdin = child.stdin.take().ok_or_else(|| ComposeError::EncoderOpen {
            path: output.to_path_buf(),
            reason: "failed to capture ffmpeg stdin".to_string(),
        })?;
        let stderr = collect_stderr(&mut child);

        Ok(RawVideoWriter {
            child,
            stdin: Some(stdin),
            stderr: Some(stderr),
            frame_size,
        })
    }
}

impl MediaProbe for Ffmpeg {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if !path.exists() {
            return Err(ComposeError::SourceNotFound(path.to_path_buf()));
        }
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error("ffprobe", &self.ffprobe_path, e))?;
        if !output.status.success() {
            return Err(ComposeError::tool("ffprobe", output.status, &output.stderr));
        }
        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Reads fixed-size RGBA frames from a decoding ffmpeg process.
pub struct RawVideoReader {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    frame_size: usize,
}

impl RawVideoReader {
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Fill `frame` with the next frame. Returns `false` once the stream is exhausted.
    pub fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < frame.len() {
            match self.stdout.read(&mut frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(stop_with_diagnostics(&mut self.child, &mut self.stderr, "ffmpeg (decode)", &e)),
            }
        }
        if filled == frame.len() {
            return Ok(true);
        }
        if filled > 0 {
            warn!("dropping truncated trailing frame ({filled} of {} bytes)", frame.len());
        }
        Ok(false)
    }

    /// Wait for the decoder to exit and check its status.
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdout);
        let status = self.child.wait()?;
        let stderr = join_stderr(&mut self.stderr);
        if !status.success() {
            return Err(ComposeError::tool("ffmpeg (decode)", status, stderr.as_bytes()));
        }
        Ok(())
    }

    pub fn abort(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Writes fixed-size RGBA frames into an encoding ffmpeg process.
pub struct RawVideoWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frame_size: usize,
}

impl RawVideoWriter {
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() != self.frame_size {
            return Err(ComposeError::Validation(format!(
                "frame size mismatch: expected {} bytes, got {}",
                self.frame_size,
                frame.len()
            )));
        }
        let written = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(frame),
            None => Err(std::io::Error::new(ErrorKind::BrokenPipe, "encoder input already closed")),
        };
        written.map_err(|e| {
            // the pipe breaks when the encoder exits; its stderr says why
            self.stdin = None;
            stop_with_diagnostics(&mut self.child, &mut self.stderr, "ffmpeg (encode)", &e)
        })
    }

    /// Close the input and wait for the encoder to flush the file.
    pub fn finish(mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }
        let status = self.child.wait()?;
        let stderr = join_stderr(&mut self.stderr);
        if !status.success() {
            return Err(ComposeError::tool("ffmpeg (encode)", status, stderr.as_bytes()));
        }
        Ok(())
    }

    pub fn abort(mut self) {
        self.stdin = None;
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn frame_size(width: u32, height: u32) -> Option<usize> {
    let w = usize::try_from(width).ok()?;
    let h = usize::try_from(height).ok()?;
    w.checked_mul(h)?.checked_mul(4).filter(|size| *size > 0)
}

fn collect_stderr(child: &mut Child) -> JoinHandle<String> {
    let stderr = child.stderr.take();
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut text);
        }
        text
    })
}

fn join_stderr(handle: &mut Option<JoinHandle<String>>) -> String {
    handle.take().and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Stop a piped process after an I/O failure and report what it printed.
fn stop_with_diagnostics(
    child: &mut Child,
    stderr: &mut Option<JoinHandle<String>>,
    tool: &str,
    cause: &std::io::Error,
) -> ComposeError {
    let _ = child.kill();
    let status = match child.wait() {
        Ok(status) => status.to_string(),
        Err(_) => "unknown exit status".to_string(),
    };
    let text = join_stderr(stderr);
    let text = text.trim();
    ComposeError::ExternalTool {
        tool: tool.to_string(),
        status,
        stderr: if text.is_empty() {
            cause.to_string()
        } else {
            format!("{text} ({cause})")
        },
    }
}

fn spawn_error(tool: &str, path: &Path, error: std::io::Error) -> ComposeError {
    let status = if error.kind() == ErrorKind::NotFound {
        format!("not found at {}", path.display())
    } else {
        "failed to start".to_string()
    };
    ComposeError::ExternalTool {
        tool: tool.to_string(),
        status,
        stderr: error.to_string(),
    }
}

#[derive(Debug, Default)]
struct ArgList(Vec<OsString>);

impl ArgList {
    fn push(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.0.push(arg.as_ref().to_os_string());
        self
    }
}
