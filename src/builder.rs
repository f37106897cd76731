//! Argument lists for each FFmpeg operation.
//!
//! Every builder checks its required parameters first and returns
//! [`MediaError::Validation`] before anything is run. Optional flags are only
//! emitted when the caller set them.

use crate::error::{MediaError, Result};
use crate::ffmpeg::FfmpegCommand;
use crate::workspace::TempWorkspace;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Length of the silent audio clip fed to the concat filter.
pub const SILENCE_SECONDS: &str = "0.1";
pub const DEFAULT_CHANNEL_LAYOUT: &str = "stereo";
pub const DEFAULT_SAMPLE_RATE: &str = "44100";

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MediaError::validation(format!("{} is required", name)));
    }
    Ok(())
}

fn require_path(name: &str, value: &Path) -> Result<()> {
    if value.as_os_str().is_empty() {
        return Err(MediaError::validation(format!("{} is required", name)));
    }
    Ok(())
}

pub(crate) fn require_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(MediaError::validation(format!("{} must be positive, got {}", name, value)));
    }
    Ok(())
}

/// Seconds in `5.0` or `[[hh:]mm:]ss[.frac]` form.
fn time_seconds(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    parts.iter().try_fold(0.0, |acc, part| {
        part.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| acc * 60.0 + v)
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

// ============================================================================
// Stills and clips
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameParams {
    pub source: PathBuf,
    pub output: PathBuf,
    /// `00:00:02` or `2.0`
    pub seek: String,
    /// `320x240`
    #[serde(default)]
    pub size: Option<String>,
}

/// Single still image at `seek`.
pub fn extract_frame(p: &FrameParams) -> Result<FfmpegCommand> {
    require_path("source", &p.source)?;
    require_path("output", &p.output)?;
    require("seek", &p.seek)?;

    Ok(FfmpegCommand::new()
        .overwrite()
        .arg("-ss", &p.seek)
        .input(&p.source)
        .arg("-vframes", 1)
        .arg("-f", "image2")
        .arg_opt("-s", non_empty(&p.size))
        .output(&p.output))
}

fn default_clip_rate() -> u32 {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub seek: String,
    /// Seconds, e.g. `5.0`
    pub duration: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default = "default_clip_rate")]
    pub frame_rate: u32,
}

/// Animated GIF of `duration` starting at `seek`.
pub fn extract_animated_clip(p: &ClipParams) -> Result<FfmpegCommand> {
    require_path("source", &p.source)?;
    require_path("output", &p.output)?;
    require("seek", &p.seek)?;
    require("duration", &p.duration)?;
    let seconds = time_seconds(&p.duration).ok_or_else(|| {
        MediaError::validation(format!("duration is not a time value: {}", p.duration))
    })?;
    require_positive("duration", seconds)?;
    if p.frame_rate == 0 {
        return Err(MediaError::validation("frame_rate must be positive"));
    }

    Ok(FfmpegCommand::new()
        .overwrite()
        .arg("-ss", &p.seek)
        .input(&p.source)
        .arg("-t", &p.duration)
        .arg("-r", p.frame_rate)
        .arg("-f", "gif")
        .arg_opt("-s", non_empty(&p.size))
        .output(&p.output))
}

// ============================================================================
// Watermarks
// ============================================================================

fn default_alpha() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextOverlay {
    pub source: PathBuf,
    pub output: PathBuf,
    pub text: String,
    pub font: String,
    pub font_size: String,
    pub font_color: String,
    pub x: String,
    pub y: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub boxed: bool,
    #[serde(default)]
    pub box_color: Option<String>,
}

impl TextOverlay {
    pub fn filter(&self) -> String {
        let mut vf = format!(
            "drawtext=fontfile={}:text='{}':fontsize={}:fontcolor={}:x={}:y={}:alpha={}",
            self.font, self.text, self.font_size, self.font_color, self.x, self.y, self.alpha
        );
        if self.boxed {
            vf.push_str(":box=1");
            if let Some(color) = non_empty(&self.box_color) {
                vf.push_str(&format!(":boxcolor={}", color));
            }
        }
        vf
    }
}

pub fn overlay_text(p: &TextOverlay) -> Result<FfmpegCommand> {
    require_path("source", &p.source)?;
    require_path("output", &p.output)?;
    require("text", &p.text)?;
    require("font", &p.font)?;
    require("font_size", &p.font_size)?;
    require("font_color", &p.font_color)?;
    require("x", &p.x)?;
    require("y", &p.y)?;
    if !(0.0..=1.0).contains(&p.alpha) {
        return Err(MediaError::validation(format!("alpha must be within 0..1, got {}", p.alpha)));
    }

    Ok(FfmpegCommand::new()
        .overwrite()
        .flag("-re")
        .input(&p.source)
        .arg("-vf", p.filter())
        .output(&p.output))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageOverlay {
    pub source: PathBuf,
    pub output: PathBuf,
    pub image: PathBuf,
    pub x: String,
    pub y: String,
}

impl ImageOverlay {
    /// Loads the image as `[logo]`, then composites it over the main stream.
    pub fn filter(&self) -> String {
        format!(
            "movie={} [logo]; [in][logo] overlay={}:{} [out]",
            self.image.display(),
            self.x,
            self.y
        )
    }
}

pub fn overlay_image(p: &ImageOverlay) -> Result<FfmpegCommand> {
    require_path("source", &p.source)?;
    require_path("output", &p.output)?;
    require_path("image", &p.image)?;
    require("x", &p.x)?;
    require("y", &p.y)?;

    Ok(FfmpegCommand::new()
        .overwrite()
        .input(&p.source)
        .arg("-vf", p.filter())
        .output(&p.output))
}

// ============================================================================
// Images to video
// ============================================================================

/// Shared file extension of an image list. Fails on an empty list or mixed formats.
pub fn sequence_extension<P: AsRef<Path>>(images: &[P]) -> Result<String> {
    let mut ext: Option<String> = None;
    for image in images {
        let current = image
            .as_ref()
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        match &ext {
            Some(first) if *first != current => {
                return Err(MediaError::validation(format!(
                    "Image formats differ: .{} and .{}",
                    first, current
                )));
            }
            Some(_) => {}
            None => ext = Some(current),
        }
    }
    match ext {
        Some(ext) if ext.is_empty() => Err(MediaError::validation("Images have no file extension")),
        Some(ext) => Ok(ext),
        None => Err(MediaError::validation("No images given")),
    }
}

/// Images copied into a workspace as `000000.ext`, `000001.ext`, ...
#[derive(Debug, Clone)]
pub struct ImageSequence {
    pub pattern: PathBuf,
    pub count: usize,
}

impl ImageSequence {
    const WIDTH: usize = 6;

    pub fn file_name(index: usize, ext: &str) -> String {
        format!("{:0width$}.{}", index, ext, width = Self::WIDTH)
    }

    /// Validate the list, then copy each image into `workspace` in order.
    pub fn stage<P: AsRef<Path>>(workspace: &mut TempWorkspace, images: &[P]) -> Result<Self> {
        let ext = sequence_extension(images)?;
        for (i, image) in images.iter().enumerate() {
            workspace.copy_in(image.as_ref(), &Self::file_name(i, &ext))?;
        }
        Ok(Self {
            pattern: workspace.path(&format!("%0{}d.{}", Self::WIDTH, ext)),
            count: images.len(),
        })
    }

    /// Input rate that spreads `count` frames over `duration` seconds.
    pub fn input_rate(&self, duration: f64) -> String {
        format!("{}/{}", self.count, duration)
    }
}

fn default_fps() -> String {
    "25".to_string()
}

fn default_codec() -> String {
    "libx264".to_string()
}

fn default_pix_fmt() -> String {
    "yuv420p".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeParams {
    pub images: Vec<PathBuf>,
    pub output: PathBuf,
    /// Total length in seconds.
    pub duration: f64,
    #[serde(default = "default_fps")]
    pub frame_rate: String,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pixel_format: String,
}

impl ComposeParams {
    pub fn validate(&self) -> Result<()> {
        require_path("output", &self.output)?;
        require_positive("duration", self.duration)?;
        require("frame_rate", &self.frame_rate)?;
        sequence_extension(&self.images).map(|_| ())
    }
}

/// Encode a staged numeric image sequence.
pub fn images_to_video(p: &ComposeParams, seq: &ImageSequence) -> Result<FfmpegCommand> {
    p.validate()?;

    Ok(FfmpegCommand::new()
        .overwrite()
        .arg("-framerate", seq.input_rate(p.duration))
        .input(&seq.pattern)
        .arg("-r", &p.frame_rate)
        .arg("-c:v", &p.codec)
        .arg("-pix_fmt", &p.pixel_format)
        .output(&p.output))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideshowParams {
    pub images: Vec<PathBuf>,
    pub output: PathBuf,
    pub duration: f64,
    #[serde(default = "default_fps")]
    pub frame_rate: String,
}

impl SlideshowParams {
    pub fn validate(&self) -> Result<()> {
        require_path("output", &self.output)?;
        require_positive("duration", self.duration)?;
        require("frame_rate", &self.frame_rate)?;
        if self.images.is_empty() {
            return Err(MediaError::validation("No images given"));
        }
        Ok(())
    }
}

/// Encode images listed (with per-image durations) in a concat manifest.
pub fn images_from_manifest(p: &SlideshowParams, manifest: &Path) -> Result<FfmpegCommand> {
    p.validate()?;

    Ok(concat_demuxer(manifest)
        .arg("-r", &p.frame_rate)
        .output(&p.output))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopParams {
    pub images: Vec<PathBuf>,
    pub output: PathBuf,
    pub duration: f64,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub sample_aspect_ratio: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub pixel_format: Option<String>,
    #[serde(default)]
    pub frame_rate: Option<String>,
}

impl LoopParams {
    pub fn validate(&self) -> Result<()> {
        require_path("output", &self.output)?;
        require_positive("duration", self.duration)?;
        sequence_extension(&self.images).map(|_| ())
    }

    fn video_filter(&self) -> Option<String> {
        let parts: Vec<String> = [
            non_empty(&self.size).map(|s| format!("scale={}", s)),
            non_empty(&self.sample_aspect_ratio).map(|s| format!("setsar={}", s)),
        ]
        .into_iter()
        .flatten()
        .collect();
        (!parts.is_empty()).then(|| parts.join(","))
    }
}

/// Loop `input` for `duration` seconds. With more than one frame the input
/// is an image sequence played once across the whole duration.
pub fn loop_images(p: &LoopParams, input: &Path, frames: usize) -> Result<FfmpegCommand> {
    p.validate()?;
    require_path("input", input)?;

    let mut cmd = FfmpegCommand::new().overwrite().arg("-loop", 1);
    if frames > 1 {
        cmd = cmd.arg("-framerate", format!("{}/{}", frames, p.duration));
    }

    Ok(cmd
        .arg("-t", p.duration)
        .input(input)
        .arg_opt("-codec", non_empty(&p.codec))
        .arg_opt("-pix_fmt", non_empty(&p.pixel_format))
        .arg_opt("-r", non_empty(&p.frame_rate))
        .arg_opt("-vf", p.video_filter())
        .output(&p.output))
}

/// Encoder for a probed codec name; unknown names pass through.
pub fn encoder_for(codec_name: &str) -> &str {
    match codec_name {
        "h264" => "libx264",
        "hevc" => "libx265",
        "flv1" => "flv",
        "vp8" => "libvpx",
        "vp9" => "libvpx-vp9",
        other => other,
    }
}

// ============================================================================
// Concatenation
// ============================================================================

fn concat_demuxer(manifest: &Path) -> FfmpegCommand {
    FfmpegCommand::new()
        .overwrite()
        .arg("-f", "concat")
        .arg("-safe", 0)
        .input(manifest)
}

/// Stream-copy concatenation of the files listed in `manifest`.
pub fn concat_copy(manifest: &Path, output: &Path) -> Result<FfmpegCommand> {
    require_path("manifest", manifest)?;
    require_path("output", output)?;

    Ok(concat_demuxer(manifest).arg("-c", "copy").output(output))
}

/// One video to concatenate and whether it carries audio.
#[derive(Debug, Clone)]
pub struct ConcatInput {
    pub path: PathBuf,
    pub has_audio: bool,
}

#[derive(Debug, Clone)]
pub struct FilterConcat {
    pub inputs: Vec<ConcatInput>,
    pub channel_layout: String,
    pub sample_rate: String,
    pub output: PathBuf,
}

impl FilterConcat {
    /// Input index of the silent audio source, if any input needs it.
    pub fn silence_index(&self) -> Option<usize> {
        self.inputs
            .iter()
            .any(|i| !i.has_audio)
            .then_some(self.inputs.len())
    }

    /// `[i:v][a:a]` per input, where `a` is `i` or the silence index.
    pub fn filter(&self) -> String {
        let silence = self.inputs.len();
        let labels: String = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let a = if input.has_audio { i } else { silence };
                format!("[{}:v][{}:a]", i, a)
            })
            .collect();
        format!("{}concat=n={}:v=1:a=1[v][a]", labels, self.inputs.len())
    }

    fn silence_source(&self) -> String {
        let layout = if self.channel_layout.is_empty() {
            DEFAULT_CHANNEL_LAYOUT
        } else {
            self.channel_layout.as_str()
        };
        let rate = if self.sample_rate.is_empty() {
            DEFAULT_SAMPLE_RATE
        } else {
            self.sample_rate.as_str()
        };
        format!("anullsrc=channel_layout={}:sample_rate={}", layout, rate)
    }
}

/// Re-encoding concatenation through the `concat` filter.
pub fn concat_filter(p: &FilterConcat) -> Result<FfmpegCommand> {
    require_path("output", &p.output)?;
    if p.inputs.is_empty() {
        return Err(MediaError::validation("No videos given"));
    }

    let mut cmd = FfmpegCommand::new().overwrite();
    for input in &p.inputs {
        require_path("video", &input.path)?;
        cmd = cmd.input(&input.path);
    }
    if p.silence_index().is_some() {
        cmd = cmd
            .arg("-f", "lavfi")
            .arg("-t", SILENCE_SECONDS)
            .arg("-i", p.silence_source());
    }

    Ok(cmd
        .arg("-filter_complex", p.filter())
        .arg("-map", "[v]")
        .arg("-map", "[a]")
        .output(&p.output))
}
