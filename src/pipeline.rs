//! Operation orchestration: probing, strategy choice, engine runs and cleanup.
//!
//! Each public method is one synchronous operation. Validation happens before
//! any subprocess runs; a probe or engine failure stops the operation, and the
//! workspace it opened is dropped (and removed) on the way out.

use crate::builder::{
    self, ClipParams, ComposeParams, ConcatInput, FilterConcat, FrameParams, ImageOverlay,
    ImageSequence, LoopParams, SlideshowParams, TextOverlay,
};
use crate::error::{MediaError, Result};
use crate::ffmpeg::{Engine, EngineOutput, FfmpegCommand, FfmpegEngine};
use crate::manifest::ConcatManifest;
use crate::probe::{FfprobeProber, Prober};
use crate::profile::{inspect, StreamProfile};
use crate::workspace::{TempWorkspace, WorkspaceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

/// External tool locations and the temp root for workspaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_bin: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_bin: String,
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg(),
            ffprobe_bin: default_ffprobe(),
            temp_root: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn workspace(&self) -> WorkspaceConfig {
        WorkspaceConfig {
            root: self.temp_root.clone(),
        }
    }
}

/// How a list of videos gets joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatStrategy {
    /// Concat demuxer with `-c copy`; inputs must share codec parameters.
    StreamCopy,
    /// `concat` filter with re-encoding; inputs must share size, SAR and stream layout.
    FilterGraph,
}

impl ConcatStrategy {
    /// Stream copy only when both paths carry the same container suffix.
    pub fn for_containers(source: &Path, output: &Path) -> Self {
        let suffix = |p: &Path| {
            p.extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        };
        if suffix(source) == suffix(output) {
            ConcatStrategy::StreamCopy
        } else {
            ConcatStrategy::FilterGraph
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcatParams {
    pub videos: Vec<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendParams {
    pub video: PathBuf,
    pub image: PathBuf,
    /// Seconds the image stays on screen.
    pub duration: f64,
    pub output: PathBuf,
}

fn check_concat(videos: &[PathBuf], output: &Path) -> Result<()> {
    if videos.is_empty() {
        return Err(MediaError::validation("No videos given"));
    }
    if output.as_os_str().is_empty() {
        return Err(MediaError::validation("output is required"));
    }
    Ok(())
}

pub struct Pipeline<E = FfmpegEngine, P = FfprobeProber> {
    engine: E,
    prober: P,
    workspace: WorkspaceConfig,
}

impl Pipeline {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            FfmpegEngine::new(config.ffmpeg_bin.clone()),
            FfprobeProber::new(config.ffprobe_bin.clone()),
            config.workspace(),
        )
    }
}

impl<E: Engine, P: Prober> Pipeline<E, P> {
    pub fn new(engine: E, prober: P, workspace: WorkspaceConfig) -> Self {
        Self {
            engine,
            prober,
            workspace,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    fn run(&self, command: &FfmpegCommand) -> Result<EngineOutput> {
        Ok(self.engine.execute(command)?.check(command)?)
    }

    fn workspace(&self, hint: &str) -> Result<TempWorkspace> {
        TempWorkspace::create(&self.workspace, Some(hint))
    }

    pub fn inspect(&self, path: &Path) -> Result<StreamProfile> {
        inspect(&self.prober, path)
    }

    pub fn extract_frame(&self, p: &FrameParams) -> Result<()> {
        self.run(&builder::extract_frame(p)?)?;
        info!("Extracted frame {:?} -> {:?}", p.source, p.output);
        Ok(())
    }

    pub fn extract_animated_clip(&self, p: &ClipParams) -> Result<()> {
        self.run(&builder::extract_animated_clip(p)?)?;
        info!("Extracted clip {:?} -> {:?}", p.source, p.output);
        Ok(())
    }

    pub fn overlay_text(&self, p: &TextOverlay) -> Result<()> {
        self.run(&builder::overlay_text(p)?)?;
        info!("Text overlay {:?} -> {:?}", p.source, p.output);
        Ok(())
    }

    pub fn overlay_image(&self, p: &ImageOverlay) -> Result<()> {
        self.run(&builder::overlay_image(p)?)?;
        info!("Image overlay {:?} -> {:?}", p.source, p.output);
        Ok(())
    }

    /// Renumber the images into a workspace and encode them as a sequence
    /// spread evenly across `duration`.
    pub fn compose_images_to_video(&self, p: &ComposeParams) -> Result<()> {
        p.validate()?;

        let mut ws = self.workspace("images")?;
        let seq = ImageSequence::stage(&mut ws, &p.images)?;
        self.run(&builder::images_to_video(p, &seq)?)?;

        info!("Composed {} images -> {:?}", seq.count, p.output);
        Ok(())
    }

    /// Encode the images through a concat manifest, each shown for an equal
    /// share of `duration`.
    pub fn compose_images_sequence_concat(&self, p: &SlideshowParams) -> Result<()> {
        p.validate()?;

        let manifest = ConcatManifest::with_even_durations(&p.images, p.duration)?;
        let mut ws = self.workspace("slideshow")?;
        let list = manifest.write_to(&mut ws)?;
        self.run(&builder::images_from_manifest(p, &list)?)?;

        info!("Concatenated {} images -> {:?}", p.images.len(), p.output);
        Ok(())
    }

    pub fn loop_images_to_video(&self, p: &LoopParams) -> Result<()> {
        p.validate()?;

        match p.images.as_slice() {
            [single] => {
                self.run(&builder::loop_images(p, single, 1)?)?;
            }
            images => {
                let mut ws = self.workspace("loop")?;
                let seq = ImageSequence::stage(&mut ws, images)?;
                self.run(&builder::loop_images(p, &seq.pattern, seq.count)?)?;
            }
        }

        info!("Looped {} images for {}s -> {:?}", p.images.len(), p.duration, p.output);
        Ok(())
    }

    /// Join videos without re-encoding.
    pub fn concat_same_codec(&self, videos: &[PathBuf], output: &Path) -> Result<()> {
        check_concat(videos, output)?;

        let manifest = ConcatManifest::from_files(videos)?;
        let mut ws = self.workspace("concat")?;
        let list = manifest.write_to(&mut ws)?;
        self.run(&builder::concat_copy(&list, output)?)?;

        info!("Stream-copy concat of {} videos -> {:?}", videos.len(), output);
        Ok(())
    }

    /// Probe every input and lay out the filter-graph concatenation.
    pub fn plan_mixed_concat(&self, videos: &[PathBuf], output: &Path) -> Result<FilterConcat> {
        check_concat(videos, output)?;

        let mut merged = StreamProfile::default();
        let mut inputs = Vec::with_capacity(videos.len());
        for video in videos {
            let profile = self.inspect(video)?;
            merged.merge(&profile);
            inputs.push(ConcatInput {
                path: video.clone(),
                has_audio: profile.has_audio,
            });
        }

        Ok(FilterConcat {
            inputs,
            channel_layout: merged.channel_layout,
            sample_rate: merged.sample_rate,
            output: output.to_path_buf(),
        })
    }

    /// Join videos through the `concat` filter, re-encoding. Inputs without
    /// audio get a silent track.
    pub fn concat_mixed_codec(&self, videos: &[PathBuf], output: &Path) -> Result<()> {
        let plan = self.plan_mixed_concat(videos, output)?;
        if let Some(index) = plan.silence_index() {
            debug!("Silent audio mapped from input {}", index);
        }
        self.run(&builder::concat_filter(&plan)?)?;

        info!("Filter concat of {} videos -> {:?}", videos.len(), output);
        Ok(())
    }

    pub fn concat(&self, strategy: ConcatStrategy, videos: &[PathBuf], output: &Path) -> Result<()> {
        match strategy {
            ConcatStrategy::StreamCopy => self.concat_same_codec(videos, output),
            ConcatStrategy::FilterGraph => self.concat_mixed_codec(videos, output),
        }
    }

    /// Show `image` for `duration` seconds after the end of `video`.
    ///
    /// The image is first encoded into a clip matching the video's size, SAR,
    /// codec, pixel format and frame rate, then joined to the video. Returns
    /// the strategy used for the join.
    pub fn append_image_to_video(&self, p: &AppendParams) -> Result<ConcatStrategy> {
        if p.video.as_os_str().is_empty() || p.image.as_os_str().is_empty() {
            return Err(MediaError::validation("video and image are required"));
        }
        if p.output.as_os_str().is_empty() {
            return Err(MediaError::validation("output is required"));
        }
        builder::require_positive("duration", p.duration)?;
        builder::sequence_extension(std::slice::from_ref(&p.image))?;
        let suffix = p
            .video
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .ok_or_else(|| MediaError::validation(format!("{:?} has no container suffix", p.video)))?;

        let target = self.inspect(&p.video)?;
        if !target.has_video {
            return Err(MediaError::validation(format!("{:?} has no video stream", p.video)));
        }

        let mut ws = self.workspace("append")?;
        let tail = ws.track(&format!("tail.{}", suffix));

        let tail_params = LoopParams {
            images: vec![p.image.clone()],
            output: tail.clone(),
            duration: p.duration,
            size: Some(target.size()),
            sample_aspect_ratio: Some(target.sample_aspect_ratio.clone()),
            codec: Some(builder::encoder_for(&target.codec_name).to_string()),
            pixel_format: Some(target.pixel_format.clone()),
            frame_rate: Some(target.frame_rate.clone()),
        };
        self.run(&builder::loop_images(&tail_params, &p.image, 1)?)?;

        let strategy = ConcatStrategy::for_containers(&p.video, &p.output);
        debug!("Appending {:?} with {:?}", tail, strategy);
        self.concat(strategy, &[p.video.clone(), tail], &p.output)?;

        info!("Appended {:?} ({}s) to {:?} -> {:?}", p.image, p.duration, p.video, p.output);
        Ok(strategy)
    }
}
