//! ffcompose - FFmpeg command pipelines for media composition
//!
//! Builds argument lists for the system `ffmpeg` binary (thumbnails, GIFs,
//! watermarks, image-to-video, concatenation), probes inputs with `ffprobe`
//! to pick between stream-copy and filter-graph concatenation, and keeps
//! intermediate files in scoped temp workspaces that are always removed.

pub mod builder;
mod error;
mod ffmpeg;
mod manifest;
pub mod metrics;
pub mod organ;
mod pipeline;
pub mod probe;
mod profile;
pub mod validation;
mod workspace;

pub use error::{MediaError, Result};
pub use ffmpeg::{Engine, EngineOutput, FfmpegCommand, FfmpegEngine, FfmpegError};
pub use manifest::{ConcatManifest, ManifestEntry};
pub use pipeline::{AppendParams, ConcatParams, ConcatStrategy, Pipeline, PipelineConfig};
pub use probe::{FfprobeProber, Prober, StreamRecord};
pub use profile::{inspect, StreamProfile};
pub use workspace::{TempWorkspace, WorkspaceConfig};
