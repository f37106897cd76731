//! Organ interface for ffcompose
//!
//! Exposes every pipeline operation through a JSON stimulus/response pair so
//! that a daemon (or any orchestrator) can discover and invoke them.
//!
//! ## Available Operations
//!
//! 1. `frame.extract` - Still image at a timestamp
//! 2. `clip.extract` - Animated GIF clip
//! 3. `overlay.text` - Text watermark
//! 4. `overlay.image` - Image watermark
//! 5. `images.compose` - Image sequence to video
//! 6. `images.concat` - Image slideshow via concat manifest
//! 7. `images.loop` - Looped images matched to a target profile
//! 8. `concat.same_codec` - Stream-copy concatenation
//! 9. `concat.mixed_codec` - Filter-graph concatenation
//! 10. `video.append_image` - Hold a still image after a video
//! 11. `media.capabilities` - Capability card query
//!
//! ## Example
//!
//! ```rust,no_run
//! use ffcompose::organ::{MediaOrgan, Organ, Stimulus};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let organ = MediaOrgan::new();
//!
//! let response = organ.stimulate(Stimulus {
//!     op: "frame.extract".to_string(),
//!     input: json!({"source": "in.mp4", "output": "/tmp/thumb.jpg", "seek": "00:00:02"}),
//!     context: HashMap::new(),
//! }).await?;
//! println!("ok={} latency={}ms", response.ok, response.latency_ms);
//! # Ok(())
//! # }
//! ```

use crate::builder::{
    ClipParams, ComposeParams, FrameParams, ImageOverlay, LoopParams, SlideshowParams, TextOverlay,
};
use crate::error::MediaError;
use crate::ffmpeg::Engine;
use crate::metrics::{Metrics, Timer};
use crate::pipeline::{AppendParams, ConcatParams, Pipeline, PipelineConfig};
use crate::probe::Prober;
use crate::validation::validate_input;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

pub const OPERATION_COUNT: usize = 10;

/// Operations that run the engine, in capability-card order.
pub const OPERATIONS: [&str; OPERATION_COUNT] = [
    "frame.extract",
    "clip.extract",
    "overlay.text",
    "overlay.image",
    "images.compose",
    "images.concat",
    "images.loop",
    "concat.same_codec",
    "concat.mixed_codec",
    "video.append_image",
];

/// Input to an organ operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stimulus {
    pub op: String,
    pub input: Value,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

/// Output of an organ operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    pub output: Value,
    pub latency_ms: u64,
    pub cost: Option<f64>,
}

#[async_trait]
pub trait Organ: Send + Sync {
    async fn stimulate(&self, stimulus: Stimulus) -> Result<Response, OrganError>;
    fn describe(&self) -> OrganCard;
}

/// Organ-level errors
#[derive(Debug, Error)]
pub enum OrganError {
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl OrganError {
    fn kind(&self) -> &'static str {
        match self {
            OrganError::UnsupportedOperation(_) => "UnsupportedOperation",
            OrganError::InvalidInput(_) => "InvalidInput",
            OrganError::SerializationError(_) => "SerializationError",
            OrganError::Media(MediaError::Probe { .. }) => "ProbeFailure",
            OrganError::Media(MediaError::Validation(_)) => "ValidationFailure",
            OrganError::Media(MediaError::Engine(_)) => "EngineFailure",
            OrganError::Media(_) => "ResourceFailure",
        }
    }
}

/// Organ capability card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganCard {
    pub name: String,
    pub version: String,
    pub description: String,
    pub division: String,
    pub subsystem: String,
    pub tags: Vec<String>,
    pub execution_modes: Vec<String>,
    pub functions: Vec<FunctionCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// Function capability card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCard {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
    pub idempotent: bool,
    pub side_effects: Vec<String>,
    pub input_schema: Option<Value>,
    pub output_schema: Value,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn parse<T: DeserializeOwned>(input: Value) -> Result<T, OrganError> {
    serde_json::from_value(input).map_err(|e| OrganError::InvalidInput(e.to_string()))
}

/// Media composition organ
pub struct MediaOrgan<E = crate::ffmpeg::FfmpegEngine, P = crate::probe::FfprobeProber> {
    pipeline: Pipeline<E, P>,
    metrics: Arc<Metrics>,
}

impl MediaOrgan {
    pub fn new() -> Self {
        Self::from_config(&PipelineConfig::default())
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_pipeline(Pipeline::from_config(config))
    }
}

impl Default for MediaOrgan {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine, P: Prober> MediaOrgan<E, P> {
    pub fn with_pipeline(pipeline: Pipeline<E, P>) -> Self {
        Self {
            pipeline,
            metrics: Metrics::new(),
        }
    }

    pub fn pipeline(&self) -> &Pipeline<E, P> {
        &self.pipeline
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    fn dispatch(&self, op: &str, input: Value) -> Result<Value, OrganError> {
        let card = capability_card();
        let function = card
            .functions
            .iter()
            .find(|f| f.name == op)
            .ok_or_else(|| OrganError::UnsupportedOperation(op.to_string()))?;
        if let Some(schema) = &function.input_schema {
            validate_input(&input, schema)?;
        }

        match op {
            "frame.extract" => {
                let p: FrameParams = parse(input)?;
                self.pipeline.extract_frame(&p)?;
                Ok(json!({ "output_path": p.output }))
            }
            "clip.extract" => {
                let p: ClipParams = parse(input)?;
                self.pipeline.extract_animated_clip(&p)?;
                Ok(json!({ "output_path": p.output }))
            }
            "overlay.text" => {
                let p: TextOverlay = parse(input)?;
                self.pipeline.overlay_text(&p)?;
                Ok(json!({ "output_path": p.output }))
            }
            "overlay.image" => {
                let p: ImageOverlay = parse(input)?;
                self.pipeline.overlay_image(&p)?;
                Ok(json!({ "output_path": p.output }))
            }
            "images.compose" => {
                let p: ComposeParams = parse(input)?;
                self.pipeline.compose_images_to_video(&p)?;
                Ok(json!({ "output_path": p.output, "image_count": p.images.len() }))
            }
            "images.concat" => {
                let p: SlideshowParams = parse(input)?;
                self.pipeline.compose_images_sequence_concat(&p)?;
                Ok(json!({ "output_path": p.output, "image_count": p.images.len() }))
            }
            "images.loop" => {
                let p: LoopParams = parse(input)?;
                self.pipeline.loop_images_to_video(&p)?;
                Ok(json!({ "output_path": p.output, "image_count": p.images.len() }))
            }
            "concat.same_codec" => {
                let p: ConcatParams = parse(input)?;
                self.pipeline.concat_same_codec(&p.videos, &p.output)?;
                Ok(json!({ "output_path": p.output, "strategy": "stream_copy" }))
            }
            "concat.mixed_codec" => {
                let p: ConcatParams = parse(input)?;
                self.pipeline.concat_mixed_codec(&p.videos, &p.output)?;
                Ok(json!({ "output_path": p.output, "strategy": "filter_graph" }))
            }
            "video.append_image" => {
                let p: AppendParams = parse(input)?;
                let strategy = self.pipeline.append_image_to_video(&p)?;
                Ok(json!({ "output_path": p.output, "strategy": strategy }))
            }
            "media.capabilities" => Ok(serde_json::to_value(&card)?),
            "metrics" => Ok(serde_json::to_value(self.metrics.snapshot())?),
            other => Err(OrganError::UnsupportedOperation(other.to_string())),
        }
    }
}

#[async_trait]
impl<E, P> Organ for MediaOrgan<E, P>
where
    E: Engine + Send + Sync,
    P: Prober + Send + Sync,
{
    async fn stimulate(&self, stimulus: Stimulus) -> Result<Response, OrganError> {
        let timer = Timer::new();
        let op = stimulus.op.clone();

        let (ok, output) = match self.dispatch(&op, stimulus.input) {
            Ok(output) => (true, output),
            Err(e) => {
                warn!("{} failed: {}", op, e);
                let mut output = json!({
                    "error": e.kind(),
                    "message": e.to_string(),
                    "op": op,
                });
                if let OrganError::UnsupportedOperation(_) = e {
                    output["available_operations"] = json!(capability_card()
                        .functions
                        .iter()
                        .map(|f| f.name.clone())
                        .collect::<Vec<_>>());
                }
                if let OrganError::Media(media) = &e {
                    if let Some(diagnostic) = media.diagnostic() {
                        output["diagnostic"] = json!(diagnostic);
                    }
                }
                (false, output)
            }
        };

        let latency = timer.elapsed_ms();
        self.metrics.record_request(&op, ok, latency);

        Ok(Response {
            ok,
            output,
            latency_ms: latency,
            cost: None,
        })
    }

    fn describe(&self) -> OrganCard {
        capability_card()
    }
}

/// Capability card listing every operation and its input schema.
pub fn capability_card() -> OrganCard {
    let writes_video = strings(&["writes video file", "invokes ffmpeg"]);
    let output_path = json!({
        "type": "object",
        "properties": { "output_path": { "type": "string" } }
    });

    OrganCard {
        name: "ffcompose".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "FFmpeg command pipelines for thumbnails, watermarks, image-to-video composition and video concatenation".to_string(),
        division: "media".to_string(),
        subsystem: "composition".to_string(),
        tags: strings(&["media", "video", "ffmpeg", "concat", "watermark", "thumbnail", "gif"]),
        execution_modes: strings(&["embedded", "server"]),
        author: None,
        repository: None,
        functions: vec![
            FunctionCard {
                name: "frame.extract".to_string(),
                description: "Grab one still image from a video at a timestamp".to_string(),
                tags: strings(&["video", "thumbnail", "image"]),
                examples: strings(&["Thumbnail at 00:00:02 scaled to 320x240"]),
                idempotent: true,
                side_effects: strings(&["writes image file", "invokes ffmpeg"]),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string", "description": "Video to read" },
                        "output": { "type": "string", "description": "Image to write" },
                        "seek": { "type": "string", "description": "Timestamp, e.g. 00:00:02 or 2.0" },
                        "size": { "type": "string", "description": "Output size, e.g. 320x240" }
                    },
                    "required": ["source", "output", "seek"]
                })),
                output_schema: output_path.clone(),
            },
            FunctionCard {
                name: "clip.extract".to_string(),
                description: "Cut an animated GIF out of a video".to_string(),
                tags: strings(&["video", "gif"]),
                examples: strings(&["Five second GIF starting at 00:01:00 at 10 fps"]),
                idempotent: true,
                side_effects: strings(&["writes gif file", "invokes ffmpeg"]),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "output": { "type": "string" },
                        "seek": { "type": "string" },
                        "duration": { "type": "string", "description": "Seconds, e.g. 5.0" },
                        "size": { "type": "string" },
                        "frame_rate": { "type": "integer", "description": "Default 25" }
                    },
                    "required": ["source", "output", "seek", "duration"]
                })),
                output_schema: output_path.clone(),
            },
            FunctionCard {
                name: "overlay.text".to_string(),
                description: "Burn a text watermark into a video".to_string(),
                tags: strings(&["video", "watermark", "text"]),
                examples: strings(&["White caption at 10,10 with a black box"]),
                idempotent: true,
                side_effects: writes_video.clone(),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "output": { "type": "string" },
                        "text": { "type": "string" },
                        "font": { "type": "string", "description": "Font file path" },
                        "font_size": { "type": "string" },
                        "font_color": { "type": "string" },
                        "x": { "type": "string" },
                        "y": { "type": "string" },
                        "alpha": { "type": "number", "description": "0..1, default 1" },
                        "boxed": { "type": "boolean" },
                        "box_color": { "type": "string" }
                    },
                    "required": ["source", "output", "text", "font", "font_size", "font_color", "x", "y"]
                })),
                output_schema: output_path.clone(),
            },
            FunctionCard {
                name: "overlay.image".to_string(),
                description: "Composite an image watermark over a video".to_string(),
                tags: strings(&["video", "watermark", "image"]),
                examples: strings(&["Logo in the top-left corner"]),
                idempotent: true,
                side_effects: writes_video.clone(),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "output": { "type": "string" },
                        "image": { "type": "string" },
                        "x": { "type": "string" },
                        "y": { "type": "string" }
                    },
                    "required": ["source", "output", "image", "x", "y"]
                })),
                output_schema: output_path.clone(),
            },
            FunctionCard {
                name: "images.compose".to_string(),
                description: "Encode same-format images as a sequence spread over a duration".to_string(),
                tags: strings(&["images", "video", "encode"]),
                examples: strings(&["Ten JPEGs into a 5 second H.264 video"]),
                idempotent: true,
                side_effects: strings(&["writes video file", "invokes ffmpeg", "uses temp directory"]),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "images": { "type": "array", "minItems": 1 },
                        "output": { "type": "string" },
                        "duration": { "type": "number" },
                        "frame_rate": { "type": "string", "description": "Default 25" },
                        "codec": { "type": "string", "description": "Default libx264" },
                        "pixel_format": { "type": "string", "description": "Default yuv420p" }
                    },
                    "required": ["images", "output", "duration"]
                })),
                output_schema: output_path.clone(),
            },
            FunctionCard {
                name: "images.concat".to_string(),
                description: "Slideshow of images, each shown for an equal share of the duration".to_string(),
                tags: strings(&["images", "video", "concat"]),
                examples: strings(&["Four photos over 8 seconds"]),
                idempotent: true,
                side_effects: strings(&["writes video file", "invokes ffmpeg", "uses temp directory"]),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "images": { "type": "array", "minItems": 1 },
                        "output": { "type": "string" },
                        "duration": { "type": "number" },
                        "frame_rate": { "type": "string" }
                    },
                    "required": ["images", "output", "duration"]
                })),
                output_schema: output_path.clone(),
            },
            FunctionCard {
                name: "images.loop".to_string(),
                description: "Loop images into a video with an explicit size, SAR, codec, pixel format and frame rate".to_string(),
                tags: strings(&["images", "video", "encode"]),
                examples: strings(&["Hold a title card for 3 seconds at 1280x720 25fps"]),
                idempotent: true,
                side_effects: strings(&["writes video file", "invokes ffmpeg", "uses temp directory"]),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "images": { "type": "array", "minItems": 1 },
                        "output": { "type": "string" },
                        "duration": { "type": "number" },
                        "size": { "type": "string" },
                        "sample_aspect_ratio": { "type": "string" },
                        "codec": { "type": "string" },
                        "pixel_format": { "type": "string" },
                        "frame_rate": { "type": "string" }
                    },
                    "required": ["images", "output", "duration"]
                })),
                output_schema: output_path.clone(),
            },
            FunctionCard {
                name: "concat.same_codec".to_string(),
                description: "Join videos sharing identical codec parameters without re-encoding".to_string(),
                tags: strings(&["video", "concat", "copy"]),
                examples: strings(&["Join recorded segments from the same camera"]),
                idempotent: true,
                side_effects: strings(&["writes video file", "invokes ffmpeg", "uses temp directory"]),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "videos": { "type": "array", "minItems": 1 },
                        "output": { "type": "string" }
                    },
                    "required": ["videos", "output"]
                })),
                output_schema: json!({
                    "type": "object",
                    "properties": {
                        "output_path": { "type": "string" },
                        "strategy": { "type": "string" }
                    }
                }),
            },
            FunctionCard {
                name: "concat.mixed_codec".to_string(),
                description: "Join videos with differing codecs but equal size and SAR, re-encoding; audio-less inputs get silence".to_string(),
                tags: strings(&["video", "concat", "encode"]),
                examples: strings(&["Join an H.264 intro with an MPEG-4 body"]),
                idempotent: true,
                side_effects: strings(&["writes video file", "invokes ffmpeg", "invokes ffprobe"]),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "videos": { "type": "array", "minItems": 1 },
                        "output": { "type": "string" }
                    },
                    "required": ["videos", "output"]
                })),
                output_schema: json!({
                    "type": "object",
                    "properties": {
                        "output_path": { "type": "string" },
                        "strategy": { "type": "string" }
                    }
                }),
            },
            FunctionCard {
                name: "video.append_image".to_string(),
                description: "Hold a still image for a number of seconds after the end of a video".to_string(),
                tags: strings(&["video", "images", "concat"]),
                examples: strings(&["End card for 3 seconds"]),
                idempotent: true,
                side_effects: strings(&["writes video file", "invokes ffmpeg", "invokes ffprobe", "uses temp directory"]),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "video": { "type": "string" },
                        "image": { "type": "string" },
                        "duration": { "type": "number" },
                        "output": { "type": "string" }
                    },
                    "required": ["video", "image", "duration", "output"]
                })),
                output_schema: json!({
                    "type": "object",
                    "properties": {
                        "output_path": { "type": "string" },
                        "strategy": { "type": "string", "enum": ["stream_copy", "filter_graph"] }
                    }
                }),
            },
            FunctionCard {
                name: "media.capabilities".to_string(),
                description: "Return this capability card".to_string(),
                tags: strings(&["metadata", "discovery"]),
                examples: strings(&["Discover available composition operations"]),
                idempotent: true,
                side_effects: vec![],
                input_schema: None,
                output_schema: json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "version": { "type": "string" },
                        "functions": { "type": "array" }
                    }
                }),
            },
            FunctionCard {
                name: "metrics".to_string(),
                description: "Request counters and latency".to_string(),
                tags: strings(&["metrics"]),
                examples: strings(&["Check error rate"]),
                idempotent: true,
                side_effects: vec![],
                input_schema: None,
                output_schema: json!({ "type": "object" }),
            },
        ],
    }
}
