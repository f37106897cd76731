//! Integration tests for ffcompose pipelines and organ operations

use ffcompose::builder::{ComposeParams, FrameParams, LoopParams, SlideshowParams};
use ffcompose::organ::{MediaOrgan, Organ, Stimulus};
use ffcompose::{
    AppendParams, ConcatStrategy, Engine, EngineOutput, FfmpegCommand, FfmpegError, MediaError,
    Pipeline, Prober, StreamRecord, WorkspaceConfig,
};
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// What the engine saw for one invocation
#[derive(Debug, Clone)]
struct Call {
    args: Vec<String>,
    /// Contents of a concat manifest passed with `-f concat`
    manifest: Option<String>,
    /// Files next to the first input at the time of the call
    input_dir: Vec<String>,
}

/// Records every command; optionally touches the output and fails on request
#[derive(Default)]
struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    touch_outputs: bool,
    fail_on_call: Option<usize>,
}

impl FakeEngine {
    fn touching() -> Self {
        Self {
            touch_outputs: true,
            ..Default::default()
        }
    }

    fn failing_at(call: usize) -> Self {
        Self {
            touch_outputs: true,
            fail_on_call: Some(call),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Engine for FakeEngine {
    fn execute(&self, command: &FfmpegCommand) -> Result<EngineOutput, FfmpegError> {
        let args = command.args().to_vec();
        let first_input = command.value_of("-i").map(PathBuf::from);

        let manifest = if command.value_of("-f") == Some("concat") {
            first_input.as_ref().and_then(|p| fs::read_to_string(p).ok())
        } else {
            None
        };

        let mut input_dir: Vec<String> = first_input
            .as_ref()
            .and_then(|p| p.parent())
            .and_then(|d| fs::read_dir(d).ok())
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        input_dir.sort();

        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push(Call {
            args: args.clone(),
            manifest,
            input_dir,
        });

        if self.fail_on_call == Some(index) {
            return Ok(EngineOutput {
                success: false,
                output: "Conversion failed!".to_string(),
            });
        }

        if self.touch_outputs {
            if let Some(out) = args.last() {
                fs::write(out, b"").unwrap();
            }
        }

        Ok(EngineOutput {
            success: true,
            output: String::new(),
        })
    }
}

/// Streams by exact path, falling back to file name
#[derive(Default)]
struct FakeProber {
    by_path: HashMap<PathBuf, Vec<StreamRecord>>,
    by_name: HashMap<String, Vec<StreamRecord>>,
    calls: AtomicUsize,
}

impl FakeProber {
    fn with_path(mut self, path: &Path, streams: Vec<StreamRecord>) -> Self {
        self.by_path.insert(path.to_path_buf(), streams);
        self
    }

    fn with_name(mut self, name: &str, streams: Vec<StreamRecord>) -> Self {
        self.by_name.insert(name.to_string(), streams);
        self
    }
}

impl Prober for FakeProber {
    fn streams(&self, path: &Path) -> ffcompose::Result<Vec<StreamRecord>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(s) = self.by_path.get(path) {
            return Ok(s.clone());
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.by_name
            .get(&name)
            .cloned()
            .ok_or_else(|| MediaError::probe(path, "Invalid data found when processing input"))
    }
}

fn video_stream(codec: &str) -> StreamRecord {
    StreamRecord::new("video")
        .with("codec_name", codec)
        .with("width", 1280)
        .with("height", 720)
        .with("sample_aspect_ratio", "1:1")
        .with("r_frame_rate", "25/1")
        .with("pix_fmt", "yuv420p")
}

fn audio_stream() -> StreamRecord {
    StreamRecord::new("audio")
        .with("codec_name", "aac")
        .with("channel_layout", "stereo")
        .with("sample_rate", "44100")
}

/// Media files and a separate, initially empty workspace root
struct Fixture {
    media: TempDir,
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            media: TempDir::new().unwrap(),
            root: TempDir::new().unwrap(),
        }
    }

    fn file(&self, name: &str) -> PathBuf {
        let path = self.media.path().join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        path
    }

    fn out(&self, name: &str) -> PathBuf {
        self.media.path().join(name)
    }

    fn workspace(&self) -> WorkspaceConfig {
        WorkspaceConfig::in_dir(self.root.path())
    }

    fn leftovers(&self) -> usize {
        fs::read_dir(self.root.path()).unwrap().count()
    }
}

fn to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Stills
// ============================================================================

#[test]
fn test_extract_frame_scenario() {
    let fx = Fixture::new();
    let engine = FakeEngine::default();
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    let params = FrameParams {
        source: "in.mp4".into(),
        output: "out.jpg".into(),
        seek: "00:00:02".into(),
        size: Some("320x240".into()),
    };
    pipeline.extract_frame(&params).unwrap();
    pipeline.extract_frame(&params).unwrap();

    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    let expected = to_strings(&[
        "-y", "-ss", "00:00:02", "-i", "in.mp4", "-vframes", "1", "-f", "image2", "-s",
        "320x240", "out.jpg",
    ]);
    assert_eq!(calls[0].args, expected);
    // same inputs, same forced-overwrite command
    assert_eq!(calls[1].args, expected);
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_engine_failure_carries_diagnostic() {
    let fx = Fixture::new();
    let engine = FakeEngine::failing_at(0);
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    let err = pipeline
        .extract_frame(&FrameParams {
            source: fx.file("in.mp4"),
            output: fx.out("out.jpg"),
            seek: "1".into(),
            size: None,
        })
        .unwrap_err();

    assert!(matches!(err, MediaError::Engine(_)));
    assert_eq!(err.diagnostic(), Some("Conversion failed!"));
}

// ============================================================================
// Images to video
// ============================================================================

#[test]
fn test_compose_images_stages_numbered_sequence() {
    let fx = Fixture::new();
    let images: Vec<PathBuf> = ["b.jpg", "a.jpg", "c.jpg"].iter().map(|n| fx.file(n)).collect();
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    pipeline
        .compose_images_to_video(&ComposeParams {
            images,
            output: fx.out("slides.mp4"),
            duration: 6.0,
            frame_rate: "30".into(),
            codec: "libx264".into(),
            pixel_format: "yuv420p".into(),
        })
        .unwrap();

    let calls = engine.calls();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    let cmd_rate = call.args.iter().position(|a| a == "-framerate").unwrap();
    assert_eq!(call.args[cmd_rate + 1], "3/6");
    assert_eq!(call.input_dir, ["000000.jpg", "000001.jpg", "000002.jpg"]);
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_compose_images_mixed_formats_fail_before_engine() {
    let fx = Fixture::new();
    let images = vec![fx.file("a.jpg"), fx.file("b.png")];
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    let err = pipeline
        .compose_images_to_video(&ComposeParams {
            images,
            output: fx.out("slides.mp4"),
            duration: 4.0,
            frame_rate: "25".into(),
            codec: "libx264".into(),
            pixel_format: "yuv420p".into(),
        })
        .unwrap_err();

    assert!(matches!(err, MediaError::Validation(_)));
    assert!(engine.calls().is_empty());
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_compose_images_cleans_up_on_engine_failure() {
    let fx = Fixture::new();
    let images = vec![fx.file("a.png"), fx.file("b.png")];
    let engine = FakeEngine::failing_at(0);
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    let result = pipeline.compose_images_to_video(&ComposeParams {
        images,
        output: fx.out("slides.mp4"),
        duration: 2.0,
        frame_rate: "25".into(),
        codec: "libx264".into(),
        pixel_format: "yuv420p".into(),
    });

    assert!(matches!(result, Err(MediaError::Engine(_))));
    assert_eq!(engine.calls()[0].input_dir.len(), 2);
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_slideshow_manifest_has_durations() {
    let fx = Fixture::new();
    let images = vec![fx.file("1.jpg"), fx.file("2.jpg"), fx.file("3.jpg"), fx.file("4.jpg")];
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    pipeline
        .compose_images_sequence_concat(&SlideshowParams {
            images,
            output: fx.out("show.mp4"),
            duration: 10.0,
            frame_rate: "25".into(),
        })
        .unwrap();

    let manifest = engine.calls()[0].manifest.clone().unwrap();
    assert_eq!(manifest.matches("file '").count(), 4);
    assert_eq!(manifest.matches("duration 2.5").count(), 4);
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_loop_images_sequence() {
    let fx = Fixture::new();
    let images = vec![fx.file("a.png"), fx.file("b.png")];
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    pipeline
        .loop_images_to_video(&LoopParams {
            images,
            output: fx.out("loop.mp4"),
            duration: 8.0,
            size: Some("640x360".into()),
            frame_rate: Some("25".into()),
            ..Default::default()
        })
        .unwrap();

    let call = &engine.calls()[0];
    let pos = call.args.iter().position(|a| a == "-framerate").unwrap();
    assert_eq!(call.args[pos + 1], "2/8");
    assert!(call.args.contains(&"scale=640x360".to_string()));
    assert_eq!(fx.leftovers(), 0);
}

// ============================================================================
// Concatenation
// ============================================================================

#[test]
fn test_concat_same_codec_manifest() {
    let fx = Fixture::new();
    let videos = vec![fx.file("a.mp4"), fx.file("b.mp4"), fx.file("c.mp4")];
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    pipeline.concat_same_codec(&videos, &fx.out("joined.mp4")).unwrap();

    let call = &engine.calls()[0];
    let manifest = call.manifest.clone().unwrap();
    let lines: Vec<&str> = manifest.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in &lines {
        let path = line.trim_start_matches("file '").trim_end_matches('\'');
        assert!(Path::new(path).is_absolute(), "{}", line);
    }
    assert!(!manifest.contains("duration"));
    assert!(call.args.windows(2).any(|w| w == ["-c", "copy"]));
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_concat_same_codec_failure_cleans_up() {
    let fx = Fixture::new();
    let videos = vec![fx.file("a.mp4"), fx.file("b.mp4")];
    let engine = FakeEngine::failing_at(0);
    let pipeline = Pipeline::new(&engine, FakeProber::default(), fx.workspace());

    let err = pipeline.concat_same_codec(&videos, &fx.out("joined.mp4")).unwrap_err();
    assert!(matches!(err, MediaError::Engine(_)));
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_concat_mixed_codec_silence_for_missing_audio() {
    let fx = Fixture::new();
    let a = fx.file("a.mp4");
    let b = fx.file("b.mp4");
    let c = fx.file("c.mp4");
    let prober = FakeProber::default()
        .with_path(&a, vec![video_stream("h264"), audio_stream()])
        .with_path(&b, vec![video_stream("mpeg4")])
        .with_path(&c, vec![video_stream("h264"), audio_stream()]);
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, prober, fx.workspace());

    let videos = vec![a.clone(), b.clone(), c.clone()];
    let output = fx.out("mixed.mp4");
    pipeline.concat_mixed_codec(&videos, &output).unwrap();

    let args = &engine.calls()[0].args;
    let inputs: Vec<&String> = args
        .iter()
        .enumerate()
        .filter(|(i, _)| *i > 0 && args[i - 1] == "-i")
        .map(|(_, a)| a)
        .collect();
    assert_eq!(inputs.len(), 4);
    assert_eq!(inputs[3], "anullsrc=channel_layout=stereo:sample_rate=44100");

    let pos = args.iter().position(|a| a == "-filter_complex").unwrap();
    assert_eq!(
        args[pos + 1],
        "[0:v][0:a][1:v][3:a][2:v][2:a]concat=n=3:v=1:a=1[v][a]"
    );
    assert_eq!(args.last().unwrap(), &output.display().to_string());
}

#[test]
fn test_concat_mixed_codec_probe_failure_stops_early() {
    let fx = Fixture::new();
    let a = fx.file("a.mp4");
    let prober = FakeProber::default().with_path(&a, vec![video_stream("h264"), audio_stream()]);
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, prober, fx.workspace());

    let err = pipeline
        .concat_mixed_codec(&[a, fx.file("broken.mp4")], &fx.out("mixed.mp4"))
        .unwrap_err();

    assert!(matches!(err, MediaError::Probe { .. }));
    assert!(engine.calls().is_empty());
}

// ============================================================================
// Append image
// ============================================================================

#[test]
fn test_append_image_same_container_uses_stream_copy() {
    let fx = Fixture::new();
    let video = fx.file("clip.mp4");
    let image = fx.file("end.png");
    let prober = FakeProber::default().with_path(&video, vec![video_stream("h264"), audio_stream()]);
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, prober, fx.workspace());

    let strategy = pipeline
        .append_image_to_video(&AppendParams {
            video: video.clone(),
            image: image.clone(),
            duration: 3.0,
            output: fx.out("final.mp4"),
        })
        .unwrap();

    assert_eq!(strategy, ConcatStrategy::StreamCopy);
    let calls = engine.calls();
    assert_eq!(calls.len(), 2);

    let tail = &calls[0].args;
    let expected_head = to_strings(&["-y", "-loop", "1", "-t", "3", "-i"]);
    assert_eq!(tail[..6], expected_head[..]);
    assert_eq!(tail[6], image.display().to_string());
    assert!(tail.windows(2).any(|w| w == ["-codec", "libx264"]));
    assert!(tail.windows(2).any(|w| w == ["-pix_fmt", "yuv420p"]));
    assert!(tail.windows(2).any(|w| w == ["-r", "25/1"]));
    assert!(tail.windows(2).any(|w| w == ["-vf", "scale=1280x720,setsar=1/1"]));
    assert!(tail.last().unwrap().ends_with("tail.mp4"));

    let manifest = calls[1].manifest.clone().unwrap();
    assert_eq!(manifest.lines().count(), 2);
    assert!(manifest.lines().nth(1).unwrap().ends_with("tail.mp4'"));
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_append_image_other_container_uses_filter_graph() {
    let fx = Fixture::new();
    let video = fx.file("clip.flv");
    let image = fx.file("end.jpg");
    let prober = FakeProber::default()
        .with_path(&video, vec![video_stream("flv1"), audio_stream()])
        .with_name("tail.flv", vec![video_stream("flv1")]);
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, prober, fx.workspace());

    let strategy = pipeline
        .append_image_to_video(&AppendParams {
            video,
            image,
            duration: 2.0,
            output: fx.out("final.mp4"),
        })
        .unwrap();

    assert_eq!(strategy, ConcatStrategy::FilterGraph);
    let calls = engine.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].args.windows(2).any(|w| w == ["-codec", "flv"]));

    let concat = &calls[1].args;
    let pos = concat.iter().position(|a| a == "-filter_complex").unwrap();
    assert_eq!(concat[pos + 1], "[0:v][0:a][1:v][2:a]concat=n=2:v=1:a=1[v][a]");
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_append_image_stops_when_tail_encode_fails() {
    let fx = Fixture::new();
    let video = fx.file("clip.mp4");
    let prober = FakeProber::default().with_path(&video, vec![video_stream("h264")]);
    let engine = FakeEngine::failing_at(0);
    let pipeline = Pipeline::new(&engine, prober, fx.workspace());

    let err = pipeline
        .append_image_to_video(&AppendParams {
            video,
            image: fx.file("end.png"),
            duration: 3.0,
            output: fx.out("final.mp4"),
        })
        .unwrap_err();

    assert!(matches!(err, MediaError::Engine(_)));
    assert_eq!(engine.calls().len(), 1);
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_append_image_rejects_bad_duration_before_probing() {
    let fx = Fixture::new();
    let video = fx.file("clip.mp4");
    let prober = FakeProber::default().with_path(&video, vec![video_stream("h264")]);
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, &prober, fx.workspace());

    for duration in [0.0, -3.0, f64::NAN] {
        let err = pipeline
            .append_image_to_video(&AppendParams {
                video: video.clone(),
                image: fx.file("end.png"),
                duration,
                output: fx.out("final.mp4"),
            })
            .unwrap_err();
        assert!(matches!(err, MediaError::Validation(_)), "{}", duration);
    }

    let err = pipeline
        .append_image_to_video(&AppendParams {
            video,
            image: fx.file("end"),
            duration: 3.0,
            output: fx.out("final.mp4"),
        })
        .unwrap_err();
    assert!(matches!(err, MediaError::Validation(_)));

    assert_eq!(prober.calls.load(Ordering::Relaxed), 0);
    assert!(engine.calls().is_empty());
    assert_eq!(fx.leftovers(), 0);
}

#[test]
fn test_append_image_requires_video_stream() {
    let fx = Fixture::new();
    let video = fx.file("voice.mp4");
    let prober = FakeProber::default().with_path(&video, vec![audio_stream()]);
    let engine = FakeEngine::touching();
    let pipeline = Pipeline::new(&engine, prober, fx.workspace());

    let err = pipeline
        .append_image_to_video(&AppendParams {
            video,
            image: fx.file("end.png"),
            duration: 3.0,
            output: fx.out("final.mp4"),
        })
        .unwrap_err();

    assert!(matches!(err, MediaError::Validation(_)));
    assert!(engine.calls().is_empty());
}

// ============================================================================
// Organ
// ============================================================================

fn create_stimulus(op: &str, input: serde_json::Value) -> Stimulus {
    Stimulus {
        op: op.to_string(),
        input,
        context: HashMap::new(),
    }
}

#[tokio::test]
async fn test_organ_missing_required_input() {
    let fx = Fixture::new();
    let engine = FakeEngine::default();
    let organ = MediaOrgan::with_pipeline(Pipeline::new(&engine, FakeProber::default(), fx.workspace()));

    let response = organ
        .stimulate(create_stimulus("frame.extract", json!({"source": "in.mp4", "output": "out.jpg"})))
        .await
        .unwrap();

    assert!(!response.ok);
    assert_eq!(response.output["error"], "ValidationFailure");
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn test_organ_mixed_concat() {
    let fx = Fixture::new();
    let a = fx.file("a.mp4");
    let b = fx.file("b.mp4");
    let prober = FakeProber::default()
        .with_path(&a, vec![video_stream("h264"), audio_stream()])
        .with_path(&b, vec![video_stream("vp9")]);
    let engine = FakeEngine::touching();
    let organ = MediaOrgan::with_pipeline(Pipeline::new(&engine, prober, fx.workspace()));

    let response = organ
        .stimulate(create_stimulus(
            "concat.mixed_codec",
            json!({"videos": [a, b], "output": fx.out("out.mp4")}),
        ))
        .await
        .unwrap();

    assert!(response.ok, "{}", response.output);
    assert_eq!(response.output["strategy"], "filter_graph");
    assert_eq!(engine.calls().len(), 1);

    let snapshot = organ.metrics().snapshot();
    assert_eq!(snapshot.successful_requests, 1);
    assert_eq!(snapshot.operations["concat.mixed_codec"], 1);
}

#[tokio::test]
async fn test_organ_engine_failure_reports_diagnostic() {
    let fx = Fixture::new();
    let engine = FakeEngine::failing_at(0);
    let organ = MediaOrgan::with_pipeline(Pipeline::new(&engine, FakeProber::default(), fx.workspace()));

    let response = organ
        .stimulate(create_stimulus(
            "overlay.image",
            json!({
                "source": fx.file("in.mp4"),
                "output": fx.out("out.mp4"),
                "image": fx.file("logo.png"),
                "x": "10",
                "y": "10"
            }),
        ))
        .await
        .unwrap();

    assert!(!response.ok);
    assert_eq!(response.output["error"], "EngineFailure");
    assert_eq!(response.output["diagnostic"], "Conversion failed!");
    assert_eq!(organ.metrics().snapshot().failed_requests, 1);
}

#[tokio::test]
async fn test_organ_append_reports_strategy() {
    let fx = Fixture::new();
    let video = fx.file("clip.mp4");
    let prober = FakeProber::default().with_path(&video, vec![video_stream("h264")]);
    let engine = FakeEngine::touching();
    let organ = MediaOrgan::with_pipeline(Pipeline::new(&engine, prober, fx.workspace()));

    let response = organ
        .stimulate(create_stimulus(
            "video.append_image",
            json!({
                "video": video,
                "image": fx.file("end.png"),
                "duration": 3,
                "output": fx.out("final.mp4")
            }),
        ))
        .await
        .unwrap();

    assert!(response.ok, "{}", response.output);
    assert_eq!(response.output["strategy"], "stream_copy");
    assert_eq!(fx.leftovers(), 0);
}

#[tokio::test]
async fn test_unsupported_operation() {
    let organ = MediaOrgan::new();

    let response = organ
        .stimulate(create_stimulus("invalid.operation", json!({})))
        .await
        .unwrap();

    assert!(!response.ok);
    assert!(response.output["message"].as_str().unwrap().contains("Unsupported"));
}

#[test]
fn test_function_cards_have_required_fields() {
    let organ = MediaOrgan::new();
    let card = organ.describe();

    for function in &card.functions {
        assert!(!function.name.is_empty(), "Function name is empty");
        assert!(!function.description.is_empty(), "Function description is empty for {}", function.name);
        assert!(!function.tags.is_empty(), "Function tags are empty for {}", function.name);
        assert!(!function.examples.is_empty(), "Function examples are empty for {}", function.name);
        assert!(function.output_schema.is_object(), "Output schema not an object for {}", function.name);
    }
}
