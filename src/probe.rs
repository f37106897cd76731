//! Stream probing via FFprobe

use crate::error::{MediaError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// One stream as reported by the prober.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    codec_type: String,
    #[serde(flatten)]
    fields: HashMap<String, Value>,
}

impl StreamRecord {
    pub fn new(codec_type: &str) -> Self {
        Self {
            codec_type: codec_type.to_string(),
            fields: HashMap::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn is_video(&self) -> bool {
        self.codec_type == "video"
    }

    pub fn is_audio(&self) -> bool {
        self.codec_type == "audio"
    }

    /// Field as a string; numbers are rendered, missing fields are empty.
    pub fn get(&self, field: &str) -> String {
        match self.fields.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<StreamRecord>,
}

/// Source of per-stream metadata for a media file.
pub trait Prober {
    fn streams(&self, path: &Path) -> Result<Vec<StreamRecord>>;
}

impl<T: Prober + ?Sized> Prober for &T {
    fn streams(&self, path: &Path) -> Result<Vec<StreamRecord>> {
        (**self).streams(path)
    }
}

/// Prober backed by the system `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: String,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl Prober for FfprobeProber {
    fn streams(&self, path: &Path) -> Result<Vec<StreamRecord>> {
        debug!("Probing {:?}", path);

        let output = Command::new(&self.binary)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| MediaError::probe(path, format!("{} failed to start: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::probe(path, stderr.trim().to_string()));
        }

        parse_streams(&output.stdout).map_err(|e| MediaError::probe(path, e))
    }
}

fn parse_streams(stdout: &[u8]) -> std::result::Result<Vec<StreamRecord>, String> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| format!("JSON parse error: {}", e))?;
    Ok(parsed.streams)
}
