//! Normalized stream characteristics of a media file

use crate::error::Result;
use crate::probe::{Prober, StreamRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Video/audio summary of one file (or the merge of several).
///
/// Each field is taken from the first stream of its kind that reports a
/// non-empty value; later streams never overwrite it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub has_video: bool,
    pub width: u32,
    pub height: u32,
    /// Slash separated, e.g. `1/1`.
    pub sample_aspect_ratio: String,
    /// Rational, e.g. `25/1`.
    pub frame_rate: String,
    pub codec_name: String,
    pub pixel_format: String,
    pub has_audio: bool,
    pub channel_layout: String,
    pub sample_rate: String,
}

fn fill(slot: &mut String, value: String) {
    if slot.is_empty() && !value.is_empty() {
        *slot = value;
    }
}

fn fill_dimension(slot: &mut u32, value: u32) {
    if *slot == 0 {
        *slot = value;
    }
}

impl StreamProfile {
    pub fn from_streams(streams: &[StreamRecord]) -> Self {
        let mut profile = StreamProfile::default();

        for stream in streams {
            if stream.is_video() {
                profile.has_video = true;
                fill_dimension(&mut profile.width, stream.get("width").parse().unwrap_or(0));
                fill_dimension(&mut profile.height, stream.get("height").parse().unwrap_or(0));
                fill(
                    &mut profile.sample_aspect_ratio,
                    stream.get("sample_aspect_ratio").replace(':', "/"),
                );
                fill(&mut profile.frame_rate, stream.get("r_frame_rate"));
                fill(&mut profile.codec_name, stream.get("codec_name"));
                fill(&mut profile.pixel_format, stream.get("pix_fmt"));
            }
            if stream.is_audio() {
                profile.has_audio = true;
                fill(&mut profile.channel_layout, stream.get("channel_layout"));
                fill(&mut profile.sample_rate, stream.get("sample_rate"));
            }
        }

        profile
    }

    /// `WxH`, or empty when no dimensions were reported.
    pub fn size(&self) -> String {
        if self.width == 0 && self.height == 0 {
            String::new()
        } else {
            format!("{}x{}", self.width, self.height)
        }
    }

    /// Fold `other` into `self`, keeping any value already set.
    pub fn merge(&mut self, other: &StreamProfile) {
        self.has_video |= other.has_video;
        self.has_audio |= other.has_audio;
        fill_dimension(&mut self.width, other.width);
        fill_dimension(&mut self.height, other.height);
        fill(&mut self.sample_aspect_ratio, other.sample_aspect_ratio.clone());
        fill(&mut self.frame_rate, other.frame_rate.clone());
        fill(&mut self.codec_name, other.codec_name.clone());
        fill(&mut self.pixel_format, other.pixel_format.clone());
        fill(&mut self.channel_layout, other.channel_layout.clone());
        fill(&mut self.sample_rate, other.sample_rate.clone());
    }
}

/// Probe `path` and summarize its streams. Probe failures are returned as-is.
pub fn inspect<P: Prober>(prober: &P, path: &Path) -> Result<StreamProfile> {
    let streams = prober.streams(path)?;
    let profile = StreamProfile::from_streams(&streams);
    debug!(
        "Profile {:?}: video={} {} sar={} fps={} codec={} audio={} {} {}",
        path,
        profile.has_video,
        profile.size(),
        profile.sample_aspect_ratio,
        profile.frame_rate,
        profile.codec_name,
        profile.has_audio,
        profile.channel_layout,
        profile.sample_rate
    );
    Ok(profile)
}
