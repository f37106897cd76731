//! Concat demuxer file lists

use crate::error::{MediaError, Result};
use crate::workspace::TempWorkspace;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub duration: Option<f64>,
}

/// Ordered list of files for the concat demuxer.
///
/// Paths are resolved to absolute form when added, since the engine reads the
/// list relative to its own location rather than the caller's directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConcatManifest {
    entries: Vec<ManifestEntry>,
}

impl ConcatManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: &Path, duration: Option<f64>) -> Result<()> {
        let path = std::fs::canonicalize(path).map_err(|e| {
            MediaError::Resource(format!("Failed to resolve {:?}: {}", path, e))
        })?;
        self.entries.push(ManifestEntry { path, duration });
        Ok(())
    }

    /// Every path, no durations.
    pub fn from_files<P: AsRef<Path>>(files: &[P]) -> Result<Self> {
        let mut manifest = Self::new();
        for file in files {
            manifest.push(file.as_ref(), None)?;
        }
        Ok(manifest)
    }

    /// Every path shown for an equal share of `total` seconds.
    pub fn with_even_durations<P: AsRef<Path>>(files: &[P], total: f64) -> Result<Self> {
        if files.is_empty() {
            return Err(MediaError::validation("No files for manifest"));
        }
        let each = (total / files.len() as f64 * 100.0).round() / 100.0;
        let mut manifest = Self::new();
        for file in files {
            manifest.push(file.as_ref(), Some(each))?;
        }
        Ok(manifest)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let mut block = format!("file '{}'", escape(&entry.path));
                if let Some(d) = entry.duration {
                    block.push_str(&format!("\nduration {}", d));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write into `workspace` under a timestamped name and return its path.
    pub fn write_to(&self, workspace: &mut TempWorkspace) -> Result<PathBuf> {
        let name = format!("filelist{}.txt", chrono::Utc::now().timestamp_micros());
        workspace.write(&name, &self.render())
    }
}

// Single quotes inside a quoted concat path are written as '\''
fn escape(path: &Path) -> String {
    path.display().to_string().replace('\'', r"'\''")
}
