//! Scoped temporary working directories for multi-step operations.
//!
//! A [`TempWorkspace`] owns one uniquely named directory under the configured
//! root. Every artifact placed in it is recorded, and on drop the recorded
//! artifacts and the directory itself are removed, whether the operation that
//! owned the workspace succeeded or failed. Cleanup never fails the caller:
//! items that are already gone are skipped and other errors are logged.
//!
//! # Example
//!
//! ```no_run
//! use ffcompose::{TempWorkspace, WorkspaceConfig};
//!
//! let mut ws = TempWorkspace::create(&WorkspaceConfig::default(), Some("concat"))?;
//! let list = ws.write("filelist.txt", "file '/videos/a.mp4'\n")?;
//! // hand `list` to the engine ...
//! drop(ws); // list and directory are gone
//! # Ok::<(), ffcompose::MediaError>(())
//! ```

use crate::error::{MediaError, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const DEFAULT_HINT: &str = "ffcompose";

/// Where workspaces are created. `None` means the system temp directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub root: Option<PathBuf>,
}

impl WorkspaceConfig {
    pub fn in_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

pub struct TempWorkspace {
    dir: Option<TempDir>,
    path: PathBuf,
    artifacts: Vec<PathBuf>,
}

impl TempWorkspace {
    pub fn create(config: &WorkspaceConfig, hint: Option<&str>) -> Result<Self> {
        let prefix = format!("{}-", sanitize(hint.unwrap_or(DEFAULT_HINT)));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match &config.root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| MediaError::Resource(format!("Failed to create workspace: {}", e)))?;

        let path = dir.path().to_path_buf();
        debug!("Created workspace {:?}", path);

        Ok(Self {
            dir: Some(dir),
            path,
            artifacts: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.path
    }

    /// Path of `name` inside the workspace. Nothing is created.
    pub fn path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Record `name` as an artifact to remove on cleanup and return its path.
    pub fn track(&mut self, name: &str) -> PathBuf {
        let path = self.path(name);
        self.artifacts.push(path.clone());
        path
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Copy `src` into the workspace as `name`.
    pub fn copy_in(&mut self, src: &Path, name: &str) -> Result<PathBuf> {
        let dest = self.track(name);
        std::fs::copy(src, &dest).map_err(|e| {
            MediaError::Resource(format!("Failed to copy {:?} to {:?}: {}", src, dest, e))
        })?;
        Ok(dest)
    }

    /// Write `contents` into the workspace as `name`.
    pub fn write(&mut self, name: &str, contents: &str) -> Result<PathBuf> {
        let dest = self.track(name);
        std::fs::write(&dest, contents)
            .map_err(|e| MediaError::Resource(format!("Failed to write {:?}: {}", dest, e)))?;
        Ok(dest)
    }

    /// Remove every artifact and the directory now.
    pub fn close(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        for artifact in self.artifacts.drain(..) {
            match std::fs::remove_file(&artifact) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {:?}: {}", artifact, e),
            }
        }

        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed workspace {:?}", self.path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove workspace {:?}: {}", self.path, e),
            }
        }
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn sanitize(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_HINT.to_string()
    } else {
        cleaned
    }
}
