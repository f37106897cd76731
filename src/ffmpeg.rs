//! FFmpeg command construction and invocation

use std::fmt::Display;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("FFmpeg not found: {0}")]
    NotInstalled(String),

    #[error("FFmpeg execution failed ({args}): {output}")]
    ExecutionFailed { args: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered FFmpeg argument list.
///
/// Every flag that takes a value is pushed together with that value, so a
/// flag can never be separated from its argument. The output path goes last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FfmpegCommand {
    args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    /// Overwrite the output without asking.
    pub fn overwrite(self) -> Self {
        self.flag("-y")
    }

    /// Valueless flag such as `-re`.
    pub fn flag(mut self, flag: &str) -> Self {
        self.args.push(flag.to_string());
        self
    }

    /// Flag immediately followed by its single value.
    pub fn arg(self, flag: &str, value: impl Display) -> Self {
        self.append(flag, [value])
    }

    /// Flag immediately followed by all of its values.
    pub fn append<I, V>(mut self, flag: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        self.args.push(flag.to_string());
        self.args.extend(values.into_iter().map(|v| v.to_string()));
        self
    }

    /// Flag followed by a value, only when the value is present.
    pub fn arg_opt(self, flag: &str, value: Option<impl Display>) -> Self {
        match value {
            Some(v) => self.arg(flag, v),
            None => self,
        }
    }

    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.arg("-i", path.as_ref().display())
    }

    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }

    /// Value following the first occurrence of `flag`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl Display for FfmpegCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// Result of one engine run.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub success: bool,
    pub output: String,
}

impl EngineOutput {
    /// Turn a non-success run into an error carrying the raw diagnostic.
    pub fn check(self, command: &FfmpegCommand) -> Result<EngineOutput, FfmpegError> {
        if self.success {
            Ok(self)
        } else {
            Err(FfmpegError::ExecutionFailed {
                args: command.to_string(),
                output: self.output,
            })
        }
    }
}

/// Executes a built argument list.
pub trait Engine {
    fn execute(&self, command: &FfmpegCommand) -> Result<EngineOutput, FfmpegError>;
}

impl<T: Engine + ?Sized> Engine for &T {
    fn execute(&self, command: &FfmpegCommand) -> Result<EngineOutput, FfmpegError> {
        (**self).execute(command)
    }
}

/// Engine backed by the system `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: String,
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Engine for FfmpegEngine {
    fn execute(&self, command: &FfmpegCommand) -> Result<EngineOutput, FfmpegError> {
        debug!("{} {}", self.binary, command);

        let output = Command::new(&self.binary)
            .args(command.args())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FfmpegError::NotInstalled(self.binary.clone())
                } else {
                    FfmpegError::Io(e)
                }
            })?;

        Ok(EngineOutput {
            success: output.status.success(),
            output: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
