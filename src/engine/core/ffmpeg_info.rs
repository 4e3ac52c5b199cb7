use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Location of the ffmpeg executable used for probing, capability checks and conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    program: PathBuf,
}

impl Engine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Fresh command for the engine. ffmpeg never gets our stdin, otherwise it
    /// would swallow keypresses meant for the terminal.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// Check if ffmpeg is available and return its version line
pub fn ffmpeg_version(engine: &Engine) -> Result<String> {
    let output = engine
        .command()
        .arg("-version")
        .output()
        .with_context(|| {
            format!(
                "Failed to execute {}. Is ffmpeg installed and in PATH?",
                engine.program().display()
            )
        })?;

    if !output.status.success() {
        anyhow::bail!("ffmpeg command failed with status: {}", output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}
