use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

pub const ERROR_LOG_NAME: &str = "ffmpeg_error.log";

/// The failure log lives next to the input file
pub fn error_log_path(input: &Path) -> PathBuf {
    match input.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(ERROR_LOG_NAME),
        _ => PathBuf::from(".").join(ERROR_LOG_NAME),
    }
}

/// Write (overwrite) the failure log for `input`. Returns where it was written.
pub fn write_error_log(input: &Path, body: &str) -> Result<PathBuf> {
    let path = error_log_path(input);
    let mut file = File::create(&path)
        .with_context(|| format!("Failed to create error log at {}", path.display()))?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "[{}] conversion failed for {}", timestamp, input.display())?;
    writeln!(file)?;
    file.write_all(body.as_bytes())?;
    if !body.ends_with('\n') {
        writeln!(file)?;
    }
    Ok(path)
}

/// One engine invocation's contribution to the failure log
pub fn failure_section(command_line: &str, status: &ExitStatus, diagnostics: &str) -> String {
    format!(
        "Command: {}\nExit status: {}\n\n{}\n",
        command_line,
        status,
        diagnostics.trim_end()
    )
}
