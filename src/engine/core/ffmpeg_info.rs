use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version(ffmpeg: &Path) -> Result<String> {
    tool_version(ffmpeg, "ffmpeg")
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version(ffprobe: &Path) -> Result<String> {
    tool_version(ffprobe, "ffprobe")
}

fn tool_version(program: &Path, name: &str) -> Result<String> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {name}. Is {name} installed and in PATH?"))?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", name, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}
