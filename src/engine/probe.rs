// Input probing using ffprobe

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

use super::scale::Resolution;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputInfo {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds; `None` when unknown or not positive
    pub duration: Option<f64>,
}

impl InputInfo {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Probe input file using ffprobe to get its video dimensions and duration
pub fn probe_input_info(ffprobe: &Path, input_path: &Path) -> Result<InputInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0", // First video stream only
        ])
        .arg(input_path)
        .output()
        .context("Failed to run ffprobe")?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            input_path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
}

/// Parse ffprobe JSON output (`-show_format -show_streams`)
pub fn parse_probe_json(json_str: &str) -> Result<InputInfo> {
    let json: serde_json::Value =
        serde_json::from_str(json_str).context("Failed to parse ffprobe JSON")?;

    let video_stream = json["streams"]
        .as_array()
        .and_then(|streams| streams.first())
        .context("No video stream found")?;

    let width = video_stream["width"]
        .as_u64()
        .context("Failed to get video width")? as u32;
    let height = video_stream["height"]
        .as_u64()
        .context("Failed to get video height")? as u32;

    // Duration is reported as a string; a missing or non-positive value means unknown
    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(InputInfo {
        width,
        height,
        duration,
    })
}
