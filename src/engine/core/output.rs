use std::path::{Path, PathBuf};

use crate::engine::scale::Resolution;

/// Input extensions stripped before the output suffix is appended (case-insensitive)
const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "mov", "avi", "mkv", "webm", "flv", "wmv"];

/// Derive the output path for an encode of `input`.
///
/// `clip.mkv` scaled to 1280x720 and compressed becomes `clip-1280x720-compressed.mp4`.
/// A plain re-encode gets a `-reencoded` suffix so it never targets the input itself.
pub fn derive_output_path(input: &Path, target: Option<Resolution>, compress: bool) -> PathBuf {
    let is_video = input
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()));

    let base = if is_video {
        input.with_extension("")
    } else {
        input.to_path_buf()
    };

    let mut suffixes = Vec::new();
    if let Some(target) = target {
        suffixes.push(target.to_string());
    }
    if compress {
        suffixes.push("compressed".to_string());
    }
    if suffixes.is_empty() {
        suffixes.push("reencoded".to_string());
    }

    let mut name = base.into_os_string();
    name.push("-");
    name.push(suffixes.join("-"));
    name.push(".mp4");
    PathBuf::from(name)
}
