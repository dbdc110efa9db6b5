//! Error types for supervised encodes.

use std::io;
use thiserror::Error;

/// Terminal failures of an encode.
///
/// Detection problems and malformed progress lines never reach this type; they
/// degrade locally.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to start ffmpeg with {encoder}: {source}")]
    Launch {
        encoder: String,
        #[source]
        source: io::Error,
    },

    #[error("CPU fallback also failed to start (first attempt: {first}): {source}")]
    FallbackLaunch {
        first: String,
        #[source]
        source: io::Error,
    },

    #[error("encoding with {encoder} failed with {}", exit_description(.code))]
    Failed { encoder: String, code: Option<i32> },

    #[error("encoding cancelled")]
    Cancelled,

    #[error("encoding timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("ffmpeg I/O error: {0}")]
    Io(#[from] io::Error),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "termination by signal".to_string(),
    }
}

impl EncodeError {
    /// Whether the process started at all
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::Launch { .. } | Self::FallbackLaunch { .. })
    }
}
