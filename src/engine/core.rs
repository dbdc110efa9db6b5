mod compression;
mod error;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod output;
mod profile;
mod types;

pub use compression::{apply_compression, compression_quality};
pub use error::EncodeError;
pub use ffmpeg_cmd::{
    CancelToken, EncodeJob, EncodeLauncher, EncodeProcess, EncodeSupervisor, ExitReport,
    FfmpegLauncher, Invocation, build_args, format_ffmpeg_cmd, scale_filter,
};
pub use ffmpeg_info::{ffmpeg_version, ffprobe_version};
pub use output::derive_output_path;
pub use profile::{EncoderConfig, QualityProfile, resolve};
pub use types::{EncodeEvent, EncodeOutcome, EncodeState, ProgressParser};
