use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vr::engine::hardware::HardwareRequest;

#[derive(Parser)]
#[command(name = "vr")]
#[command(version, about = "Video rescaler with hardware-accelerated encoding", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Input video file
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Quality profile: low, med or high (anything else means med). May come before INPUT.
    #[arg(value_name = "PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Downscale one step (x2/3)
    #[arg(short, long, conflicts_with = "upscale")]
    pub downscale: bool,

    /// Upscale one step (x1.5)
    #[arg(short, long, conflicts_with = "downscale")]
    pub upscale: bool,

    /// Hardware to encode on (overrides config)
    #[arg(long, value_enum, value_name = "MODE")]
    pub hw: Option<HardwareRequest>,

    /// Raise the quantizer for a smaller output
    #[arg(short, long)]
    pub compress: bool,

    /// Print the ffmpeg command without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Kill the encode after this many seconds; 0 disables the limit (overrides config)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

const PROFILE_TOKENS: [&str; 3] = ["low", "med", "high"];

fn is_profile_token(arg: &Path) -> bool {
    arg.to_str().is_some_and(|s| PROFILE_TOKENS.contains(&s))
}

impl Cli {
    /// Input path and profile, accepting the profile token on either side of the input
    pub fn input_and_profile(&self) -> (Option<&Path>, Option<&str>) {
        let input = self.input.as_deref();
        let profile = self.profile.as_deref();

        match input {
            Some(first) if is_profile_token(first) => {
                let input = profile.map(Path::new).filter(|p| !is_profile_token(p));
                (input, first.to_str())
            }
            _ => (input, profile),
        }
    }

    /// Encode deadline: `--timeout 0` disables it, no flag defers to `fallback`
    pub fn encode_timeout(&self, fallback: Option<Duration>) -> Option<Duration> {
        match self.timeout {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => fallback,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the hardware encoders ffmpeg reports
    ListGpus,

    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Probe a video file for its resolution and duration
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
