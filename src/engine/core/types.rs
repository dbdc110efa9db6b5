use crate::engine::hardware::HardwareClass;

use super::ffmpeg_cmd::Invocation;

/// Lifecycle of one supervised encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeState {
    /// Job accepted, encoder not yet resolved
    Idle,
    Launching(HardwareClass),
    Running(HardwareClass),
    Succeeded,
    Failed,
}

/// Notification emitted by the supervisor while an encode is in flight
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeEvent {
    StateChanged(EncodeState),

    /// The GPU encoder could not be launched; a CPU retry follows
    LaunchFailed { class: HardwareClass, reason: String },

    /// The CPU fallback launched in place of `from`
    Fallback { from: HardwareClass },

    /// Progress update during encoding
    Progress {
        percent: f64,
        out_time_s: f64,
        speed: Option<f64>,
    },
}

/// Result of a successful encode
#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    /// Invocation that actually ran (the CPU one after a fallback)
    pub invocation: Invocation,
    pub fell_back: bool,
    pub out_time_s: f64,
}

/// Parser for ffmpeg progress output (key=value format)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of ffmpeg progress output.
    ///
    /// Returns true when the line advanced the elapsed output time. Malformed and
    /// unknown lines are ignored.
    pub fn parse_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };

        match key.trim() {
            // ffmpeg reports microseconds under both keys
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.trim().parse::<f64>() {
                    if us.is_finite() && us >= 0.0 {
                        // elapsed time never goes backwards
                        self.out_time_us = self.out_time_us.max(us as u64);
                        return true;
                    }
                }
            }
            "fps" => {
                if let Ok(f) = value.trim().parse::<f64>() {
                    self.fps = Some(f);
                }
            }
            "speed" => {
                // Speed is in format "1.23x", strip the 'x'
                let speed_str = value.trim().trim_end_matches('x');
                if let Ok(s) = speed_str.parse::<f64>() {
                    self.speed = Some(s);
                }
            }
            "progress" => {
                if value.trim() == "end" {
                    self.is_complete = true;
                }
            }
            _ => {}
        }
        false
    }

    /// Get output time in seconds
    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Percentage complete given the total source duration, clamped to 100.
    ///
    /// `None` when the duration is unknown or not positive.
    pub fn progress_pct(&self, duration_s: Option<f64>) -> Option<f64> {
        let dur = duration_s.filter(|d| *d > 0.0)?;
        Some((self.out_time_s() / dur * 100.0).min(100.0))
    }
}
