// Target resolution arithmetic for up/down scaling

use serde::{Deserialize, Serialize};
use std::fmt;

/// Narrowest width a scaled output may have
pub const MIN_WIDTH: u32 = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    Down,
    Up,
}

impl ScaleMode {
    fn factor(&self) -> f64 {
        match self {
            Self::Down => 2.0 / 3.0,
            Self::Up => 1.5,
        }
    }

    /// Past-tense label used in run summaries
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Down => "Downscaled",
            Self::Up => "Upscaled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Down => "Downscale",
            Self::Up => "Upscale",
        }
    }
}

/// Compute the target resolution for scaling `source` one step up (x1.5) or down (x2/3).
///
/// Aspect ratio is preserved, both dimensions are rounded down to even values and the
/// width never drops below [`MIN_WIDTH`].
pub fn auto_target(source: Resolution, mode: ScaleMode) -> Resolution {
    if source.width == 0 || source.height == 0 {
        return source;
    }

    let ratio = source.width as f64 / source.height as f64;

    let mut h = (source.height as f64 * mode.factor()).round() as u32;
    let mut w = (h as f64 * ratio).round() as u32;
    w -= w % 2;
    h -= h % 2;

    if w < MIN_WIDTH {
        w = MIN_WIDTH;
        h = (w as f64 / ratio) as u32;
        h -= h % 2;
    }

    Resolution::new(w, h)
}
