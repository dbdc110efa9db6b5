//! Hardware encoder detection and the per-run hardware override

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// NVIDIA NVENC H.264 encoder
pub const NVENC_ENCODER: &str = "h264_nvenc";
/// Intel Quick Sync H.264 encoder
pub const QSV_ENCODER: &str = "h264_qsv";
/// AMD AMF H.264 encoder
pub const AMF_ENCODER: &str = "h264_amf";
/// VA-API H.264 encoder (Intel or AMD, vendor-neutral)
pub const VAAPI_ENCODER: &str = "h264_vaapi";
/// Software H.264 encoder
pub const SOFTWARE_ENCODER: &str = "libx264";

// ============================================================================
// Hardware classes and override requests
// ============================================================================

/// Accelerator family whose encoder will be invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareClass {
    Nvidia,
    Intel,
    Amd,
    Cpu,
}

impl HardwareClass {
    /// Every class, in detection priority order
    pub const ALL: [HardwareClass; 4] = [Self::Nvidia, Self::Intel, Self::Amd, Self::Cpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nvidia => "nvidia",
            Self::Intel => "intel",
            Self::Amd => "amd",
            Self::Cpu => "cpu",
        }
    }

    /// Check if this class encodes on a GPU
    pub fn is_gpu(&self) -> bool {
        !matches!(self, Self::Cpu)
    }

    /// Get user-friendly display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Nvidia => "NVIDIA",
            Self::Intel => "INTEL",
            Self::Amd => "AMD",
            Self::Cpu => "CPU (software)",
        }
    }
}

impl fmt::Display for HardwareClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware mode requested by the user
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HardwareRequest {
    /// Auto-detect the best encoder
    #[default]
    Auto,
    /// Software encoding
    Cpu,
    /// NVIDIA NVENC
    #[value(alias = "nv")]
    #[serde(alias = "nv")]
    Nvidia,
    /// Intel Quick Sync (iGPU)
    #[value(alias = "qsv")]
    #[serde(alias = "qsv")]
    Intel,
    /// AMD AMF
    Amd,
    /// Any available GPU
    Gpu,
    /// Integrated GPU (Intel/AMD)
    Igpu,
}

impl HardwareRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Nvidia => "nvidia",
            Self::Intel => "intel",
            Self::Amd => "amd",
            Self::Gpu => "gpu",
            Self::Igpu => "igpu",
        }
    }

    /// Whether `selected` satisfies this request.
    ///
    /// Generic requests are satisfied by any GPU class; vendor requests only by that vendor.
    pub fn is_satisfied_by(&self, selected: HardwareClass) -> bool {
        match self {
            Self::Auto => true,
            Self::Cpu => selected == HardwareClass::Cpu,
            Self::Nvidia => selected == HardwareClass::Nvidia,
            Self::Intel => selected == HardwareClass::Intel,
            Self::Amd => selected == HardwareClass::Amd,
            Self::Gpu => selected.is_gpu(),
            Self::Igpu => matches!(selected, HardwareClass::Intel | HardwareClass::Amd),
        }
    }
}

impl fmt::Display for HardwareRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Capability probing
// ============================================================================

/// Source of toolchain capability information.
///
/// Production code shells out to ffmpeg and lspci; tests substitute fixed fixtures.
/// Implementations never fail: a failed query reports nothing detected.
pub trait CapabilityProvider {
    /// Names of the encoders the toolchain reports
    fn list_encoders(&self) -> BTreeSet<String>;

    /// Description of the installed display adapters, if it can be determined
    fn query_vendor(&self) -> Option<String>;
}

impl<T: CapabilityProvider + ?Sized> CapabilityProvider for &T {
    fn list_encoders(&self) -> BTreeSet<String> {
        (**self).list_encoders()
    }

    fn query_vendor(&self) -> Option<String> {
        (**self).query_vendor()
    }
}

/// Capability provider backed by `ffmpeg -encoders` and `lspci`
#[derive(Debug, Clone)]
pub struct FfmpegCapabilities {
    ffmpeg: PathBuf,
}

impl Default for FfmpegCapabilities {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegCapabilities {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Raw output of `ffmpeg -encoders`, or `None` if ffmpeg could not be run
    pub fn encoder_listing(&self) -> Option<String> {
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-encoders"])
            .output();

        match output {
            Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).to_string()),
            Ok(out) => {
                debug!(status = %out.status, "ffmpeg -encoders exited unsuccessfully");
                None
            }
            Err(e) => {
                debug!(error = %e, "failed to run ffmpeg -encoders");
                None
            }
        }
    }
}

impl CapabilityProvider for FfmpegCapabilities {
    fn list_encoders(&self) -> BTreeSet<String> {
        self.encoder_listing()
            .map(|listing| parse_encoder_list(&listing))
            .unwrap_or_default()
    }

    fn query_vendor(&self) -> Option<String> {
        let output = Command::new("lspci").output().ok()?;
        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let adapters: Vec<&str> = stdout
            .lines()
            .filter(|line| {
                let lower = line.to_lowercase();
                lower.contains("vga") || lower.contains("display") || lower.contains("3d")
            })
            .collect();

        if adapters.is_empty() {
            None
        } else {
            Some(adapters.join("\n"))
        }
    }
}

/// Extract encoder names from `ffmpeg -encoders` output.
///
/// Entries follow the `------` separator as `<flags> <name> <description>`. Without a
/// separator every line is treated as an entry, so a bare one-name-per-line list also parses.
pub fn parse_encoder_list(listing: &str) -> BTreeSet<String> {
    let body = match listing.find("------") {
        Some(idx) => listing[idx..].split_once('\n').map_or("", |(_, rest)| rest),
        None => listing,
    };

    body.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let first = tokens.next()?;
            Some(tokens.next().unwrap_or(first).to_string())
        })
        .collect()
}

/// Lines of `ffmpeg -encoders` output describing hardware H.264/H.265 encoders
pub fn hardware_encoder_lines(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter(|line| line.contains("264") || line.contains("265"))
        .filter(|line| {
            ["nvenc", "qsv", "amf", "vaapi"]
                .iter()
                .any(|family| line.contains(family))
        })
        .map(|line| line.trim().to_string())
        .collect()
}

/// Snapshot of the encoders a toolchain offers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    encoders: BTreeSet<String>,
}

impl Capabilities {
    pub fn new(encoders: BTreeSet<String>) -> Self {
        Self { encoders }
    }

    pub fn from_encoders<I, S>(encoders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(encoders.into_iter().map(Into::into).collect())
    }

    /// Check if the named encoder is available
    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.contains(name)
    }

    pub fn encoders(&self) -> &BTreeSet<String> {
        &self.encoders
    }
}

/// Map a display adapter description to a VA-API capable class.
///
/// Unknown vendors default to Intel.
fn vendor_class(description: Option<&str>) -> HardwareClass {
    let Some(description) = description else {
        return HardwareClass::Intel;
    };

    let lower = description.to_lowercase();
    if lower.contains("intel") {
        HardwareClass::Intel
    } else if lower.contains("amd")
        || lower.contains("radeon")
        || lower.contains("advanced micro devices")
    {
        HardwareClass::Amd
    } else {
        HardwareClass::Intel
    }
}

// ============================================================================
// Hardware session
// ============================================================================

/// Hardware classification scope for one run.
///
/// Holds the forced-hardware override and caches probe results, so a run probes the
/// toolchain at most once. Embedders serving several runs give each its own session.
#[derive(Debug)]
pub struct HardwareSession<P = FfmpegCapabilities> {
    provider: P,
    forced: Option<HardwareClass>,
    capabilities: OnceLock<Capabilities>,
    vendor: OnceLock<Option<String>>,
}

impl Default for HardwareSession<FfmpegCapabilities> {
    fn default() -> Self {
        Self::new(FfmpegCapabilities::default())
    }
}

impl<P: CapabilityProvider> HardwareSession<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            forced: None,
            capabilities: OnceLock::new(),
            vendor: OnceLock::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Currently forced class, if any
    pub fn forced(&self) -> Option<HardwareClass> {
        self.forced
    }

    /// Encoder capabilities, probed on first use
    pub fn capabilities(&self) -> &Capabilities {
        self.capabilities.get_or_init(|| {
            let caps = Capabilities::new(self.provider.list_encoders());
            debug!(encoders = caps.encoders().len(), "probed encoder capabilities");
            caps
        })
    }

    /// Class to use for the vendor-neutral VA-API encoder
    fn vaapi_class(&self) -> HardwareClass {
        let vendor = self.vendor.get_or_init(|| self.provider.query_vendor());
        let class = vendor_class(vendor.as_deref());
        debug!(?class, vendor = vendor.as_deref().unwrap_or("unknown"), "disambiguated VA-API vendor");
        class
    }

    /// Best available class, ignoring any override.
    ///
    /// Priority: NVENC, then Quick Sync, then AMF, then VA-API (vendor looked up), then CPU.
    pub fn detect(&self) -> HardwareClass {
        let caps = self.capabilities();
        if caps.has_encoder(NVENC_ENCODER) {
            HardwareClass::Nvidia
        } else if caps.has_encoder(QSV_ENCODER) {
            HardwareClass::Intel
        } else if caps.has_encoder(AMF_ENCODER) {
            HardwareClass::Amd
        } else if caps.has_encoder(VAAPI_ENCODER) {
            self.vaapi_class()
        } else {
            HardwareClass::Cpu
        }
    }

    /// Class for the next encode: the override if set, otherwise the detected class
    pub fn classify(&self) -> HardwareClass {
        if let Some(forced) = self.forced {
            return forced;
        }
        let class = self.detect();
        debug!(?class, "classified hardware");
        class
    }

    /// Force a hardware mode, resolved to an available class.
    ///
    /// Unavailable vendors fall back to VA-API and then to CPU. The returned class may
    /// differ from the request; use [`HardwareRequest::is_satisfied_by`] to detect that.
    /// `Auto` clears the override and returns the detected class.
    pub fn set_override(&mut self, request: HardwareRequest) -> HardwareClass {
        if request == HardwareRequest::Auto {
            self.forced = None;
            return self.classify();
        }

        let caps = self.capabilities();
        let vaapi = caps.has_encoder(VAAPI_ENCODER);

        let class = match request {
            HardwareRequest::Auto | HardwareRequest::Gpu => self.detect(),
            HardwareRequest::Cpu => HardwareClass::Cpu,
            HardwareRequest::Nvidia => {
                if caps.has_encoder(NVENC_ENCODER) {
                    HardwareClass::Nvidia
                } else if vaapi {
                    self.vaapi_class()
                } else {
                    HardwareClass::Cpu
                }
            }
            HardwareRequest::Intel => {
                if caps.has_encoder(QSV_ENCODER) || vaapi {
                    HardwareClass::Intel
                } else {
                    HardwareClass::Cpu
                }
            }
            HardwareRequest::Amd => {
                if caps.has_encoder(AMF_ENCODER) || vaapi {
                    HardwareClass::Amd
                } else {
                    HardwareClass::Cpu
                }
            }
            HardwareRequest::Igpu => {
                if caps.has_encoder(QSV_ENCODER) {
                    HardwareClass::Intel
                } else if caps.has_encoder(AMF_ENCODER) {
                    HardwareClass::Amd
                } else if vaapi {
                    self.vaapi_class()
                } else {
                    HardwareClass::Cpu
                }
            }
        };

        debug!(%request, ?class, "hardware override set");
        self.forced = Some(class);
        class
    }

    /// Clear the override and cached probe results; the next classification probes again
    pub fn reset_override(&mut self) {
        self.forced = None;
        self.capabilities = OnceLock::new();
        self.vendor = OnceLock::new();
    }

    /// Every available class, in priority order, always ending with CPU
    pub fn list_available(&self) -> Vec<HardwareClass> {
        let caps = self.capabilities();
        let mut available = Vec::new();

        if caps.has_encoder(NVENC_ENCODER) {
            available.push(HardwareClass::Nvidia);
        }
        if caps.has_encoder(QSV_ENCODER) {
            available.push(HardwareClass::Intel);
        }
        if caps.has_encoder(AMF_ENCODER) {
            available.push(HardwareClass::Amd);
        }
        if caps.has_encoder(VAAPI_ENCODER) {
            let class = self.vaapi_class();
            if !available.contains(&class) {
                available.push(class);
            }
        }
        available.push(HardwareClass::Cpu);
        available
    }
}
