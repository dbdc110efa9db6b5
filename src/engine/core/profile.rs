//! Quality profiles and per-vendor encoder parameter sets.
//!
//! Each hardware family exposes different quality knobs (`-cq` for NVENC,
//! `-global_quality` for Quick Sync, `-qp_i`/`-qp_p` for AMF, `-qp` for VA-API,
//! `-crf` for libx264), so every family gets its own hand-tuned table.

use std::fmt;

use crate::engine::hardware::{
    AMF_ENCODER, Capabilities, HardwareClass, NVENC_ENCODER, QSV_ENCODER, SOFTWARE_ENCODER,
    VAAPI_ENCODER,
};

/// Speed/quality trade-off point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QualityProfile {
    /// Fast encoding, lower quality
    Low,
    /// Balanced encoding
    #[default]
    Med,
    /// Slow encoding, highest quality
    High,
}

impl QualityProfile {
    pub const ALL: [QualityProfile; 3] = [Self::Low, Self::Med, Self::High];

    /// Parse a profile token. Only the exact tokens `low` and `high` select those
    /// profiles; anything else (including `LOW` or an empty string) is `Med`.
    pub fn parse(token: &str) -> Self {
        match token {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Med,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Med => "med",
            Self::High => "high",
        }
    }
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete encoder choice: codec name plus ordered flag/value argument pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub codec: String,
    pub params: Vec<String>,
}

impl EncoderConfig {
    pub fn new(codec: &str, params: &[&str]) -> Self {
        Self {
            codec: codec.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Value following the first occurrence of `flag`
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.params
            .chunks_exact(2)
            .find(|pair| pair[0] == flag)
            .map(|pair| pair[1].as_str())
    }

    /// Copy with the first `flag` set to `value`, appending the pair if absent
    pub fn with_value(&self, flag: &str, value: &str) -> Self {
        let mut params = self.params.clone();
        match params.chunks_exact(2).position(|pair| pair[0] == flag) {
            Some(idx) => params[idx * 2 + 1] = value.to_string(),
            None => params.extend([flag.to_string(), value.to_string()]),
        }
        Self {
            codec: self.codec.clone(),
            params,
        }
    }

    /// Copy with every occurrence of `flag` set to `value`, appending the pair if absent
    pub fn with_value_everywhere(&self, flag: &str, value: &str) -> Self {
        let mut params = self.params.clone();
        let mut found = false;
        for pair in params.chunks_exact_mut(2).filter(|pair| pair[0] == flag) {
            pair[1] = value.to_string();
            found = true;
        }
        if !found {
            params.extend([flag.to_string(), value.to_string()]);
        }
        Self {
            codec: self.codec.clone(),
            params,
        }
    }

    /// Codec selection followed by the parameters, ready for the ffmpeg command line
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.params.len() + 2);
        args.push("-c:v".to_string());
        args.push(self.codec.clone());
        args.extend(self.params.iter().cloned());
        args
    }
}

/// Resolve the encoder configuration for a hardware class and profile.
///
/// Total over every input. Intel and AMD consult `caps` to choose between the
/// vendor encoder and the VA-API fallback.
pub fn resolve(caps: &Capabilities, class: HardwareClass, profile: QualityProfile) -> EncoderConfig {
    match class {
        HardwareClass::Nvidia => nvidia_config(profile),
        HardwareClass::Intel => intel_config(caps, profile),
        HardwareClass::Amd => amd_config(caps, profile),
        HardwareClass::Cpu => cpu_config(profile),
    }
}

fn nvidia_config(profile: QualityProfile) -> EncoderConfig {
    match profile {
        QualityProfile::Low => EncoderConfig::new(
            NVENC_ENCODER,
            &["-preset", "p3", "-rc", "vbr", "-cq", "23", "-b_ref_mode", "0"],
        ),
        QualityProfile::High => EncoderConfig::new(
            NVENC_ENCODER,
            &[
                "-preset", "p7", "-rc", "vbr", "-cq", "14", "-tune", "hq", "-multipass",
                "fullres", "-b:v", "0", "-b_ref_mode", "2",
            ],
        ),
        QualityProfile::Med => EncoderConfig::new(
            NVENC_ENCODER,
            &[
                "-preset", "p5", "-rc", "vbr", "-cq", "18", "-tune", "hq", "-b_ref_mode", "1",
            ],
        ),
    }
}

fn intel_config(caps: &Capabilities, profile: QualityProfile) -> EncoderConfig {
    if !caps.has_encoder(QSV_ENCODER) {
        return vaapi_config(profile);
    }

    match profile {
        QualityProfile::Low => EncoderConfig::new(
            QSV_ENCODER,
            &["-preset", "fast", "-global_quality", "23", "-look_ahead", "0"],
        ),
        QualityProfile::High => EncoderConfig::new(
            QSV_ENCODER,
            &[
                "-preset", "slow", "-global_quality", "16", "-look_ahead", "1", "-extbrc", "1",
            ],
        ),
        QualityProfile::Med => EncoderConfig::new(
            QSV_ENCODER,
            &["-preset", "medium", "-global_quality", "20", "-look_ahead", "1"],
        ),
    }
}

fn amd_config(caps: &Capabilities, profile: QualityProfile) -> EncoderConfig {
    if !caps.has_encoder(AMF_ENCODER) {
        return vaapi_config(profile);
    }

    match profile {
        QualityProfile::Low => EncoderConfig::new(
            AMF_ENCODER,
            &[
                "-usage", "ultralowlatency", "-quality", "speed", "-qp_i", "23", "-qp_p", "23",
            ],
        ),
        QualityProfile::High => EncoderConfig::new(
            AMF_ENCODER,
            &[
                "-usage", "transcoding", "-quality", "quality", "-qp_i", "16", "-qp_p", "16",
                "-preanalysis", "1",
            ],
        ),
        QualityProfile::Med => EncoderConfig::new(
            AMF_ENCODER,
            &[
                "-usage", "transcoding", "-quality", "balanced", "-qp_i", "20", "-qp_p", "20",
            ],
        ),
    }
}

fn vaapi_config(profile: QualityProfile) -> EncoderConfig {
    match profile {
        QualityProfile::Low => EncoderConfig::new(
            VAAPI_ENCODER,
            &["-compression_level", "1", "-qp", "23", "-quality", "speed"],
        ),
        QualityProfile::High => EncoderConfig::new(
            VAAPI_ENCODER,
            &["-compression_level", "7", "-qp", "16", "-quality", "quality"],
        ),
        QualityProfile::Med => EncoderConfig::new(
            VAAPI_ENCODER,
            &["-compression_level", "3", "-qp", "20", "-quality", "balanced"],
        ),
    }
}

fn cpu_config(profile: QualityProfile) -> EncoderConfig {
    match profile {
        QualityProfile::Low => EncoderConfig::new(
            SOFTWARE_ENCODER,
            &["-preset", "fast", "-crf", "23", "-tune", "fastdecode"],
        ),
        QualityProfile::High => EncoderConfig::new(
            SOFTWARE_ENCODER,
            &[
                "-preset", "veryslow", "-crf", "14", "-tune", "film", "-x264-params",
                "ref=6:bframes=8",
            ],
        ),
        QualityProfile::Med => EncoderConfig::new(
            SOFTWARE_ENCODER,
            &["-preset", "slow", "-crf", "16", "-tune", "film"],
        ),
    }
}
