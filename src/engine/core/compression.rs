//! Compression adjustment: bias a resolved config toward smaller output.

use super::profile::{EncoderConfig, QualityProfile};
use crate::engine::hardware::{AMF_ENCODER, HardwareClass, QSV_ENCODER};

/// Quality value used when compression is requested.
///
/// Higher values compress harder. Every tier sits above the quality value the same
/// profile resolves to without compression.
pub fn compression_quality(profile: QualityProfile) -> &'static str {
    match profile {
        QualityProfile::Low => "26",
        QualityProfile::Med => "28",
        QualityProfile::High => "30",
    }
}

/// Return a copy of `config` with its quality flag set to the compression tier for `profile`.
///
/// The flag depends on the codec family: `-cq` (NVENC), `-global_quality` (Quick Sync),
/// `-qp_i` and `-qp_p` (AMF), `-qp` (VA-API), `-crf` (libx264). An existing flag is
/// overwritten in place; a missing one is appended. AMD configs have every occurrence
/// rewritten, other families only the first.
pub fn apply_compression(
    config: &EncoderConfig,
    class: HardwareClass,
    profile: QualityProfile,
) -> EncoderConfig {
    let quality = compression_quality(profile);

    match class {
        HardwareClass::Nvidia => config.with_value("-cq", quality),
        HardwareClass::Intel => {
            if config.codec == QSV_ENCODER {
                config.with_value("-global_quality", quality)
            } else {
                config.with_value("-qp", quality)
            }
        }
        HardwareClass::Amd => {
            if config.codec == AMF_ENCODER {
                config
                    .with_value_everywhere("-qp_i", quality)
                    .with_value_everywhere("-qp_p", quality)
            } else {
                config.with_value_everywhere("-qp", quality)
            }
        }
        HardwareClass::Cpu => config.with_value("-crf", quality),
    }
}
