//! Quality presets for the RTMP encoder
//!
//! A fixed catalog mapping a preset id to bitrate ceiling, buffer size and
//! output resolution.

use serde::Serialize;

/// Preset used when nothing else is selected, and as the fallback for
/// unknown ids at launch time.
pub const DEFAULT_QUALITY: &str = "high";

/// Encoding parameters for one quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityPreset {
    pub id: &'static str,
    pub name: &'static str,
    /// Passed to `-maxrate`, e.g. "3000k"
    pub max_bitrate: &'static str,
    /// Passed to `-bufsize`
    pub buffer_size: &'static str,
    /// Passed to `-s`, e.g. "1920x1080"
    pub resolution: &'static str,
    pub description: &'static str,
}

const PRESETS: &[QualityPreset] = &[
    QualityPreset {
        id: "low",
        name: "Low",
        max_bitrate: "1000k",
        buffer_size: "2000k",
        resolution: "960x540",
        description: "540p, for slow connections",
    },
    QualityPreset {
        id: "medium",
        name: "Medium",
        max_bitrate: "2000k",
        buffer_size: "4000k",
        resolution: "1280x720",
        description: "720p, balanced",
    },
    QualityPreset {
        id: "high",
        name: "High",
        max_bitrate: "3000k",
        buffer_size: "6000k",
        resolution: "1920x1080",
        description: "1080p, current default",
    },
    QualityPreset {
        id: "ultra",
        name: "Ultra",
        max_bitrate: "5000k",
        buffer_size: "10000k",
        resolution: "1920x1080",
        description: "1080p high quality",
    },
];

/// All presets, lowest bitrate first
pub fn presets() -> &'static [QualityPreset] {
    PRESETS
}

/// Look up a preset by id
pub fn find_preset(id: &str) -> Option<&'static QualityPreset> {
    PRESETS.iter().find(|p| p.id == id)
}

pub fn is_known_quality(id: &str) -> bool {
    find_preset(id).is_some()
}

/// Look up a preset, falling back to [`DEFAULT_QUALITY`] for unknown ids.
pub fn preset_or_default(id: &str) -> &'static QualityPreset {
    match find_preset(id) {
        Some(preset) => preset,
        None => {
            tracing::warn!(quality = id, "Unknown quality preset, using {}", DEFAULT_QUALITY);
            default_preset()
        }
    }
}

fn default_preset() -> &'static QualityPreset {
    // DEFAULT_QUALITY is the third catalog entry
    &PRESETS[2]
}
