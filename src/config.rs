use serde::{Deserialize, Serialize};

pub const MAX_INK_THRESHOLD: u8 = 50;
pub const MAX_CONSENSUS_BREADTH: usize = 16;
pub const MAX_SMOOTH_RADIUS: u32 = 8;
pub const DARKNESS_LIMIT: i32 = 40;

/// Every numeric knob of the pipeline. Out-of-range values are clamped by
/// [`Config::clamped`] rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Opaque pixels with `max(r, g, b)` at or below this are protected ink.
    pub ink_threshold: u8,
    /// Target number of color families (K); clustering clamps it to the
    /// number of participating pixels.
    pub family_count: usize,
    /// Scale applied to pixel coordinates in the clustering space.
    pub spatial_weight: f32,
    /// How many reference matches are blended per family.
    pub consensus_breadth: usize,
    /// Weight of reference-texture position when matching.
    pub match_spatial_weight: f32,
    /// Widens the match radius and enables the hue-shift fallback.
    pub color_tolerance: f32,
    /// Global lightness contrast around L = 50.
    pub contrast: f32,
    pub smooth_radius: u32,
    /// Smoothing strength in percent.
    pub smooth_blend: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ink_threshold: 8,
            family_count: 32,
            spatial_weight: 0.6,
            consensus_breadth: 1,
            match_spatial_weight: 0.0,
            color_tolerance: 0.0,
            contrast: 1.1,
            smooth_radius: 1,
            smooth_blend: 45,
        }
    }
}

fn clamp_f32(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

impl Config {
    /// Copy with every field forced into its valid range.
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            ink_threshold: self.ink_threshold.min(MAX_INK_THRESHOLD),
            family_count: self.family_count.max(1),
            spatial_weight: clamp_f32(self.spatial_weight, 0.0, 1.0, d.spatial_weight),
            consensus_breadth: self.consensus_breadth.clamp(1, MAX_CONSENSUS_BREADTH),
            match_spatial_weight: clamp_f32(
                self.match_spatial_weight,
                0.0,
                1.0,
                d.match_spatial_weight,
            ),
            color_tolerance: clamp_f32(self.color_tolerance, 0.0, 1.0, d.color_tolerance),
            contrast: clamp_f32(self.contrast, 0.5, 1.7, d.contrast),
            smooth_radius: self.smooth_radius.min(MAX_SMOOTH_RADIUS),
            smooth_blend: self.smooth_blend.min(100),
        }
    }

    /// Parameters that feed clustering differ.
    pub(crate) fn clustering_differs(&self, other: &Self) -> bool {
        self.family_count != other.family_count || self.spatial_weight != other.spatial_weight
    }

    /// Parameters that feed reference matching differ.
    pub(crate) fn matching_differs(&self, other: &Self) -> bool {
        self.consensus_breadth != other.consensus_breadth
            || self.match_spatial_weight != other.match_spatial_weight
            || self.color_tolerance != other.color_tolerance
    }
}

/// Clamp a per-region darkness delta.
pub fn clamp_darkness(delta: i32) -> i32 {
    delta.clamp(-DARKNESS_LIMIT, DARKNESS_LIMIT)
}
