//! Suggests a shiny color for a family centroid from the reference table.
//!
//! Breadth 1 with no spatial or tolerance weighting is a plain nearest-entry
//! lookup. Anything else switches to consensus: score every entry inside an
//! adaptive radius, keep the best N, boost under-represented textures, and
//! blend their shiny colors by score.

use std::collections::HashMap;

use palette::Lab;
use tracing::trace;

use crate::color::{chroma, delta_e, hue, hue_distance, rotate_hue};
use crate::config::Config;
use crate::reference::{MapEntry, ReferenceMap};
use crate::rng::Prng;

/// Heuristic constants of consensus scoring. Defaults reproduce the tuned
/// behavior; they are exposed so they can be adjusted without code changes.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchTuning {
    pub base_radius: f32,
    pub radius_per_candidate: f32,
    /// Converts normalized texture distance into Lab-comparable units.
    pub spatial_scale: f32,
    pub complementary_range: (f32, f32),
    pub complementary_bonus: f32,
    pub analogous_below: f32,
    pub analogous_bonus: f32,
    pub diversity_bonus: f32,
    pub fallback_hue_offsets: Vec<f32>,
    pub fallback_lightness_jitter: f32,
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self {
            base_radius: 20.0,
            radius_per_candidate: 5.0,
            spatial_scale: 100.0,
            complementary_range: (150.0, 210.0),
            complementary_bonus: 1.2,
            analogous_below: 30.0,
            analogous_bonus: 1.1,
            diversity_bonus: 0.3,
            fallback_hue_offsets: vec![-120.0, -60.0, -30.0, 30.0, 60.0, 120.0, 180.0],
            fallback_lightness_jitter: 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchSettings {
    pub breadth: usize,
    pub spatial_weight: f32,
    pub tolerance: f32,
    pub tuning: MatchTuning,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl MatchSettings {
    pub fn from_config(config: &Config) -> Self {
        let c = config.clamped();
        Self {
            breadth: c.consensus_breadth,
            spatial_weight: c.match_spatial_weight,
            tolerance: c.color_tolerance,
            tuning: MatchTuning::default(),
        }
    }

    pub fn uses_consensus(&self) -> bool {
        self.breadth > 1 || self.spatial_weight > 0.0 || self.tolerance > 0.0
    }

    /// Largest color distance a consensus candidate may have.
    pub fn max_distance(&self) -> f32 {
        let t = &self.tuning;
        (t.base_radius + self.breadth as f32 * t.radius_per_candidate) * (1.0 + self.tolerance)
    }
}

struct Candidate<'a> {
    entry: &'a MapEntry,
    score: f32,
}

pub struct ColorMatcher<'a> {
    map: &'a ReferenceMap,
    settings: MatchSettings,
}

impl<'a> ColorMatcher<'a> {
    pub fn new(map: &'a ReferenceMap, settings: MatchSettings) -> Self {
        Self { map, settings }
    }

    /// Shiny color for `query`; `position` is the query's normalized location
    /// in the sprite. `rng` is only drawn from by the tolerance fallback.
    pub fn suggest(&self, query: Lab, position: Option<[f32; 2]>, rng: &mut Prng) -> Lab {
        if self.map.is_empty() {
            return query;
        }
        if !self.settings.uses_consensus() {
            return self.nearest(query).map_or(query, |e| e.shiny);
        }
        self.consensus(query, position, rng)
    }

    /// First entry with the smallest ΔE to `query`.
    pub fn nearest(&self, query: Lab) -> Option<&'a MapEntry> {
        let mut best: Option<&MapEntry> = None;
        let mut best_dist = f32::INFINITY;
        for entry in self.map.entries() {
            let d = delta_e(query, entry.normal);
            if d < best_dist {
                best_dist = d;
                best = Some(entry);
            }
        }
        best
    }

    fn consensus(&self, query: Lab, position: Option<[f32; 2]>, rng: &mut Prng) -> Lab {
        let s = &self.settings;
        let max_distance = s.max_distance();

        let mut candidates: Vec<Candidate<'a>> = self
            .map
            .entries()
            .iter()
            .filter_map(|entry| {
                let color_distance = delta_e(query, entry.normal);
                (color_distance <= max_distance).then(|| {
                    let distance = self.combined_distance(color_distance, position, entry.position);
                    Candidate {
                        entry,
                        score: self.score(entry, distance, query),
                    }
                })
            })
            .collect();

        if candidates.is_empty() {
            return self.fallback(query, rng);
        }
        trace!(candidates = candidates.len(), breadth = s.breadth, "consensus candidates");

        // Stable sort keeps table order among equal scores.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(s.breadth);

        let mut usage: HashMap<&str, u32> = HashMap::new();
        for c in &candidates {
            *usage.entry(c.entry.source.as_str()).or_default() += 1;
        }
        if usage.len() > 1 {
            for c in &mut candidates {
                let used = usage[c.entry.source.as_str()] as f32;
                c.score *= 1.0 + s.tuning.diversity_bonus / used;
            }
            candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        }

        let mut total = 0.0f32;
        let mut acc = [0.0f32; 3];
        for c in &candidates {
            total += c.score;
            acc[0] += c.entry.shiny.l * c.score;
            acc[1] += c.entry.shiny.a * c.score;
            acc[2] += c.entry.shiny.b * c.score;
        }
        if total <= 0.0 || !total.is_finite() {
            return candidates[0].entry.shiny;
        }
        Lab::new(acc[0] / total, acc[1] / total, acc[2] / total)
    }

    fn combined_distance(
        &self,
        color_distance: f32,
        query_pos: Option<[f32; 2]>,
        entry_pos: Option<[f32; 2]>,
    ) -> f32 {
        let w = self.settings.spatial_weight;
        match (query_pos, entry_pos) {
            (Some(q), Some(e)) if w > 0.0 => {
                let dx = q[0] - e[0];
                let dy = q[1] - e[1];
                let spatial = (dx * dx + dy * dy).sqrt() * self.settings.tuning.spatial_scale;
                color_distance * (1.0 - w) + spatial * w
            }
            _ => color_distance,
        }
    }

    fn score(&self, entry: &MapEntry, distance: f32, query: Lab) -> f32 {
        let base = (entry.weight as f32 + 1.0).ln() + 10.0 / (distance + 1.0);
        base * self.harmony(query, entry.shiny)
    }

    /// Multiplier rewarding complementary or analogous hue moves and
    /// preserved saturation between `from` and `to`.
    pub fn harmony(&self, from: Lab, to: Lab) -> f32 {
        let t = &self.settings.tuning;
        let hd = hue_distance(hue(from), hue(to));
        let complementary = if hd > t.complementary_range.0 && hd < t.complementary_range.1 {
            t.complementary_bonus
        } else {
            1.0
        };
        let analogous = if hd < t.analogous_below {
            t.analogous_bonus
        } else {
            1.0
        };
        let (c1, c2) = (chroma(from), chroma(to));
        let ratio = if c1 > 0.0 { (c2 / c1).min(c1 / c2) } else { 1.0 };
        complementary * analogous * (0.5 + 0.5 * ratio)
    }

    /// Nothing close enough: either invent a hue shift (tolerance > 0) or take
    /// the nearest entry however far it is.
    fn fallback(&self, query: Lab, rng: &mut Prng) -> Lab {
        let t = &self.settings.tuning;
        if self.settings.tolerance > 0.0 && !t.fallback_hue_offsets.is_empty() {
            let offset = t.fallback_hue_offsets[rng.next_index(t.fallback_hue_offsets.len())];
            let jitter = (rng.next_f64() as f32 * 2.0 - 1.0) * t.fallback_lightness_jitter;
            let mut shifted = rotate_hue(query, offset);
            shifted.l = (shifted.l + jitter).clamp(0.0, 100.0);
            trace!(offset, jitter, "no reference candidates, shifting hue");
            return shifted;
        }
        self.nearest(query).map_or(query, |e| e.shiny)
    }
}
