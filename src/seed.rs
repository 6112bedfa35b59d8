//! Extended seeds: one shareable string carrying the PRNG seed and every
//! numeric setting, e.g. `1234|ink=8|k=32|sw=0.6|cb=1|ms=0|tol=0|con=1.1|rad=1|blend=45`.

use tracing::debug;

use crate::config::Config;
use crate::rng::{hash_text, parse_seed};

const SEPARATOR: char = '|';

/// Encode `seed` and `config` into an extended seed string.
///
/// Floats use Rust's shortest round-trip formatting, so parsing the string
/// back reproduces the exact same bits.
pub fn serialize(seed: u32, config: &Config) -> String {
    let c = config.clamped();
    format!(
        "{seed}|ink={}|k={}|sw={}|cb={}|ms={}|tol={}|con={}|rad={}|blend={}",
        c.ink_threshold,
        c.family_count,
        c.spatial_weight,
        c.consensus_breadth,
        c.match_spatial_weight,
        c.color_tolerance,
        c.contrast,
        c.smooth_radius,
        c.smooth_blend,
    )
}

/// Decode an extended seed. Settings the string does not mention keep their
/// value from `base`.
///
/// A bare seed (no `|`) is parsed like any seed text. A malformed extended
/// seed falls back to hashing the whole string with `base` unchanged; this
/// never fails.
pub fn parse(text: &str, base: &Config) -> (u32, Config) {
    let text = text.trim();
    if !text.contains(SEPARATOR) {
        return (parse_seed(Some(text)), base.clamped());
    }
    match parse_fields(text, base) {
        Some(parsed) => parsed,
        None => {
            debug!("malformed extended seed, hashing it instead");
            (hash_text(text), base.clamped())
        }
    }
}

fn parse_fields(text: &str, base: &Config) -> Option<(u32, Config)> {
    let mut parts = text.split(SEPARATOR);
    let head = parts.next()?.trim();
    if head.is_empty() {
        return None;
    }
    let seed = parse_seed(Some(head));
    let mut config = *base;
    for part in parts {
        let (key, value) = part.split_once('=')?;
        let value = value.trim();
        match key.trim() {
            "ink" => config.ink_threshold = value.parse().ok()?,
            "k" => config.family_count = value.parse().ok()?,
            "sw" => config.spatial_weight = value.parse().ok()?,
            "cb" => config.consensus_breadth = value.parse().ok()?,
            "ms" => config.match_spatial_weight = value.parse().ok()?,
            "tol" => config.color_tolerance = value.parse().ok()?,
            "con" => config.contrast = value.parse().ok()?,
            "rad" => config.smooth_radius = value.parse().ok()?,
            "blend" => config.smooth_blend = value.parse().ok()?,
            _ => return None,
        }
    }
    Some((seed, config.clamped()))
}
