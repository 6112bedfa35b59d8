//! Normal → shiny color statistics learned from paired reference textures.
//!
//! Normal colors are bucketed at 4 bits per channel; each bucket averages the
//! normal Lab, the shiny Lab at the same texel and (optionally) where in the
//! texture the bucket occurs.

use std::collections::HashMap;

use image::RgbaImage;
use palette::Lab;
use tracing::{debug, warn};

use crate::color::rgb_to_lab;
use crate::error::{Error, Result};

/// Texels with alpha below this in either image are ignored.
pub const VISIBLE_ALPHA: u8 = 16;

/// A normal texture and its shiny counterpart, same size, aligned texel for texel.
#[derive(Clone, Debug)]
pub struct ReferencePair {
    pub key: String,
    pub normal: RgbaImage,
    pub shiny: RgbaImage,
}

impl ReferencePair {
    pub fn new(key: impl Into<String>, normal: RgbaImage, shiny: RgbaImage) -> Result<Self> {
        let key = key.into();
        if normal.dimensions() != shiny.dimensions() {
            return Err(Error::ReferenceSizeMismatch {
                key,
                normal: normal.dimensions(),
                shiny: shiny.dimensions(),
            });
        }
        Ok(Self { key, normal, shiny })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapEntry {
    pub normal: Lab,
    pub shiny: Lab,
    /// Number of texels averaged into this entry.
    pub weight: u32,
    /// Key of the reference texture the entry came from.
    pub source: String,
    /// Mean normalized `(x, y)` within the source texture.
    pub position: Option<[f32; 2]>,
}

#[derive(Default)]
struct Bucket {
    normal: [f64; 3],
    shiny: [f64; 3],
    pos: [f64; 2],
    count: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceMap {
    entries: Vec<MapEntry>,
}

/// 12-bit quantization code of an RGB triple.
#[inline]
pub fn bucket_code(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 4) << 8) | ((g as u16 >> 4) << 4) | (b as u16 >> 4)
}

impl ReferenceMap {
    /// Build the table from `pairs`.
    ///
    /// Pairs sharing a key feed one bucket set; each key contributes its own
    /// entries, so the table is not deduplicated across textures. Entries come
    /// out grouped by key (first-seen order) and bucket (first-seen order).
    pub fn build(pairs: &[ReferencePair], track_positions: bool) -> Self {
        let mut keys: Vec<&str> = Vec::new();
        for pair in pairs {
            if !keys.contains(&pair.key.as_str()) {
                keys.push(&pair.key);
            }
        }

        let mut entries = Vec::new();
        for key in keys {
            let mut order: Vec<u16> = Vec::new();
            let mut buckets: HashMap<u16, Bucket> = HashMap::new();
            for pair in pairs.iter().filter(|p| p.key == key) {
                if pair.normal.dimensions() != pair.shiny.dimensions() {
                    warn!(key, "skipping reference pair with mismatched sizes");
                    continue;
                }
                accumulate(pair, &mut buckets, &mut order);
            }
            for code in order {
                let b = &buckets[&code];
                let n = b.count as f64;
                let avg = |s: [f64; 3]| Lab::new((s[0] / n) as f32, (s[1] / n) as f32, (s[2] / n) as f32);
                entries.push(MapEntry {
                    normal: avg(b.normal),
                    shiny: avg(b.shiny),
                    weight: b.count,
                    source: key.to_string(),
                    position: track_positions.then(|| [(b.pos[0] / n) as f32, (b.pos[1] / n) as f32]),
                });
            }
        }
        debug!(entries = entries.len(), pairs = pairs.len(), "reference map built");
        Self { entries }
    }

    /// Table built directly from entries.
    pub fn from_entries(entries: Vec<MapEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn accumulate(pair: &ReferencePair, buckets: &mut HashMap<u16, Bucket>, order: &mut Vec<u16>) {
    let (w, h) = pair.normal.dimensions();
    for ((x, y, n), s) in pair.normal.enumerate_pixels().zip(pair.shiny.pixels()) {
        if n[3] < VISIBLE_ALPHA || s[3] < VISIBLE_ALPHA {
            continue;
        }
        let code = bucket_code(n[0], n[1], n[2]);
        let nl = rgb_to_lab(n[0], n[1], n[2]);
        let sl = rgb_to_lab(s[0], s[1], s[2]);
        let bucket = buckets.entry(code).or_insert_with(|| {
            order.push(code);
            Bucket::default()
        });
        for (acc, v) in bucket.normal.iter_mut().zip([nl.l, nl.a, nl.b]) {
            *acc += v as f64;
        }
        for (acc, v) in bucket.shiny.iter_mut().zip([sl.l, sl.a, sl.b]) {
            *acc += v as f64;
        }
        bucket.pos[0] += x as f64 / w as f64;
        bucket.pos[1] += y as f64 / h as f64;
        bucket.count += 1;
    }
}
