//! Post-recolor smoothing guided by the original sprite.
//!
//! The joint bilateral pass averages recolored Lab values but weighs
//! neighbors by how close their *original* lightness is, so banding inside
//! a material smooths out while true material edges stay sharp. The feather
//! pass then pulls pixels on and around ink back toward the original to hide
//! recolor halos on the line art.

use image::{Rgba, RgbaImage};
use palette::Lab;
use tracing::warn;

use crate::color::{lab_to_rgb, rgb_to_lab};

const MIX_LIGHTNESS: f32 = 0.65;
const MIX_CHROMA: f32 = 0.45;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothParams {
    pub radius: u32,
    /// Smoothing strength in `0..=1`.
    pub blend: f32,
    /// Guide pixels at or below this `max(r, g, b)` count as ink.
    pub ink_threshold: u8,
}

impl SmoothParams {
    pub fn new(radius: u32, blend_percent: u32, ink_threshold: u8) -> Self {
        Self {
            radius,
            blend: blend_percent.min(100) as f32 / 100.0,
            ink_threshold,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.radius == 0 && self.blend <= 0.0
    }

    fn amount(&self) -> f32 {
        0.25 + 0.75 * self.blend
    }

    fn sigma_range(&self) -> f32 {
        6.0 + 14.0 * self.blend
    }

    fn sigma_space(&self) -> f32 {
        1.1 + 0.2 * self.radius as f32
    }

    fn feather(&self) -> f32 {
        0.2 + 0.6 * self.blend
    }
}

/// Run both passes; returns `output` unchanged when smoothing is off.
pub fn smooth(output: &RgbaImage, guide: &RgbaImage, params: &SmoothParams) -> RgbaImage {
    if params.is_noop() {
        return output.clone();
    }
    if output.dimensions() != guide.dimensions() {
        warn!("guide size differs from output, skipping smoothing");
        return output.clone();
    }
    let smoothed = joint_bilateral(
        output,
        guide,
        params.radius,
        params.sigma_space(),
        params.sigma_range(),
        params.amount(),
    );
    feather_ink(&smoothed, guide, params.ink_threshold, params.feather())
}

/// Joint bilateral filter in Lab, range weights taken from the guide's
/// lightness. The filtered value is mixed back with the input by `amount`,
/// lightness more strongly than chroma.
pub fn joint_bilateral(
    output: &RgbaImage,
    guide: &RgbaImage,
    radius: u32,
    sigma_space: f32,
    sigma_range: f32,
    amount: f32,
) -> RgbaImage {
    let (w, h) = output.dimensions();
    let r = radius as i64;
    let mut kernel = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    for j in -r..=r {
        for i in -r..=r {
            let d2 = (i * i + j * j) as f32;
            kernel.push((-d2 / (2.0 * sigma_space * sigma_space)).exp());
        }
    }

    let labs: Vec<Lab> = output.pixels().map(|p| rgb_to_lab(p[0], p[1], p[2])).collect();
    let guide_l: Vec<f32> = guide.pixels().map(|p| rgb_to_lab(p[0], p[1], p[2]).l).collect();
    let alpha: Vec<u8> = output.pixels().map(|p| p[3]).collect();
    let two_sr2 = 2.0 * sigma_range * sigma_range;
    let (mix_l, mix_c) = (amount * MIX_LIGHTNESS, amount * MIX_CHROMA);

    let mut result = output.clone();
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let o = (y * w as i64 + x) as usize;
            if alpha[o] == 0 {
                continue;
            }
            let center = labs[o];
            let lg0 = guide_l[o];
            let mut sum = [0.0f32; 3];
            let mut total = 0.0f32;
            let mut k = 0;
            for j in -r..=r {
                for i in -r..=r {
                    let nx = (x + i).clamp(0, w as i64 - 1);
                    let ny = (y + j).clamp(0, h as i64 - 1);
                    let n = (ny * w as i64 + nx) as usize;
                    let ws = kernel[k];
                    k += 1;
                    if alpha[n] == 0 {
                        continue;
                    }
                    let dl = guide_l[n] - lg0;
                    let weight = ws * (-(dl * dl) / two_sr2).exp();
                    sum[0] += labs[n].l * weight;
                    sum[1] += labs[n].a * weight;
                    sum[2] += labs[n].b * weight;
                    total += weight;
                }
            }
            let filtered = if total > 0.0 {
                [sum[0] / total, sum[1] / total, sum[2] / total]
            } else {
                [center.l, center.a, center.b]
            };
            let mixed = Lab::new(
                center.l * (1.0 - mix_l) + filtered[0] * mix_l,
                center.a * (1.0 - mix_c) + filtered[1] * mix_c,
                center.b * (1.0 - mix_c) + filtered[2] * mix_c,
            );
            let [rr, gg, bb] = lab_to_rgb(mixed);
            result.put_pixel(x as u32, y as u32, Rgba([rr, gg, bb, alpha[o]]));
        }
    }
    result
}

/// Blend toward the guide on ink pixels (`feather`) and their 4-neighbors
/// (`feather / 2`).
pub fn feather_ink(output: &RgbaImage, guide: &RgbaImage, ink_threshold: u8, feather: f32) -> RgbaImage {
    let (w, h) = (output.width() as usize, output.height() as usize);
    let ink: Vec<bool> = guide
        .pixels()
        .map(|p| p[3] > 0 && p[0].max(p[1]).max(p[2]) <= ink_threshold)
        .collect();

    let mut result = output.clone();
    for (p, (px, g)) in result.pixels_mut().zip(guide.pixels()).enumerate() {
        if px[3] == 0 {
            continue;
        }
        let (x, y) = (p % w, p / w);
        let weight = if ink[p] {
            feather
        } else if (x > 0 && ink[p - 1])
            || (x + 1 < w && ink[p + 1])
            || (y > 0 && ink[p - w])
            || (y + 1 < h && ink[p + w])
        {
            feather * 0.5
        } else {
            continue;
        };
        for c in 0..3 {
            px[c] = (px[c] as f32 * (1.0 - weight) + g[c] as f32 * weight).round() as u8;
        }
    }
    result
}
