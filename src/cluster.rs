//! Spatial-color k-means: groups sprite pixels into color families using
//! `(L, a, b, w·x, w·y)` points so that similar colors far apart can split.

use palette::Lab;
use tracing::debug;

use crate::rng::Prng;
use crate::sprite::Sprite;

/// Lloyd passes per clustering run.
pub const ITERATIONS: usize = 8;

type Point = [f32; 5];

/// Result of one clustering pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FamilyClustering {
    /// Family per pixel; `None` for pixels that did not take part.
    pub assignment: Vec<Option<usize>>,
    /// Lab centroid per family.
    pub centroids: Vec<Lab>,
    /// Mean normalized `(x, y)` of each family's pixels.
    pub positions: Vec<Option<[f32; 2]>>,
    /// Pixel count per family.
    pub counts: Vec<usize>,
}

/// Cluster the participating pixels of `sprite` into at most `k` families.
pub fn cluster_families(
    sprite: &Sprite,
    edit_protected: bool,
    k: usize,
    spatial_weight: f32,
    rng: &mut Prng,
) -> FamilyClustering {
    let width = sprite.width() as usize;
    let mut points: Vec<Point> = Vec::new();
    let mut pixels: Vec<usize> = Vec::new();
    for (p, lab) in sprite.labs().iter().enumerate() {
        if !sprite.participates(p, edit_protected) {
            continue;
        }
        let x = (p % width) as f32;
        let y = (p / width) as f32;
        points.push([lab.l, lab.a, lab.b, spatial_weight * x, spatial_weight * y]);
        pixels.push(p);
    }

    let mut result = FamilyClustering {
        assignment: vec![None; sprite.len()],
        ..Default::default()
    };
    if points.is_empty() {
        debug!("no pixels available for clustering");
        return result;
    }

    let (labels, centers) = kmeans(&points, k, rng);
    let k = centers.len();

    let mut sums = vec![[0.0f64; 2]; k];
    let mut counts = vec![0usize; k];
    for (&p, &label) in pixels.iter().zip(&labels) {
        result.assignment[p] = Some(label);
        sums[label][0] += (p % width) as f64;
        sums[label][1] += (p / width) as f64;
        counts[label] += 1;
    }

    let (w, h) = (sprite.width() as f64, sprite.height() as f64);
    result.centroids = centers.iter().map(|c| Lab::new(c[0], c[1], c[2])).collect();
    result.positions = sums
        .iter()
        .zip(&counts)
        .map(|(s, &n)| {
            (n > 0).then(|| [(s[0] / n as f64 / w) as f32, (s[1] / n as f64 / h) as f32])
        })
        .collect();
    result.counts = counts;
    debug!(families = k, pixels = points.len(), "clustering done");
    result
}

/// Plain Lloyd's k-means with PRNG-sampled initial centers.
///
/// `k` is clamped to `1..=points.len()`. Centers that lose all their points
/// keep their previous position. Returns the label per point and the centers.
pub fn kmeans(points: &[Point], k: usize, rng: &mut Prng) -> (Vec<usize>, Vec<Point>) {
    if points.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let k = k.clamp(1, points.len());
    let mut centers: Vec<Point> = (0..k).map(|_| points[rng.next_index(points.len())]).collect();
    let mut labels = vec![0usize; points.len()];

    for _ in 0..ITERATIONS {
        for (label, u) in labels.iter_mut().zip(points) {
            *label = nearest_center(u, &centers);
        }

        let mut sums = vec![[0.0f32; 5]; k];
        let mut counts = vec![0usize; k];
        for (&label, u) in labels.iter().zip(points) {
            for (s, v) in sums[label].iter_mut().zip(u) {
                *s += v;
            }
            counts[label] += 1;
        }
        for ((center, sum), &n) in centers.iter_mut().zip(&sums).zip(&counts) {
            if n > 0 {
                for (c, s) in center.iter_mut().zip(sum) {
                    *c = s / n as f32;
                }
            }
        }
    }
    (labels, centers)
}

/// Index of the closest center; ties go to the lowest index.
#[inline]
fn nearest_center(u: &Point, centers: &[Point]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, v) in centers.iter().enumerate() {
        let d: f32 = u.iter().zip(v).map(|(a, b)| (a - b) * (a - b)).sum();
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn two_tone_sprite() -> Sprite {
        // Left half red, right half blue, with one transparent corner.
        let mut img = RgbaImage::from_pixel(8, 4, Rgba([220, 30, 30, 255]));
        for y in 0..4 {
            for x in 4..8 {
                img.put_pixel(x, y, Rgba([30, 30, 220, 255]));
            }
        }
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        Sprite::new(img, 8).unwrap()
    }

    #[test]
    fn same_seed_same_result() {
        let sprite = two_tone_sprite();
        let a = cluster_families(&sprite, false, 4, 0.6, &mut Prng::new(9));
        let b = cluster_families(&sprite, false, 4, 0.6, &mut Prng::new(9));
        assert_eq!(a.assignment, b.assignment);
        let bits = |c: &FamilyClustering| {
            c.centroids
                .iter()
                .map(|l| [l.l.to_bits(), l.a.to_bits(), l.b.to_bits()])
                .collect::<Vec<_>>()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn separates_distinct_colors() {
        let sprite = two_tone_sprite();
        let c = cluster_families(&sprite, false, 2, 0.0, &mut Prng::new(3));
        assert_eq!(c.assignment[0], None);
        let red = c.assignment[1].unwrap();
        let blue = c.assignment[4].unwrap();
        // With only two distinct colors, two seeds may land on the same color;
        // either way every pixel of one color shares a family.
        for y in 0..4usize {
            for x in 0..8usize {
                let p = y * 8 + x;
                if p == 0 {
                    continue;
                }
                let expected = if x < 4 { red } else { blue };
                assert_eq!(c.assignment[p], Some(expected));
            }
        }
    }

    #[test]
    fn k_is_clamped_to_point_count() {
        let img = RgbaImage::from_pixel(2, 1, Rgba([120, 200, 40, 255]));
        let sprite = Sprite::new(img, 8).unwrap();
        let c = cluster_families(&sprite, false, 50, 0.6, &mut Prng::new(1));
        assert_eq!(c.centroids.len(), 2);
        assert_eq!(c.counts.iter().sum::<usize>(), 2);
    }

    #[test]
    fn no_participants_is_empty() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        let sprite = Sprite::new(img, 8).unwrap();
        let c = cluster_families(&sprite, false, 4, 0.6, &mut Prng::new(1));
        assert!(c.centroids.is_empty());
        assert!(c.assignment.iter().all(Option::is_none));

        let c = cluster_families(&sprite, true, 4, 0.6, &mut Prng::new(1));
        assert_eq!(c.counts.iter().sum::<usize>(), 9);
        assert!(c.assignment.iter().all(Option::is_some));
    }

    #[test]
    fn empty_center_keeps_position() {
        // Both seeds land on the same point; the second center never wins a point.
        let points = vec![[50.0, 0.0, 0.0, 0.0, 0.0]; 3];
        let (labels, centers) = kmeans(&points, 2, &mut Prng::new(5));
        assert_eq!(labels, vec![0, 0, 0]);
        assert_eq!(centers[1], [50.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
