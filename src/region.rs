//! Regions: 4-connected runs of one family, plus the flat arena that carries
//! their edit state (link / keep / lock / override / darkness) and the
//! single-pixel override regions carved out of them.

use std::collections::VecDeque;

use palette::Lab;
use serde::Serialize;

use crate::config::clamp_darkness;

pub type RegionId = usize;

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: RegionId,
    pub family: usize,
    /// Render with the family's shared color instead of `custom`.
    pub linked: bool,
    /// Render the original pixels untouched.
    pub keep: bool,
    /// Refuse color and darkness edits.
    pub lock: bool,
    pub custom: Option<Lab>,
    pub darkness: i32,
    /// Retired (a pixel region merged back into its parent).
    pub deleted: bool,
    /// Set on pixel regions: the region the pixel was carved from.
    pub parent: Option<RegionId>,
}

impl Region {
    fn new(id: RegionId, family: usize) -> Self {
        Self {
            id,
            family,
            linked: true,
            keep: false,
            lock: false,
            custom: None,
            darkness: 0,
            deleted: false,
            parent: None,
        }
    }

    pub fn is_pixel_region(&self) -> bool {
        self.parent.is_some()
    }

    /// Where the region sits in the edit state machine.
    pub fn state(&self) -> RegionState {
        if self.is_pixel_region() {
            RegionState::PixelOverride
        } else if self.linked || self.custom.is_none() {
            RegionState::AutoLinked
        } else {
            RegionState::Custom
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RegionState {
    AutoLinked,
    Custom,
    PixelOverride,
}

/// Region arena plus the per-pixel region id map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionMap {
    width: usize,
    height: usize,
    ids: Vec<Option<RegionId>>,
    regions: Vec<Region>,
}

impl RegionMap {
    /// Flood-fill `assignment` into regions.
    ///
    /// Raster scan; every unvisited assigned pixel seeds a breadth-first fill
    /// over 4-neighbors of the same family. Region ids follow scan order.
    pub fn segment(assignment: &[Option<usize>], width: usize, height: usize) -> Self {
        let mut ids: Vec<Option<RegionId>> = vec![None; assignment.len()];
        let mut regions = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..assignment.len() {
            let Some(family) = assignment[start] else {
                continue;
            };
            if ids[start].is_some() {
                continue;
            }
            let rid = regions.len();
            ids[start] = Some(rid);
            queue.push_back(start);

            while let Some(p) = queue.pop_front() {
                let (x, y) = (p % width, p / width);
                let neighbors = [
                    (x + 1 < width).then(|| p + 1),
                    (x > 0).then(|| p - 1),
                    (y + 1 < height).then(|| p + width),
                    (y > 0).then(|| p - width),
                ];
                for np in neighbors.into_iter().flatten() {
                    if ids[np].is_none() && assignment[np] == Some(family) {
                        ids[np] = Some(rid);
                        queue.push_back(np);
                    }
                }
            }
            regions.push(Region::new(rid, family));
        }

        Self {
            width,
            height,
            ids,
            regions,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Region id per pixel.
    pub fn ids(&self) -> &[Option<RegionId>] {
        &self.ids
    }

    /// Every region record, deleted ones included.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn live(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(|r| !r.deleted)
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id).filter(|r| !r.deleted)
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.get_mut(id).filter(|r| !r.deleted)
    }

    pub fn region_at(&self, x: usize, y: usize) -> Option<RegionId> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.ids[y * self.width + x]
    }

    /// Move pixel `p` into a fresh one-pixel region with its own color.
    ///
    /// The new region keeps the family of the region it was carved from so it
    /// can be linked back later.
    pub fn carve_pixel(&mut self, p: usize, color: Lab) -> Option<RegionId> {
        let parent_id = self.ids.get(p).copied().flatten()?;
        let parent = self.get(parent_id)?;
        let family = parent.family;
        // Re-carving inside a pixel region just recolors it.
        if parent.is_pixel_region() {
            let region = self.get_mut(parent_id)?;
            region.custom = Some(color);
            region.linked = false;
            return Some(parent_id);
        }

        let rid = self.regions.len();
        self.regions.push(Region {
            linked: false,
            custom: Some(color),
            parent: Some(parent_id),
            ..Region::new(rid, family)
        });
        self.ids[p] = Some(rid);
        Some(rid)
    }

    /// Fold a pixel region back into its parent: retire the record and give
    /// its pixels back to the parent id. Returns the id now owning them.
    ///
    /// Falls back to the first live non-pixel region of the same family if the
    /// parent itself is gone.
    pub fn merge_back(&mut self, id: RegionId) -> Option<RegionId> {
        let region = self.get(id)?;
        let parent = region.parent?;
        let family = region.family;
        let target = match self.get(parent) {
            Some(p) if !p.is_pixel_region() => Some(parent),
            _ => self
                .live()
                .find(|r| r.family == family && !r.is_pixel_region())
                .map(|r| r.id),
        }?;

        for slot in self.ids.iter_mut().filter(|slot| **slot == Some(id)) {
            *slot = Some(target);
        }
        let region = &mut self.regions[id];
        region.deleted = true;
        region.custom = None;
        Some(target)
    }

    /// Pixels of `id` with at least one 4-neighbor outside the region
    /// (image border counts as outside).
    pub fn outline(&self, id: RegionId) -> Vec<usize> {
        let (w, h) = (self.width, self.height);
        let mine = Some(id);
        let mut edge = Vec::new();
        for (p, slot) in self.ids.iter().enumerate() {
            if *slot != mine {
                continue;
            }
            let (x, y) = (p % w, p / w);
            let on_edge = x == 0
                || x == w - 1
                || y == 0
                || y == h - 1
                || self.ids[p - 1] != mine
                || self.ids[p + 1] != mine
                || self.ids[p - w] != mine
                || self.ids[p + w] != mine;
            if on_edge {
                edge.push(p);
            }
        }
        edge
    }

    /// Set darkness, clamped to the allowed range.
    pub fn set_darkness(&mut self, id: RegionId, delta: i32) -> Option<i32> {
        let region = self.get_mut(id)?;
        region.darkness = clamp_darkness(delta);
        Some(region.darkness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Family grid from rows of chars; '.' is unassigned, digits are families.
    fn grid(rows: &[&str]) -> (Vec<Option<usize>>, usize, usize) {
        let width = rows[0].len();
        let cells = rows
            .iter()
            .flat_map(|r| r.chars())
            .map(|c| c.to_digit(10).map(|d| d as usize))
            .collect();
        (cells, width, rows.len())
    }

    fn is_connected(map: &RegionMap, id: RegionId) -> bool {
        let pixels: Vec<usize> = (0..map.ids().len())
            .filter(|&p| map.ids()[p] == Some(id))
            .collect();
        let Some(&start) = pixels.first() else {
            return true;
        };
        let w = map.width();
        let mut seen = vec![start];
        let mut stack = vec![start];
        while let Some(p) = stack.pop() {
            for &q in &pixels {
                if seen.contains(&q) {
                    continue;
                }
                let adjacent = (p % w == q % w && p.abs_diff(q) == w)
                    || (p / w == q / w && p.abs_diff(q) == 1);
                if adjacent {
                    seen.push(q);
                    stack.push(q);
                }
            }
        }
        seen.len() == pixels.len()
    }

    #[test]
    fn disjoint_patches_become_separate_regions() {
        let (asg, w, h) = grid(&["00.00", "00.00", "11111"]);
        let map = RegionMap::segment(&asg, w, h);
        assert_eq!(map.regions().len(), 3);
        let left = map.region_at(0, 0).unwrap();
        let right = map.region_at(3, 0).unwrap();
        let bottom = map.region_at(0, 2).unwrap();
        assert_ne!(left, right);
        assert_eq!(map.get(left).unwrap().family, 0);
        assert_eq!(map.get(right).unwrap().family, 0);
        assert_eq!(map.get(bottom).unwrap().family, 1);
        assert_eq!(map.region_at(2, 0), None);
    }

    #[test]
    fn regions_are_single_family_and_connected() {
        let (asg, w, h) = grid(&["0110", "0100", "2200", ".022"]);
        let map = RegionMap::segment(&asg, w, h);
        for region in map.regions() {
            for (p, id) in map.ids().iter().enumerate() {
                if *id == Some(region.id) {
                    assert_eq!(asg[p], Some(region.family));
                }
            }
            assert!(is_connected(&map, region.id));
        }
        for (p, fam) in asg.iter().enumerate() {
            assert_eq!(fam.is_some(), map.ids()[p].is_some());
        }
    }

    #[test]
    fn diagonal_touch_does_not_connect() {
        let (asg, w, h) = grid(&["0.", ".0"]);
        let map = RegionMap::segment(&asg, w, h);
        assert_eq!(map.regions().len(), 2);
    }

    #[test]
    fn ids_follow_raster_order_with_defaults() {
        let (asg, w, h) = grid(&["01", "23"]);
        let map = RegionMap::segment(&asg, w, h);
        for (i, r) in map.regions().iter().enumerate() {
            assert_eq!(r.id, i);
            assert_eq!(r.family, i);
            assert!(r.linked && !r.keep && !r.lock && !r.deleted);
            assert_eq!(r.darkness, 0);
            assert_eq!(r.state(), RegionState::AutoLinked);
        }
    }

    #[test]
    fn carve_and_merge_back() {
        let (asg, w, h) = grid(&["000", "000"]);
        let mut map = RegionMap::segment(&asg, w, h);
        let red = Lab::new(50.0, 60.0, 40.0);
        let pix = map.carve_pixel(4, red).unwrap();
        assert_eq!(pix, 1);
        assert_eq!(map.ids()[4], Some(1));
        let region = map.get(pix).unwrap();
        assert_eq!(region.family, 0);
        assert_eq!(region.state(), RegionState::PixelOverride);
        assert!(!region.linked);

        // Carving again inside the pixel region recolors in place.
        let blue = Lab::new(40.0, 10.0, -50.0);
        assert_eq!(map.carve_pixel(4, blue), Some(1));
        assert_eq!(map.regions().len(), 2);
        assert_eq!(map.get(1).unwrap().custom, Some(blue));

        assert_eq!(map.merge_back(pix), Some(0));
        assert_eq!(map.ids()[4], Some(0));
        assert!(map.get(pix).is_none());
        assert!(map.regions()[pix].deleted);
        assert_eq!(map.live().count(), 1);
        // Plain regions have nothing to merge into.
        assert_eq!(map.merge_back(0), None);
    }

    #[test]
    fn outline_of_block() {
        let (asg, w, h) = grid(&["1111", "1001", "1001", "1111"]);
        let map = RegionMap::segment(&asg, w, h);
        let inner = map.region_at(1, 1).unwrap();
        let mut outline = map.outline(inner);
        outline.sort();
        // Every pixel of a 2x2 block touches the outside.
        assert_eq!(outline, vec![5, 6, 9, 10]);
    }

    #[test]
    fn darkness_clamps() {
        let (asg, w, h) = grid(&["0"]);
        let mut map = RegionMap::segment(&asg, w, h);
        assert_eq!(map.set_darkness(0, 90), Some(40));
        assert_eq!(map.set_darkness(3, 1), None);
    }
}
