//! The recolor session: owns the sprite, the reference table, the current
//! clustering and every region edit, and drives the pipeline stages.

use image::{Rgba, RgbaImage};
use kmeans_colors::Sort;
use palette::Lab;
use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::cluster_families;
use crate::color::{lab_to_hex, rgb_to_lab};
use crate::compose::{FamilyColor, RenderState, compose};
use crate::config::{Config, clamp_darkness};
use crate::error::{Error, Result};
use crate::matcher::{ColorMatcher, MatchSettings};
use crate::reference::{ReferenceMap, ReferencePair};
use crate::region::{Region, RegionId, RegionMap, RegionState};
use crate::rng::Prng;
use crate::seed;
use crate::smooth::{SmoothParams, smooth};
use crate::sprite::{MaskStats, Sprite};

/// Family count `kmeans_colors::Sort` can index.
const SORTABLE_FAMILIES: usize = u8::MAX as usize + 1;

#[derive(Clone, Debug)]
struct Family {
    centroid: Lab,
    position: Option<[f32; 2]>,
    /// Color suggested by the matcher.
    auto: Lab,
    /// Color linked regions render with.
    shiny: Lab,
    edited: bool,
    pixels: usize,
}

/// Output of one clustering pass; always replaced as a whole.
#[derive(Clone, Debug)]
struct Segmentation {
    assignment: Vec<Option<usize>>,
    families: Vec<Family>,
    regions: RegionMap,
}

/// Region state as reported to a UI.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionInfo {
    pub id: RegionId,
    pub family: usize,
    pub state: RegionState,
    pub linked: bool,
    pub keep: bool,
    pub lock: bool,
    pub darkness: i32,
    pub parent: Option<RegionId>,
    /// Effective base color, `RRGGBB`.
    pub color: String,
}

/// Family state as reported to a UI.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FamilyInfo {
    pub id: usize,
    pub centroid: String,
    pub auto: String,
    pub shiny: String,
    pub edited: bool,
    pub pixels: usize,
    /// Share of clustered pixels in this family, `0..=1`.
    pub coverage: f32,
}

pub struct ShinySession {
    config: Config,
    rng: Prng,
    sprite: Option<Sprite>,
    pairs: Vec<ReferencePair>,
    map: ReferenceMap,
    segmentation: Option<Segmentation>,
    active_region: Option<RegionId>,
    edit_protected: bool,
    stale: bool,
}

impl ShinySession {
    pub fn new(config: Config, seed: u32) -> Self {
        Self {
            config: config.clamped(),
            rng: Prng::new(seed),
            sprite: None,
            pairs: Vec::new(),
            map: ReferenceMap::default(),
            segmentation: None,
            active_region: None,
            edit_protected: false,
            stale: true,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply a new configuration, redoing only the stages it affects.
    pub fn set_config(&mut self, config: Config) -> Result<()> {
        let config = config.clamped();
        let previous = std::mem::replace(&mut self.config, config);

        if config.ink_threshold != previous.ink_threshold {
            if let Some(sprite) = &self.sprite {
                let rebuilt = Sprite::new(sprite.image().clone(), config.ink_threshold)?;
                self.replace_sprite(rebuilt);
                debug!(ink = config.ink_threshold, "ink threshold changed, mask rebuilt");
                return Ok(());
            }
        }
        if config.clustering_differs(&previous) {
            self.stale = true;
        } else if config.matching_differs(&previous) {
            self.rematch();
        }
        Ok(())
    }

    pub fn sprite(&self) -> Option<&Sprite> {
        self.sprite.as_ref()
    }

    /// Replace the sprite along with its mask, Lab cache and any clustering.
    /// A rejected image leaves the previous sprite in place.
    pub fn load_sprite(&mut self, image: RgbaImage) -> Result<MaskStats> {
        let sprite = Sprite::new(image, self.config.ink_threshold)?;
        let stats = sprite.stats();
        info!(
            width = sprite.width(),
            height = sprite.height(),
            recolorable = stats.recolorable,
            protected = stats.protected,
            "sprite loaded"
        );
        self.replace_sprite(sprite);
        Ok(stats)
    }

    fn replace_sprite(&mut self, sprite: Sprite) {
        self.sprite = Some(sprite);
        self.segmentation = None;
        self.active_region = None;
        self.stale = true;
    }

    pub fn add_reference_pair(&mut self, key: &str, normal: RgbaImage, shiny: RgbaImage) -> Result<()> {
        let pair = ReferencePair::new(key, normal, shiny)?;
        self.pairs.push(pair);
        self.rebuild_map();
        Ok(())
    }

    pub fn clear_references(&mut self) {
        self.pairs.clear();
        self.rebuild_map();
    }

    pub fn reference_map(&self) -> &ReferenceMap {
        &self.map
    }

    fn rebuild_map(&mut self) {
        self.map = ReferenceMap::build(&self.pairs, true);
        self.rematch();
    }

    pub fn seed(&self) -> u32 {
        self.rng.seed()
    }

    /// Switch to a new seed (see [`crate::rng::parse_seed`]) and return it.
    pub fn reseed(&mut self, text: Option<&str>) -> u32 {
        self.rng = Prng::from_text(text);
        self.stale = true;
        self.rng.seed()
    }

    pub fn extended_seed(&self) -> String {
        seed::serialize(self.rng.seed(), &self.config)
    }

    /// Take seed and settings from an extended seed string.
    pub fn apply_extended_seed(&mut self, text: &str) -> Result<()> {
        let (seed, config) = seed::parse(text, &self.config);
        self.rng = Prng::new(seed);
        self.set_config(config)?;
        self.stale = true;
        Ok(())
    }

    /// Cluster, segment and match from scratch. Nothing is committed until
    /// all three stages are done.
    pub fn recluster(&mut self) -> Result<()> {
        let sprite = self.sprite.as_ref().ok_or(Error::NoSprite)?;
        self.rng.reset();
        let clustering = cluster_families(
            sprite,
            self.edit_protected,
            self.config.family_count,
            self.config.spatial_weight,
            &mut self.rng,
        );
        let regions = RegionMap::segment(
            &clustering.assignment,
            sprite.width() as usize,
            sprite.height() as usize,
        );
        let mut families: Vec<Family> = clustering
            .centroids
            .iter()
            .zip(&clustering.positions)
            .zip(&clustering.counts)
            .map(|((&centroid, &position), &pixels)| Family {
                centroid,
                position,
                auto: centroid,
                shiny: centroid,
                edited: false,
                pixels,
            })
            .collect();
        match_families(&mut families, &self.map, &self.config, self.rng.seed());

        debug!(
            families = families.len(),
            regions = regions.regions().len(),
            "clustering done"
        );
        self.segmentation = Some(Segmentation {
            assignment: clustering.assignment,
            families,
            regions,
        });
        self.active_region = None;
        self.stale = false;
        Ok(())
    }

    /// Re-run the matcher for the current families, keeping user-edited colors.
    fn rematch(&mut self) {
        if let Some(seg) = &mut self.segmentation {
            match_families(&mut seg.families, &self.map, &self.config, self.rng.seed());
        }
    }

    /// Render the recolored sprite, reclustering first if settings changed.
    pub fn render(&mut self) -> Result<RgbaImage> {
        if self.sprite.is_none() {
            return Err(Error::NoSprite);
        }
        if self.stale || self.segmentation.is_none() {
            self.recluster()?;
        }
        let sprite = self.sprite.as_ref().ok_or(Error::NoSprite)?;
        let Some(seg) = &self.segmentation else {
            return Err(Error::NoSprite);
        };

        let colors: Vec<FamilyColor> = seg
            .families
            .iter()
            .map(|f| FamilyColor {
                centroid: f.centroid,
                shiny: f.shiny,
            })
            .collect();
        let state = RenderState {
            families: &colors,
            regions: &seg.regions,
            contrast: self.config.contrast,
            active_region: self.active_region,
            edit_protected: self.edit_protected,
        };
        let output = compose(sprite, &state);
        if seg.regions.is_empty() {
            return Ok(output);
        }
        let params = SmoothParams::new(
            self.config.smooth_radius,
            self.config.smooth_blend,
            self.config.ink_threshold,
        );
        let mut smoothed = smooth(&output, sprite.image(), &params);
        // Kept regions stay byte-identical to the source.
        for (p, px) in smoothed.pixels_mut().enumerate() {
            let kept = seg.regions.ids()[p]
                .and_then(|id| seg.regions.get(id))
                .is_some_and(|r| r.keep);
            if kept {
                *px = Rgba(sprite.rgba(p));
            }
        }
        Ok(smoothed)
    }

    pub fn active_region(&self) -> Option<RegionId> {
        self.active_region
    }

    pub fn select_region(&mut self, id: Option<RegionId>) {
        self.active_region = id;
    }

    pub fn edit_protected(&self) -> bool {
        self.edit_protected
    }

    /// Let protected ink pixels be recolored in the selected region. Ink
    /// only joins the families on the next explicit [`Self::recluster`];
    /// edits and the selection survive the toggle.
    pub fn set_edit_protected(&mut self, enabled: bool) {
        self.edit_protected = enabled;
    }

    pub fn region_at(&self, x: u32, y: u32) -> Option<RegionId> {
        self.segmentation
            .as_ref()?
            .regions
            .region_at(x as usize, y as usize)
    }

    /// Give a region its own color, detaching it from the family color.
    pub fn set_region_color(&mut self, id: RegionId, rgb: [u8; 3]) -> Result<()> {
        let region = self.editable(id, false)?;
        region.custom = Some(rgb_to_lab(rgb[0], rgb[1], rgb[2]));
        region.linked = false;
        debug!(region = id, "region color set");
        Ok(())
    }

    /// Apply a color picked from a preview or texture. Linked regions recolor
    /// their whole family; unlinked ones only themselves.
    pub fn assign_picked_color(&mut self, id: RegionId, color: Lab) -> Result<()> {
        let region = self.editable(id, true)?;
        if region.linked && !region.is_pixel_region() {
            let family = region.family;
            let seg = self.segmentation.as_mut().ok_or(Error::UnknownRegion(id))?;
            let f = seg.families.get_mut(family).ok_or(Error::UnknownRegion(id))?;
            f.shiny = color;
            f.edited = true;
        } else {
            region.custom = Some(color);
        }
        Ok(())
    }

    /// Link or unlink a region. Linking a pixel region folds it back into the
    /// region it was carved from.
    pub fn set_linked(&mut self, id: RegionId, linked: bool) -> Result<()> {
        let seg = self.segmentation.as_mut().ok_or(Error::UnknownRegion(id))?;
        let region = seg.regions.get(id).ok_or(Error::UnknownRegion(id))?;
        if linked && region.is_pixel_region() {
            let target = seg.regions.merge_back(id).ok_or(Error::UnknownRegion(id))?;
            if self.active_region == Some(id) {
                self.active_region = Some(target);
            }
            debug!(region = id, into = target, "pixel region merged back");
            return Ok(());
        }
        let family_shiny = seg.families.get(region.family).map(|f| f.shiny);
        let region = seg.regions.get_mut(id).ok_or(Error::UnknownRegion(id))?;
        region.linked = linked;
        if !linked && region.custom.is_none() {
            region.custom = family_shiny;
        }
        Ok(())
    }

    pub fn set_keep(&mut self, id: RegionId, keep: bool) -> Result<()> {
        let region = self.region_mut(id)?;
        if keep && region.is_pixel_region() {
            debug!(region = id, "pixel regions cannot be kept");
            return Ok(());
        }
        region.keep = keep;
        Ok(())
    }

    pub fn set_lock(&mut self, id: RegionId, lock: bool) -> Result<()> {
        self.region_mut(id)?.lock = lock;
        Ok(())
    }

    /// Set the darkness delta; returns the clamped value.
    pub fn set_darkness(&mut self, id: RegionId, darkness: i32) -> Result<i32> {
        let region = self.editable(id, false)?;
        region.darkness = clamp_darkness(darkness);
        Ok(region.darkness)
    }

    pub fn bump_darkness(&mut self, id: RegionId, delta: i32) -> Result<i32> {
        let current = self.region(id)?.darkness;
        self.set_darkness(id, current.saturating_add(delta))
    }

    /// Undo color edits: a linked region resets its family to the suggested
    /// color, a custom region drops its override and relinks.
    pub fn revert_region(&mut self, id: RegionId) -> Result<()> {
        let region = self.editable(id, true)?;
        if region.is_pixel_region() {
            return self.set_linked(id, true);
        }
        if region.linked {
            let family = region.family;
            let seg = self.segmentation.as_mut().ok_or(Error::UnknownRegion(id))?;
            if let Some(f) = seg.families.get_mut(family) {
                f.shiny = f.auto;
                f.edited = false;
            }
        } else {
            region.custom = None;
            region.linked = true;
        }
        Ok(())
    }

    /// Split the pixel at `(x, y)` into its own single-pixel region.
    pub fn carve_pixel_region(&mut self, x: u32, y: u32, color: Lab) -> Result<RegionId> {
        let sprite = self.sprite.as_ref().ok_or(Error::NoSprite)?;
        let (width, height) = (sprite.width(), sprite.height());
        if x >= width || y >= height {
            return Err(Error::OutOfBounds { x, y, width, height });
        }
        let parent = self.region_at(x, y).ok_or(Error::NoRegionAtPixel { x, y })?;
        self.editable(parent, true)?;
        let seg = self.segmentation.as_mut().ok_or(Error::NoRegionAtPixel { x, y })?;
        let p = (y * width + x) as usize;
        let id = seg
            .regions
            .carve_pixel(p, color)
            .ok_or(Error::NoRegionAtPixel { x, y })?;
        debug!(x, y, region = id, "pixel region carved");
        Ok(id)
    }

    /// Row-major indices of the pixels on the edge of region `id`.
    pub fn region_outline(&self, id: RegionId) -> Vec<usize> {
        self.segmentation
            .as_ref()
            .map(|seg| seg.regions.outline(id))
            .unwrap_or_default()
    }

    pub fn regions(&self) -> Vec<RegionInfo> {
        let Some(seg) = &self.segmentation else {
            return Vec::new();
        };
        seg.regions
            .live()
            .map(|r| {
                let base = match (r.linked, r.custom) {
                    (false, Some(custom)) => custom,
                    _ => seg.families.get(r.family).map_or(Lab::new(0.0, 0.0, 0.0), |f| f.shiny),
                };
                RegionInfo {
                    id: r.id,
                    family: r.family,
                    state: r.state(),
                    linked: r.linked,
                    keep: r.keep,
                    lock: r.lock,
                    darkness: r.darkness,
                    parent: r.parent,
                    color: lab_to_hex(base),
                }
            })
            .collect()
    }

    /// Families ordered from darkest to lightest centroid.
    pub fn families(&self) -> Vec<FamilyInfo> {
        let Some(seg) = &self.segmentation else {
            return Vec::new();
        };
        let total: usize = seg.families.iter().map(|f| f.pixels).sum();
        if total == 0 {
            return Vec::new();
        }
        let order: Vec<(usize, f32)> = if seg.families.len() <= SORTABLE_FAMILIES {
            let centroids: Vec<Lab> = seg.families.iter().map(|f| f.centroid).collect();
            let indices: Vec<u8> = seg
                .assignment
                .iter()
                .flatten()
                .filter_map(|&f| u8::try_from(f).ok())
                .collect();
            Lab::sort_indexed_colors(&centroids, &indices)
                .into_iter()
                .map(|data| (data.index as usize, data.percentage))
                .collect()
        } else {
            // `Sort` indexes with u8; larger family sets are ordered here.
            let mut ids: Vec<usize> = (0..seg.families.len())
                .filter(|&id| seg.families[id].pixels > 0)
                .collect();
            ids.sort_by(|&a, &b| {
                seg.families[a].centroid.l.total_cmp(&seg.families[b].centroid.l)
            });
            ids.into_iter()
                .map(|id| (id, seg.families[id].pixels as f32 / total as f32))
                .collect()
        };
        order
            .into_iter()
            .filter_map(|(id, coverage)| {
                let f = seg.families.get(id)?;
                Some(FamilyInfo {
                    id,
                    centroid: lab_to_hex(f.centroid),
                    auto: lab_to_hex(f.auto),
                    shiny: lab_to_hex(f.shiny),
                    edited: f.edited,
                    pixels: f.pixels,
                    coverage,
                })
            })
            .collect()
    }

    /// Current shiny color of every family in family-id order.
    pub fn palette(&self) -> Vec<String> {
        self.segmentation
            .as_ref()
            .map(|seg| seg.families.iter().map(|f| lab_to_hex(f.shiny)).collect())
            .unwrap_or_default()
    }

    fn region(&self, id: RegionId) -> Result<&Region> {
        self.segmentation
            .as_ref()
            .and_then(|seg| seg.regions.get(id))
            .ok_or(Error::UnknownRegion(id))
    }

    fn region_mut(&mut self, id: RegionId) -> Result<&mut Region> {
        self.segmentation
            .as_mut()
            .and_then(|seg| seg.regions.get_mut(id))
            .ok_or(Error::UnknownRegion(id))
    }

    /// Region `id` if it accepts edits: never when locked, and not when kept
    /// if `refuse_kept` is set.
    fn editable(&mut self, id: RegionId, refuse_kept: bool) -> Result<&mut Region> {
        let region = self.region_mut(id)?;
        if region.lock {
            return Err(Error::RegionLocked(id));
        }
        if refuse_kept && region.keep {
            return Err(Error::RegionKept(id));
        }
        Ok(region)
    }
}

/// Suggest a shiny color per family. The fallback path draws from a fresh
/// stream at `seed`, so matching is reproducible for a given seed.
fn match_families(families: &mut [Family], map: &ReferenceMap, config: &Config, seed: u32) {
    let matcher = ColorMatcher::new(map, MatchSettings::from_config(config));
    let mut rng = Prng::new(seed);
    for family in families.iter_mut() {
        family.auto = matcher.suggest(family.centroid, family.position, &mut rng);
        if !family.edited {
            family.shiny = family.auto;
        }
    }
}
