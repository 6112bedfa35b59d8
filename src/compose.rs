//! Renders the recolored sprite from the segmentation and region state.

use image::{Rgba, RgbaImage};
use palette::Lab;

use crate::color::lab_to_rgb;
use crate::region::{RegionId, RegionMap};
use crate::sprite::{PixelClass, Sprite};

/// Family colors the compositor reads: centroid plus current shiny color.
#[derive(Clone, Debug, PartialEq)]
pub struct FamilyColor {
    pub centroid: Lab,
    pub shiny: Lab,
}

/// Everything a render pass reads besides the sprite itself.
pub struct RenderState<'a> {
    pub families: &'a [FamilyColor],
    pub regions: &'a RegionMap,
    pub contrast: f32,
    /// Selected region; with `edit_protected` it may recolor ink pixels.
    pub active_region: Option<RegionId>,
    pub edit_protected: bool,
}

/// Recolor every pixel of `sprite`.
///
/// Lightness keeps each pixel's offset from its family centroid, adds the
/// region's darkness and goes through the contrast curve around L = 50;
/// a and b come straight from the base color.
pub fn compose(sprite: &Sprite, state: &RenderState<'_>) -> RgbaImage {
    let mut out = sprite.image().clone();
    let ids = state.regions.ids();

    for (p, px) in out.pixels_mut().enumerate() {
        let class = sprite.mask()[p];
        if class == PixelClass::Transparent {
            px[3] = 0;
            continue;
        }
        let rid = ids.get(p).copied().flatten();
        if class == PixelClass::Protected
            && !(state.edit_protected && rid.is_some() && rid == state.active_region)
        {
            continue;
        }
        let Some(region) = rid.and_then(|id| state.regions.get(id)) else {
            continue;
        };
        if region.keep {
            continue;
        }
        let Some(family) = state.families.get(region.family) else {
            continue;
        };

        let base = match (region.linked, region.custom) {
            (false, Some(custom)) => custom,
            _ => family.shiny,
        };
        let lightness = base.l + (sprite.labs()[p].l - family.centroid.l) + region.darkness as f32;
        let lightness = (50.0 + (lightness - 50.0) * state.contrast).clamp(0.0, 100.0);
        let [r, g, b] = lab_to_rgb(Lab::new(lightness, base.a, base.b));
        *px = Rgba([r, g, b, px[3]]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::rgb_to_lab;

    fn setup(img: RgbaImage, ink: u8) -> (Sprite, RegionMap) {
        let sprite = Sprite::new(img, ink).unwrap();
        let assignment: Vec<Option<usize>> = (0..sprite.len())
            .map(|p| sprite.participates(p, false).then_some(0))
            .collect();
        let regions = RegionMap::segment(&assignment, sprite.width() as usize, sprite.height() as usize);
        (sprite, regions)
    }

    fn state<'a>(families: &'a [FamilyColor], regions: &'a RegionMap, contrast: f32) -> RenderState<'a> {
        RenderState {
            families,
            regions,
            contrast,
            active_region: None,
            edit_protected: false,
        }
    }

    #[test]
    fn uniform_family_reproduces_base_color() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([120, 180, 60, 200]));
        let (sprite, regions) = setup(img, 8);
        let shiny = rgb_to_lab(200, 40, 90);
        let families = [FamilyColor {
            centroid: rgb_to_lab(120, 180, 60),
            shiny,
        }];
        let out = compose(&sprite, &state(&families, &regions, 1.0));
        let [r, g, b] = lab_to_rgb(shiny);
        for px in out.pixels() {
            assert_eq!(px.0, [r, g, b, 200]);
        }
    }

    #[test]
    fn transparent_and_ink_pass_through() {
        let mut img = RgbaImage::from_pixel(3, 1, Rgba([150, 150, 150, 255]));
        img.put_pixel(0, 0, Rgba([10, 20, 30, 3]));
        img.put_pixel(1, 0, Rgba([4, 4, 4, 255]));
        let (sprite, regions) = setup(img, 8);
        let families = [FamilyColor {
            centroid: rgb_to_lab(150, 150, 150),
            shiny: rgb_to_lab(0, 0, 255),
        }];
        let out = compose(&sprite, &state(&families, &regions, 1.0));
        assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30, 0]);
        assert_eq!(out.get_pixel(1, 0).0, [4, 4, 4, 255]);
        assert_ne!(out.get_pixel(2, 0).0, [150, 150, 150, 255]);
    }

    #[test]
    fn keep_and_custom_and_darkness() {
        let img = RgbaImage::from_fn(3, 1, |x, _| {
            if x == 1 { Rgba([0, 0, 0, 0]) } else { Rgba([90, 160, 220, 255]) }
        });
        let (sprite, mut regions) = setup(img, 8);
        assert_eq!(regions.regions().len(), 2);
        let families = [FamilyColor {
            centroid: rgb_to_lab(90, 160, 220),
            shiny: rgb_to_lab(240, 200, 40),
        }];

        regions.get_mut(0).unwrap().keep = true;
        let custom = rgb_to_lab(150, 150, 150);
        {
            let r = regions.get_mut(1).unwrap();
            r.linked = false;
            r.custom = Some(custom);
        }
        let out = compose(&sprite, &state(&families, &regions, 1.0));
        assert_eq!(out.get_pixel(0, 0).0, [90, 160, 220, 255]);
        let [r, g, b] = lab_to_rgb(custom);
        assert_eq!(out.get_pixel(2, 0).0, [r, g, b, 255]);

        regions.set_darkness(1, -20);
        let darker = compose(&sprite, &state(&families, &regions, 1.0));
        let l_before = custom.l;
        let px = darker.get_pixel(2, 0).0;
        let l_after = rgb_to_lab(px[0], px[1], px[2]).l;
        assert!((l_before - l_after - 20.0).abs() < 1.5, "{l_before} -> {l_after}");
    }

    #[test]
    fn contrast_pushes_away_from_mid_gray() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([200, 200, 200, 255]));
        let (sprite, regions) = setup(img, 8);
        let gray = rgb_to_lab(200, 200, 200);
        let families = [FamilyColor { centroid: gray, shiny: gray }];
        let flat = compose(&sprite, &state(&families, &regions, 1.0));
        let punchy = compose(&sprite, &state(&families, &regions, 1.5));
        assert!(punchy.get_pixel(0, 0)[0] > flat.get_pixel(0, 0)[0]);
    }

    #[test]
    fn unlocked_ink_recolors_only_in_active_region() {
        let img = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgba([5, 5, 5, 255]) } else { Rgba([6, 6, 6, 255]) }
        });
        let sprite = Sprite::new(img, 8).unwrap();
        let assignment = vec![Some(0), Some(1)];
        let regions = RegionMap::segment(&assignment, 2, 1);
        let families = [
            FamilyColor { centroid: rgb_to_lab(5, 5, 5), shiny: rgb_to_lab(200, 0, 0) },
            FamilyColor { centroid: rgb_to_lab(6, 6, 6), shiny: rgb_to_lab(0, 0, 200) },
        ];
        let mut st = state(&families, &regions, 1.0);
        st.active_region = Some(0);
        st.edit_protected = true;
        let out = compose(&sprite, &st);
        let [r, g, b] = lab_to_rgb(families[0].shiny);
        assert_eq!(out.get_pixel(0, 0).0, [r, g, b, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [6, 6, 6, 255]);
    }
}
