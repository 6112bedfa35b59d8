//! Browser surface: a `ShinyStudio` object wrapping one [`ShinySession`].
//!
//! Images go in as encoded bytes (PNG, etc.) and come out as PNG inside a
//! `{ image: Uint8Array, palette: string[] }` object.

use js_sys::{Array, Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;

use crate::color::{parse_hex, pick};
use crate::config::Config;
use crate::error::Error;
use crate::rng::parse_seed;
use crate::session::ShinySession;
use crate::{decode_rgba, encode_png};

fn js_err(e: Error) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Hand structured state to JS by way of a JSON round trip.
fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&text)
}

#[wasm_bindgen]
pub struct ShinyStudio {
    session: ShinySession,
}

#[wasm_bindgen]
impl ShinyStudio {
    /// New studio; an empty or missing seed draws a random one.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: Option<String>) -> ShinyStudio {
        ShinyStudio {
            session: ShinySession::new(Config::default(), parse_seed(seed.as_deref())),
        }
    }

    #[wasm_bindgen(js_name = loadSprite)]
    pub fn load_sprite(&mut self, input: Vec<u8>) -> Result<JsValue, JsValue> {
        let image = decode_rgba(&input).map_err(js_err)?;
        let stats = self.session.load_sprite(image).map_err(js_err)?;
        to_js(&stats)
    }

    #[wasm_bindgen(js_name = addReferencePair)]
    pub fn add_reference_pair(&mut self, key: &str, normal: Vec<u8>, shiny: Vec<u8>) -> Result<(), JsValue> {
        let normal = decode_rgba(&normal).map_err(js_err)?;
        let shiny = decode_rgba(&shiny).map_err(js_err)?;
        self.session.add_reference_pair(key, normal, shiny).map_err(js_err)
    }

    #[wasm_bindgen(js_name = clearReferences)]
    pub fn clear_references(&mut self) {
        self.session.clear_references();
    }

    /// Replace every setting; out-of-range values are clamped.
    #[wasm_bindgen(js_name = setConfig)]
    #[allow(clippy::too_many_arguments)]
    pub fn set_config(
        &mut self,
        ink_threshold: u8,
        family_count: usize,
        spatial_weight: f32,
        consensus_breadth: usize,
        match_spatial_weight: f32,
        color_tolerance: f32,
        contrast: f32,
        smooth_radius: u32,
        smooth_blend: u32,
    ) -> Result<(), JsValue> {
        let config = Config {
            ink_threshold,
            family_count,
            spatial_weight,
            consensus_breadth,
            match_spatial_weight,
            color_tolerance,
            contrast,
            smooth_radius,
            smooth_blend,
        };
        self.session.set_config(config).map_err(js_err)
    }

    pub fn reseed(&mut self, seed: Option<String>) -> u32 {
        self.session.reseed(seed.as_deref())
    }

    #[wasm_bindgen(js_name = extendedSeed)]
    pub fn extended_seed(&self) -> String {
        self.session.extended_seed()
    }

    #[wasm_bindgen(js_name = applyExtendedSeed)]
    pub fn apply_extended_seed(&mut self, text: &str) -> Result<(), JsValue> {
        self.session.apply_extended_seed(text).map_err(js_err)
    }

    pub fn recluster(&mut self) -> Result<(), JsValue> {
        self.session.recluster().map_err(js_err)
    }

    /// Render and PNG-encode the recolored sprite.
    pub fn render(&mut self) -> Result<Object, JsValue> {
        let image = self.session.render().map_err(js_err)?;
        let encoded = encode_png(&image).map_err(js_err)?;

        let img_js = Uint8Array::from(encoded.as_slice());
        let palette_js = Array::new();
        for hex in self.session.palette() {
            palette_js.push(&JsValue::from_str(&hex));
        }

        let result = Object::new();
        Reflect::set(&result, &JsValue::from_str("image"), &img_js)?;
        Reflect::set(&result, &JsValue::from_str("palette"), &palette_js)?;
        Ok(result)
    }

    #[wasm_bindgen(js_name = regionAt)]
    pub fn region_at(&self, x: u32, y: u32) -> Option<usize> {
        self.session.region_at(x, y)
    }

    #[wasm_bindgen(js_name = selectRegion)]
    pub fn select_region(&mut self, id: Option<usize>) {
        self.session.select_region(id);
    }

    #[wasm_bindgen(js_name = setEditProtected)]
    pub fn set_edit_protected(&mut self, enabled: bool) {
        self.session.set_edit_protected(enabled);
    }

    /// Set a region's own color from `RRGGBB` / `#RRGGBB`.
    #[wasm_bindgen(js_name = setRegionColor)]
    pub fn set_region_color(&mut self, id: usize, hex: &str) -> Result<(), JsValue> {
        let rgb = parse_hex(hex).ok_or_else(|| JsValue::from_str("Invalid hex"))?;
        self.session.set_region_color(id, rgb).map_err(js_err)
    }

    /// Pick the color at `(x, y)` of an encoded image and assign it to a region.
    #[wasm_bindgen(js_name = pickColor)]
    pub fn pick_color(&mut self, id: usize, source: Vec<u8>, x: u32, y: u32) -> Result<bool, JsValue> {
        let image = decode_rgba(&source).map_err(js_err)?;
        let Some(lab) = pick(&image, x, y) else {
            return Ok(false);
        };
        self.session.assign_picked_color(id, lab).map_err(js_err)?;
        Ok(true)
    }

    #[wasm_bindgen(js_name = setLinked)]
    pub fn set_linked(&mut self, id: usize, linked: bool) -> Result<(), JsValue> {
        self.session.set_linked(id, linked).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setKeep)]
    pub fn set_keep(&mut self, id: usize, keep: bool) -> Result<(), JsValue> {
        self.session.set_keep(id, keep).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setLock)]
    pub fn set_lock(&mut self, id: usize, lock: bool) -> Result<(), JsValue> {
        self.session.set_lock(id, lock).map_err(js_err)
    }

    #[wasm_bindgen(js_name = bumpDarkness)]
    pub fn bump_darkness(&mut self, id: usize, delta: i32) -> Result<i32, JsValue> {
        self.session.bump_darkness(id, delta).map_err(js_err)
    }

    #[wasm_bindgen(js_name = revertRegion)]
    pub fn revert_region(&mut self, id: usize) -> Result<(), JsValue> {
        self.session.revert_region(id).map_err(js_err)
    }

    #[wasm_bindgen(js_name = carvePixel)]
    pub fn carve_pixel(&mut self, x: u32, y: u32, hex: &str) -> Result<usize, JsValue> {
        let [r, g, b] = parse_hex(hex).ok_or_else(|| JsValue::from_str("Invalid hex"))?;
        let lab = crate::color::rgb_to_lab(r, g, b);
        self.session.carve_pixel_region(x, y, lab).map_err(js_err)
    }

    #[wasm_bindgen(js_name = regionOutline)]
    pub fn region_outline(&self, id: usize) -> Vec<u32> {
        self.session
            .region_outline(id)
            .into_iter()
            .map(|p| p as u32)
            .collect()
    }

    pub fn regions(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.regions())
    }

    pub fn families(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.families())
    }
}
