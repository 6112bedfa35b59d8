//! Shiny palette derivation for pixel-art sprites.
//!
//! Colors of a sprite are grouped into spatial-color families, split into
//! connected regions and recolored with shiny colors learned from paired
//! normal/shiny reference textures. [`ShinySession`] drives the whole
//! pipeline; the modules below are its stages.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

pub mod cluster;
pub mod color;
pub mod compose;
pub mod config;
pub mod error;
pub mod matcher;
pub mod reference;
pub mod region;
pub mod rng;
pub mod seed;
pub mod session;
pub mod smooth;
pub mod sprite;
pub mod wasm;

pub use config::Config;
pub use error::{Error, Result};
pub use reference::ReferencePair;
pub use region::{RegionId, RegionState};
pub use session::{FamilyInfo, RegionInfo, ShinySession};
pub use sprite::MaskStats;

/// Decode any format `image` understands into RGBA8.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// One-shot recolor: decode the sprite, learn from `pairs` (key, normal
/// bytes, shiny bytes), run the pipeline and return the PNG plus each
/// family's shiny color as `RRGGBB`.
///
/// A pair that fails to decode is an error; a pair whose images differ in
/// size is skipped with a warning.
#[cfg(not(target_arch = "wasm32"))]
pub fn shinify_bytes(
    sprite_png: &[u8],
    pairs: &[(String, Vec<u8>, Vec<u8>)],
    seed: u32,
    config: &Config,
) -> Result<(Vec<u8>, Vec<String>)> {
    let mut session = ShinySession::new(*config, seed);
    session.load_sprite(decode_rgba(sprite_png)?)?;
    for (key, normal, shiny) in pairs {
        let normal = decode_rgba(normal)?;
        let shiny = decode_rgba(shiny)?;
        if let Err(e) = session.add_reference_pair(key, normal, shiny) {
            tracing::warn!(key = key.as_str(), "{e}");
        }
    }
    session.recluster()?;
    let image = session.render()?;
    Ok((encode_png(&image)?, session.palette()))
}
