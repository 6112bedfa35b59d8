//! The loaded sprite: pixels, per-pixel classification and the Lab cache.
//! All three are built together and replaced together.

use image::RgbaImage;
use palette::Lab;
use serde::Serialize;

use crate::color::rgb_to_lab;
use crate::error::{Error, Result};

/// Pixels with alpha below this are transparent.
pub const TRANSPARENT_ALPHA: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelClass {
    Transparent,
    /// Near-black line art, left alone unless explicitly unlocked.
    Protected,
    Recolorable,
}

impl PixelClass {
    pub fn classify(rgba: [u8; 4], ink_threshold: u8) -> Self {
        let [r, g, b, a] = rgba;
        if a < TRANSPARENT_ALPHA {
            PixelClass::Transparent
        } else if r.max(g).max(b) <= ink_threshold {
            PixelClass::Protected
        } else {
            PixelClass::Recolorable
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MaskStats {
    pub recolorable: usize,
    pub protected: usize,
    pub transparent: usize,
}

#[derive(Clone, Debug)]
pub struct Sprite {
    image: RgbaImage,
    mask: Vec<PixelClass>,
    labs: Vec<Lab>,
    ink_threshold: u8,
}

impl Sprite {
    /// Classify every pixel and cache Lab for every opaque one.
    pub fn new(image: RgbaImage, ink_threshold: u8) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::EmptySprite { width, height });
        }
        let len = (width * height) as usize;
        let mut mask = Vec::with_capacity(len);
        let mut labs = Vec::with_capacity(len);
        for px in image.pixels() {
            let class = PixelClass::classify(px.0, ink_threshold);
            let lab = match class {
                PixelClass::Transparent => Lab::new(0.0, 0.0, 0.0),
                _ => rgb_to_lab(px[0], px[1], px[2]),
            };
            mask.push(class);
            labs.push(lab);
        }
        Ok(Self {
            image,
            mask,
            labs,
            ink_threshold,
        })
    }

    /// Rebuild with a different ink threshold, reusing the pixels.
    pub fn with_ink_threshold(self, ink_threshold: u8) -> Result<Self> {
        Self::new(self.image, ink_threshold)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn mask(&self) -> &[PixelClass] {
        &self.mask
    }

    pub fn labs(&self) -> &[Lab] {
        &self.labs
    }

    pub fn ink_threshold(&self) -> u8 {
        self.ink_threshold
    }

    /// RGBA of pixel `p` (row-major index).
    #[inline]
    pub fn rgba(&self, p: usize) -> [u8; 4] {
        let i = p * 4;
        let raw = self.image.as_raw();
        [raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]
    }

    /// Whether pixel `p` takes part in clustering.
    #[inline]
    pub fn participates(&self, p: usize, edit_protected: bool) -> bool {
        match self.mask[p] {
            PixelClass::Recolorable => true,
            PixelClass::Protected => edit_protected,
            PixelClass::Transparent => false,
        }
    }

    pub fn stats(&self) -> MaskStats {
        let mut stats = MaskStats::default();
        for class in &self.mask {
            match class {
                PixelClass::Recolorable => stats.recolorable += 1,
                PixelClass::Protected => stats.protected += 1,
                PixelClass::Transparent => stats.transparent += 1,
            }
        }
        stats
    }
}
