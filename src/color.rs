//! sRGB ⇄ CIELAB (D65) helpers on top of `palette`, plus the small set of
//! Lab metrics the matcher needs.

use image::RgbaImage;
use palette::{FromColor, IntoColor, Lab, Lch, LinSrgb, ShiftHue, Srgb};

/// Convert an 8-bit sRGB triple to Lab.
#[inline]
pub fn rgb_to_lab(r: u8, g: u8, b: u8) -> Lab {
    let lin: LinSrgb = Srgb::new(r, g, b).into_linear();
    Lab::from_color(lin)
}

/// Convert Lab back to 8-bit sRGB, clamping out-of-gamut values.
#[inline]
pub fn lab_to_rgb(lab: Lab) -> [u8; 3] {
    let rgb_f32: Srgb<f32> = Srgb::from_linear(lab.into_color());
    let c: Srgb<u8> = rgb_f32.into_format::<u8>();
    [c.red, c.green, c.blue]
}

/// Plain Euclidean ΔE (CIE76).
#[inline]
pub fn delta_e(a: Lab, b: Lab) -> f32 {
    let dl = a.l - b.l;
    let da = a.a - b.a;
    let db = a.b - b.b;
    (dl * dl + da * da + db * db).sqrt()
}

/// Hue angle in degrees, `0` for achromatic colors.
pub fn hue(lab: Lab) -> f32 {
    if lab.a == 0.0 && lab.b == 0.0 {
        return 0.0;
    }
    lab.b.atan2(lab.a).to_degrees()
}

pub fn chroma(lab: Lab) -> f32 {
    (lab.a * lab.a + lab.b * lab.b).sqrt()
}

/// Shortest distance between two hue angles, in degrees.
pub fn hue_distance(h1: f32, h2: f32) -> f32 {
    let diff = (h1 - h2).abs();
    diff.min(360.0 - diff)
}

/// Rotate the hue of `lab` by `degrees`, keeping lightness and chroma.
pub fn rotate_hue(lab: Lab, degrees: f32) -> Lab {
    let lch = Lch::from_color(lab).shift_hue(degrees);
    Lab::from_color(lch)
}

/// Lab of the pixel at `(x, y)`, or `None` if it is outside the image or
/// fully transparent.
pub fn pick(image: &RgbaImage, x: u32, y: u32) -> Option<Lab> {
    if x >= image.width() || y >= image.height() {
        return None;
    }
    let [r, g, b, a] = image.get_pixel(x, y).0;
    if a == 0 {
        return None;
    }
    Some(rgb_to_lab(r, g, b))
}

/// `RRGGBB` upper-case hex of a Lab color.
pub fn lab_to_hex(lab: Lab) -> String {
    let [r, g, b] = lab_to_rgb(lab);
    format!("{r:02X}{g:02X}{b:02X}")
}

/// Parse `RRGGBB` or `#RRGGBB`.
pub fn parse_hex(text: &str) -> Option<[u8; 3]> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: [u8; 3], b: [u8; 3]) {
        for c in 0..3 {
            let d = (a[c] as i16 - b[c] as i16).abs();
            assert!(d <= 1, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn round_trip_sampled_cube() {
        // Every 5th level per channel covers both ends and the gamma knee.
        for r in (0..=255u16).step_by(5) {
            for g in (0..=255u16).step_by(5) {
                for b in (0..=255u16).step_by(5) {
                    let rgb = [r as u8, g as u8, b as u8];
                    let back = lab_to_rgb(rgb_to_lab(rgb[0], rgb[1], rgb[2]));
                    assert_close(rgb, back);
                }
            }
        }
    }

    #[test]
    fn round_trip_grays_and_primaries() {
        for v in 0..=255u8 {
            assert_close([v, v, v], lab_to_rgb(rgb_to_lab(v, v, v)));
            assert_close([v, 0, 0], lab_to_rgb(rgb_to_lab(v, 0, 0)));
            assert_close([0, v, 0], lab_to_rgb(rgb_to_lab(0, v, 0)));
            assert_close([0, 0, v], lab_to_rgb(rgb_to_lab(0, 0, v)));
        }
    }

    #[test]
    fn white_and_black_anchor_lightness() {
        let white = rgb_to_lab(255, 255, 255);
        let black = rgb_to_lab(0, 0, 0);
        assert!((white.l - 100.0).abs() < 0.05);
        assert!(black.l.abs() < 0.05);
        assert!(chroma(white) < 0.05);
    }

    #[test]
    fn out_of_gamut_clamps() {
        assert_eq!(lab_to_rgb(Lab::new(150.0, 0.0, 0.0)), [255, 255, 255]);
        assert_eq!(lab_to_rgb(Lab::new(-20.0, 0.0, 0.0)), [0, 0, 0]);
    }

    #[test]
    fn hue_helpers() {
        assert_eq!(hue(Lab::new(50.0, 0.0, 0.0)), 0.0);
        assert!((hue(Lab::new(50.0, 0.0, 10.0)) - 90.0).abs() < 1e-4);
        assert_eq!(hue_distance(10.0, 350.0), 20.0);
        assert_eq!(hue_distance(0.0, 180.0), 180.0);
        assert!((chroma(Lab::new(50.0, 3.0, 4.0)) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn rotate_hue_keeps_chroma() {
        let lab = Lab::new(60.0, 20.0, 0.0);
        let rotated = rotate_hue(lab, 90.0);
        assert!((rotated.l - 60.0).abs() < 1e-3);
        assert!((chroma(rotated) - 20.0).abs() < 1e-3);
        assert!(rotated.a.abs() < 1e-3);
        assert!((rotated.b - 20.0).abs() < 1e-3);
    }

    #[test]
    fn delta_e_is_euclidean() {
        let d = delta_e(Lab::new(0.0, 0.0, 0.0), Lab::new(3.0, 4.0, 0.0));
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn pick_skips_transparent_and_outside() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([255, 0, 0, 0]));
        assert!(pick(&img, 0, 0).is_some());
        assert!(pick(&img, 1, 0).is_none());
        assert!(pick(&img, 5, 0).is_none());
    }

    #[test]
    fn hex_round_trip() {
        assert_eq!(parse_hex("#FF8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex("ff8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex("#FFF"), None);
        assert_eq!(lab_to_hex(rgb_to_lab(255, 128, 0)), "FF8000");
    }
}
