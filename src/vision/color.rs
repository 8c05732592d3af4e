//! Friendly-colour exclusion
//!
//! Allied entities are drawn in green or blue; a shape match whose pixels sit
//! mostly in those hue bands is not a threat. The bands were tuned by hand
//! against one client's visuals, so they are configuration, not constants.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Inclusive HSV box on the 8-bit scale (H 0..180, S and V 0..255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvBand {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvBand {
    pub const GREEN: Self = Self {
        lower: [35, 40, 40],
        upper: [85, 255, 255],
    };

    pub const BLUE: Self = Self {
        lower: [95, 40, 40],
        upper: [135, 255, 255],
    };

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeColorFilter {
    pub bands: Vec<HsvBand>,
    /// A band must count strictly more pixels than this
    pub min_pixels: u32,
}

impl Default for SafeColorFilter {
    fn default() -> Self {
        Self {
            bands: vec![HsvBand::GREEN, HsvBand::BLUE],
            min_pixels: 8,
        }
    }
}

impl SafeColorFilter {
    /// Whether a colour crop reads as friendly. An empty crop never does.
    pub fn is_safe(&self, crop: &RgbImage) -> bool {
        if crop.width() == 0 || crop.height() == 0 {
            return false;
        }

        let mut counts = vec![0u32; self.bands.len()];
        for pixel in crop.pixels() {
            let hsv = rgb_to_hsv(*pixel);
            for (band, count) in self.bands.iter().zip(counts.iter_mut()) {
                if band.contains(hsv) {
                    *count += 1;
                }
            }
        }
        counts.iter().any(|&c| c > self.min_pixels)
    }
}

/// RGB to HSV with hue halved into 0..180, matching the common 8-bit
/// convention the band limits are expressed in.
pub fn rgb_to_hsv(Rgb([r, g, b]): Rgb<u8>) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta * 255.0 / max } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    [
        (h / 2.0).round().clamp(0.0, 180.0) as u8,
        s.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    ]
}
