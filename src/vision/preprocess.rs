//! Frame and template normalization
//!
//! Both live frames and library templates go through the same pipeline so
//! their correlation scores stay comparable:
//! - gamma correction (exponent > 1 darkens midtones and ambient noise)
//! - truncation of everything below a noise floor to zero
//! - optional contrast limited adaptive histogram equalization (CLAHE)

use image::GrayImage;
use imageproc::map::map_subpixels;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Gamma exponent applied as `255 * (v / 255)^gamma`
    pub gamma: f32,
    /// Values strictly below this (after gamma) become zero
    pub noise_floor: u8,
    /// Enable CLAHE after truncation
    pub equalize: bool,
    /// CLAHE clip limit, relative to a flat histogram
    pub clip_limit: f32,
    /// CLAHE tile grid (columns, rows)
    pub tile_grid: (u32, u32),
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            gamma: 1.5,
            noise_floor: 30,
            equalize: false,
            clip_limit: 1.5,
            tile_grid: (8, 8),
        }
    }
}

/// Stateless preprocessing pipeline with its lookup table precomputed.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
    lut: [u8; 256],
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        let lut = build_lut(config.gamma, config.noise_floor);
        Self { config, lut }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Run the full pipeline. Zero-size input comes back unchanged.
    pub fn apply(&self, gray: &GrayImage) -> GrayImage {
        if gray.width() == 0 || gray.height() == 0 {
            return gray.clone();
        }

        let lut = &self.lut;
        let truncated = map_subpixels(gray, |v: u8| lut[v as usize]);

        if self.config.equalize {
            clahe(&truncated, self.config.clip_limit, self.config.tile_grid)
        } else {
            truncated
        }
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

/// Gamma and noise-floor truncation folded into one table.
fn build_lut(gamma: f32, noise_floor: u8) -> [u8; 256] {
    let gamma = if gamma.is_finite() && gamma > 0.0 {
        gamma as f64
    } else {
        1.0
    };
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = ((i as f64 / 255.0).powf(gamma) * 255.0).round().clamp(0.0, 255.0) as u8;
        *entry = if v < noise_floor { 0 } else { v };
    }
    lut
}

/// Contrast limited adaptive histogram equalization.
///
/// Each tile gets a clipped, redistributed histogram mapping; pixels are
/// bilinearly interpolated between the mappings of the four nearest tiles.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tile_grid: (u32, u32)) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tiles_x = tile_grid.0.clamp(1, width);
    let tiles_y = tile_grid.1.clamp(1, height);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);

    let mut maps = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            maps.push(tile_mapping(gray, (x0, y0, x1, y1), clip_limit));
        }
    }

    let map_at = |tx: u32, ty: u32| &maps[(ty * tiles_x + tx) as usize];

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let v = gray.get_pixel(x, y)[0] as usize;

        let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).max(0.0);
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).max(0.0);
        let tx0 = (fx.floor() as u32).min(tiles_x - 1);
        let ty0 = (fy.floor() as u32).min(tiles_y - 1);
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let ax = (fx - tx0 as f32).clamp(0.0, 1.0);
        let ay = (fy - ty0 as f32).clamp(0.0, 1.0);

        let top = map_at(tx0, ty0)[v] as f32 * (1.0 - ax) + map_at(tx1, ty0)[v] as f32 * ax;
        let bottom = map_at(tx0, ty1)[v] as f32 * (1.0 - ax) + map_at(tx1, ty1)[v] as f32 * ax;
        pixel[0] = (top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8;
    }
    out
}

fn tile_mapping(
    gray: &GrayImage,
    (x0, y0, x1, y1): (u32, u32, u32, u32),
    clip_limit: f32,
) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let area = ((x1 - x0) * (y1 - y0)).max(1);

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let share = excess / 256;
        let remainder = (excess % 256) as usize;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += share + u32::from(i < remainder);
        }
    }

    let mut mapping = [0u8; 256];
    let mut cdf = 0u32;
    for (i, count) in hist.iter().enumerate() {
        cdf += count;
        mapping[i] = ((cdf as f32 * 255.0 / area as f32).round()).clamp(0.0, 255.0) as u8;
    }
    mapping
}
