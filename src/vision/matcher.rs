//! Template matching with distinct-detection counting
//!
//! Correlation is the zero-mean normalized cross correlation (correlation
//! coefficient) computed over the masked template pixels. Counting walks the
//! response surface peak by peak, erasing each visited neighbourhood, and
//! uses a bitmap of claimed frame pixels so that overlapping templates
//! cannot count the same object twice.

use super::color::SafeColorFilter;
use super::preprocess::Preprocessor;
use super::template::Template;
use image::{GrayImage, Luma, RgbImage};
use imageproc::definitions::Image;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use imageproc::rect::Rect;
use imageproc::template_matching::{
    MatchTemplateMethod, find_extremes, match_template_parallel, match_template_with_mask_parallel,
};

/// Peaks below this are noise; scanning a template stops there.
pub const NOISE_FLOOR: f32 = 0.2;

/// Value written over visited peaks.
const ERASED: f32 = -1.0;

/// Relative variance below which a window counts as flat.
const FLAT_WINDOW: f64 = 1e-6;

/// Whether a score counts as a detection. Inclusive at the threshold.
#[inline]
pub fn is_hit(score: f32, threshold: f32) -> bool {
    score >= threshold
}

/// Outcome of matching one template set against one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchResult {
    /// Distinct, non-overlapping detections at or above the threshold
    pub count: usize,
    /// Highest score seen that was not excluded as friendly, even below threshold
    pub best_score: f32,
    /// Highest score that was excluded as friendly
    pub suppressed_score: f32,
}

impl MatchResult {
    pub fn detected(&self) -> bool {
        self.count > 0
    }
}

/// Clamp NaN and infinities to zero before any comparison.
#[inline]
fn sanitize(score: f32) -> f32 {
    if score.is_finite() { score } else { 0.0 }
}

/// Correlation coefficient of `template` at every placement inside `image`.
///
/// Returns `None` when the template does not fit, is empty, or its mask
/// selects no pixels. Flat windows and flat templates score zero.
///
/// The raw cross term comes from imageproc's template matcher; window sums
/// come from integral images, or from mask-weighted passes when a mask is
/// present. The zero-mean numerator is then `sum(t*v) - mean(t) * sum(v)`.
pub fn correlation_surface(
    image: &GrayImage,
    template: &GrayImage,
    mask: Option<&GrayImage>,
) -> Option<Image<Luma<f32>>> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    // 0/1 selection over the template's own dimensions
    let selection = mask.map(|m| {
        GrayImage::from_fn(tw, th, |x, y| {
            let on = m.get_pixel_checked(x, y).is_some_and(|p| p[0] > 0);
            Luma([u8::from(on)])
        })
    });

    let selected = |x: u32, y: u32| selection.as_ref().is_none_or(|s| s.get_pixel(x, y)[0] > 0);
    let values: Vec<f64> = template
        .enumerate_pixels()
        .filter(|(x, y, _)| selected(*x, *y))
        .map(|(_, _, p)| p[0] as f64)
        .collect();
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let template_energy: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();

    let mut surface = Image::<Luma<f32>>::new(iw - tw + 1, ih - th + 1);
    if template_energy <= f64::EPSILON {
        return Some(surface);
    }

    let windows = match &selection {
        None => WindowSums::full(image, template),
        Some(selection) => WindowSums::masked(image, template, selection),
    };

    for (x, y, out) in surface.enumerate_pixels_mut() {
        let (cross, sum, sum_sq) = windows.at(x, y, tw, th);
        let variance = sum_sq - sum * sum / n;
        // f32 accumulation leaves rounding residue on flat windows
        let score = if variance > sum_sq * FLAT_WINDOW + f64::EPSILON {
            let numerator = cross - mean * sum;
            (numerator / (template_energy * variance).sqrt()).clamp(-1.0, 1.0) as f32
        } else {
            0.0
        };
        out[0] = sanitize(score);
    }

    Some(surface)
}

/// Per-placement sums for the correlation coefficient: the raw cross term
/// `sum(t*v)` plus `sum(v)` and `sum(v*v)` over the selected window pixels.
enum WindowSums {
    Full {
        cross: Image<Luma<f32>>,
        sums: Image<Luma<u64>>,
        squares: Image<Luma<u64>>,
    },
    Masked {
        cross: Image<Luma<f32>>,
        sums: Image<Luma<f32>>,
        squares: Image<Luma<f32>>,
    },
}

impl WindowSums {
    fn full(image: &GrayImage, template: &GrayImage) -> Self {
        Self::Full {
            cross: match_template_parallel(image, template, MatchTemplateMethod::CrossCorrelation),
            sums: integral_image::<_, u64>(image),
            squares: integral_squared_image::<_, u64>(image),
        }
    }

    /// `selection` is 0/1, so mask-weighted terms reduce to plain sums over
    /// the selected pixels.
    fn masked(image: &GrayImage, template: &GrayImage, selection: &GrayImage) -> Self {
        let (tw, th) = template.dimensions();
        let cut = GrayImage::from_fn(tw, th, |x, y| {
            Luma([template.get_pixel(x, y)[0] * selection.get_pixel(x, y)[0]])
        });
        // (0 - v)^2 under the selection is v^2
        let zeros = GrayImage::new(tw, th);
        Self::Masked {
            cross: match_template_parallel(image, &cut, MatchTemplateMethod::CrossCorrelation),
            sums: match_template_parallel(image, selection, MatchTemplateMethod::CrossCorrelation),
            squares: match_template_with_mask_parallel(
                image,
                &zeros,
                MatchTemplateMethod::SumOfSquaredErrors,
                selection,
            ),
        }
    }

    fn at(&self, x: u32, y: u32, tw: u32, th: u32) -> (f64, f64, f64) {
        match self {
            Self::Full {
                cross,
                sums,
                squares,
            } => {
                let (right, bottom) = (x + tw - 1, y + th - 1);
                let sum = sum_image_pixels(sums, x, y, right, bottom)[0];
                let sum_sq = sum_image_pixels(squares, x, y, right, bottom)[0];
                (cross.get_pixel(x, y)[0] as f64, sum as f64, sum_sq as f64)
            }
            Self::Masked {
                cross,
                sums,
                squares,
            } => (
                cross.get_pixel(x, y)[0] as f64,
                sums.get_pixel(x, y)[0] as f64,
                squares.get_pixel(x, y)[0] as f64,
            ),
        }
    }
}

/// Running state of one `count_matches` call across its templates.
struct Tally {
    /// Frame pixels already covered by a counted detection
    claimed: GrayImage,
    result: MatchResult,
}

/// Matches preprocessed templates against raw colour frames.
#[derive(Debug, Clone)]
pub struct Matcher {
    preprocessor: Preprocessor,
    safe_color: SafeColorFilter,
    noise_floor: f32,
}

impl Matcher {
    pub fn new(preprocessor: Preprocessor, safe_color: SafeColorFilter) -> Self {
        Self {
            preprocessor,
            safe_color,
            noise_floor: NOISE_FLOOR,
        }
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Grayscale and preprocess a colour frame.
    pub fn prepare(&self, frame: &RgbImage) -> GrayImage {
        self.preprocessor.apply(&image::imageops::grayscale(frame))
    }

    /// Count distinct detections of any template in `frame`.
    ///
    /// With `exclude_safe_color`, peaks whose colour crop reads as friendly
    /// are erased without counting and only reported in `suppressed_score`.
    pub fn count_matches(
        &self,
        frame: Option<&RgbImage>,
        templates: &[Template],
        threshold: f32,
        exclude_safe_color: bool,
    ) -> MatchResult {
        let result = MatchResult::default();
        let Some(frame) = frame else {
            return result;
        };
        if templates.is_empty() || frame.width() == 0 || frame.height() == 0 {
            return result;
        }

        let processed = self.prepare(frame);
        let mut tally = Tally {
            claimed: GrayImage::new(frame.width(), frame.height()),
            result,
        };

        for template in templates {
            let Some(surface) =
                correlation_surface(&processed, &template.image, template.mask.as_ref())
            else {
                continue;
            };
            let size = (template.width(), template.height());
            self.walk_peaks(frame, surface, size, threshold, exclude_safe_color, &mut tally);
        }

        tally.result
    }

    /// Visit peaks of one template's surface from the highest down to the
    /// noise floor, counting detections whose centre is still unclaimed.
    fn walk_peaks(
        &self,
        frame: &RgbImage,
        mut surface: Image<Luma<f32>>,
        (tw, th): (u32, u32),
        threshold: f32,
        exclude_safe_color: bool,
        tally: &mut Tally,
    ) {
        for score in surface.iter_mut() {
            *score = sanitize(*score);
        }

        loop {
            let extremes = find_extremes(&surface);
            let score = sanitize(extremes.max_value);
            let (x, y) = extremes.max_value_location;

            if score < self.noise_floor {
                break;
            }

            if exclude_safe_color {
                let crop = image::imageops::crop_imm(frame, x, y, tw, th).to_image();
                if self.safe_color.is_safe(&crop) {
                    tally.result.suppressed_score = tally.result.suppressed_score.max(score);
                    erase_peak(&mut surface, x, y, tw, th);
                    continue;
                }
            }

            tally.result.best_score = tally.result.best_score.max(score);
            if !is_hit(score, threshold) {
                break;
            }

            let (cx, cy) = (x + tw / 2, y + th / 2);
            if tally.claimed.get_pixel_checked(cx, cy).is_some_and(|p| p[0] == 0) {
                tally.result.count += 1;
                draw_filled_rect_mut(
                    &mut tally.claimed,
                    Rect::at(x as i32, y as i32).of_size(tw, th),
                    Luma([255u8]),
                );
            }
            erase_peak(&mut surface, x, y, tw, th);
        }
    }

    /// Best single correlation of one template anywhere in the frame.
    pub fn best_score(&self, processed: &GrayImage, template: &Template) -> f32 {
        correlation_surface(processed, &template.image, template.mask.as_ref())
            .map(|surface| sanitize(find_extremes(&surface).max_value))
            .unwrap_or(0.0)
    }
}

/// Blank a template-sized neighbourhood centred on a visited peak.
fn erase_peak(surface: &mut Image<Luma<f32>>, x: u32, y: u32, tw: u32, th: u32) {
    let left = x as i32 - (tw / 2) as i32;
    let top = y as i32 - (th / 2) as i32;
    draw_filled_rect_mut(surface, Rect::at(left, top).of_size(tw, th), Luma([ERASED]));
    // Rect sizes are at least 1, so the peak itself is always covered
    surface.put_pixel(x, y, Luma([ERASED]));
}
