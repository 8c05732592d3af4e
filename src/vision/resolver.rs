//! Detection engine: template library, matcher, and the scale/location
//! resolver on top of them

use super::color::SafeColorFilter;
use super::matcher::{Matcher, MatchResult, is_hit};
use super::preprocess::Preprocessor;
use super::template::{Category, TemplateLibrary};
use image::RgbImage;

/// Best label found for a location frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMatch {
    /// `None` when the best score is under the threshold
    pub label: Option<String>,
    pub score: f32,
}

impl LocationMatch {
    pub fn unknown(score: f32) -> Self {
        Self { label: None, score }
    }
}

/// Pick the UI scale with the highest score at or above `threshold`.
///
/// Ties keep the earlier bucket.
pub fn pick_scale<'a>(
    scores: impl IntoIterator<Item = (&'a str, f32)>,
    threshold: f32,
) -> Option<String> {
    let mut best: Option<(&str, f32)> = None;
    for (scale, score) in scores {
        if !is_hit(score, threshold) {
            continue;
        }
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((scale, score));
        }
    }
    best.map(|(scale, _)| scale.to_string())
}

/// Owns the loaded templates and the matcher that must share their
/// preprocessing.
#[derive(Debug, Clone)]
pub struct Detector {
    library: TemplateLibrary,
    matcher: Matcher,
}

impl Detector {
    pub fn new(library: TemplateLibrary, safe_color: SafeColorFilter) -> Self {
        let matcher = Matcher::new(library.preprocessor().clone(), safe_color);
        Self { library, matcher }
    }

    /// Detector with no templates at all.
    pub fn empty() -> Self {
        Self::new(
            TemplateLibrary::empty(Preprocessor::default()),
            SafeColorFilter::default(),
        )
    }

    pub fn library(&self) -> &TemplateLibrary {
        &self.library
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Rescan the asset tree, returning the new template total.
    pub fn reload(&mut self) -> usize {
        self.library.reload()
    }

    pub fn count_matches(
        &self,
        frame: Option<&RgbImage>,
        category: Category,
        scale: &str,
        threshold: f32,
        exclude_safe_color: bool,
    ) -> MatchResult {
        self.matcher.count_matches(
            frame,
            self.library.templates(category, scale),
            threshold,
            exclude_safe_color,
        )
    }

    /// Probe every scale bucket's fingerprint templates.
    ///
    /// `None` means nothing qualified yet; callers retry on a later cycle.
    pub fn detect_scale(&self, frame: Option<&RgbImage>, threshold: f32) -> Option<String> {
        let frame = frame?;
        let scores: Vec<(&str, f32)> = self
            .library
            .scales()
            .iter()
            .map(|scale| {
                let result =
                    self.count_matches(Some(frame), Category::Scale, scale, threshold, false);
                log::debug!("📐 Scale {} fingerprint score {:.3}", scale, result.best_score);
                (scale.as_str(), result.best_score)
            })
            .collect();
        pick_scale(scores, threshold)
    }

    /// Best location label at an already resolved scale.
    pub fn match_location(
        &self,
        frame: Option<&RgbImage>,
        scale: &str,
        threshold: f32,
    ) -> LocationMatch {
        let Some(frame) = frame else {
            return LocationMatch::unknown(0.0);
        };
        let templates = self.library.templates(Category::Location, scale);
        if templates.is_empty() {
            return LocationMatch::unknown(0.0);
        }

        let processed = self.matcher.prepare(frame);
        let mut best_label: Option<&str> = None;
        let mut best_score = 0.0f32;
        for template in templates {
            let score = self.matcher.best_score(&processed, template);
            if score > best_score {
                best_score = score;
                best_label = template.label.as_deref();
            }
        }

        if is_hit(best_score, threshold) {
            LocationMatch {
                label: best_label.map(str::to_string),
                score: best_score,
            }
        } else {
            LocationMatch::unknown(best_score)
        }
    }
}
