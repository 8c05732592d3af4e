//! Template library: preprocessed reference images per category and UI scale

use super::error::{VisionError, VisionResult};
use super::preprocess::Preprocessor;
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Local,
    Overview,
    Monster,
    Probe,
    Location,
    Scale,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Local,
        Category::Overview,
        Category::Monster,
        Category::Probe,
        Category::Location,
        Category::Scale,
    ];

    /// Categories that go through debounce every cycle.
    pub const DETECTION: [Category; 4] = [
        Category::Local,
        Category::Overview,
        Category::Monster,
        Category::Probe,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Category::Local => "local",
            Category::Overview => "overview",
            Category::Monster => "monster",
            Category::Probe => "probe",
            Category::Location => "location",
            Category::Scale => "scale",
        }
    }

    /// Asset folder under the library root.
    pub fn folder(self) -> &'static str {
        match self {
            Category::Local => "hostile_icons_local",
            Category::Overview => "hostile_icons_overview",
            Category::Monster => "monster_icons",
            Category::Probe => "probe_icons",
            Category::Location => "location",
            Category::Scale => "ui_scaling_adaptation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A preprocessed reference image.
#[derive(Debug, Clone)]
pub struct Template {
    pub image: GrayImage,
    /// Binary match mask (255 = pixel participates), from the alpha channel
    pub mask: Option<GrayImage>,
    /// File stem, kept for location templates only
    pub label: Option<String>,
}

impl Template {
    pub fn new(image: GrayImage, mask: Option<GrayImage>, label: Option<String>) -> Self {
        Self { image, mask, label }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Decode one file and run it through the preprocessor.
    pub fn load(path: &Path, preprocessor: &Preprocessor, keep_label: bool) -> VisionResult<Self> {
        // Sniff the format from content so upper-case or odd extensions still load
        let reader = image::ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|source| VisionError::TemplateRead {
                path: path.to_path_buf(),
                source,
            })?;
        let decoded = reader.decode().map_err(|source| VisionError::TemplateDecode {
            path: path.to_path_buf(),
            source,
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(VisionError::EmptyTemplate {
                path: path.to_path_buf(),
            });
        }

        let mask = if decoded.color().has_alpha() {
            match alpha_mask(&decoded) {
                AlphaMask::Opaque => None,
                AlphaMask::Transparent => {
                    return Err(VisionError::EmptyTemplate {
                        path: path.to_path_buf(),
                    });
                }
                AlphaMask::Partial(mask) => Some(mask),
            }
        } else {
            None
        };

        let image = preprocessor.apply(&decoded.to_luma8());
        let label = if keep_label {
            path.file_stem().map(|s| s.to_string_lossy().into_owned())
        } else {
            None
        };

        Ok(Self { image, mask, label })
    }
}

enum AlphaMask {
    Opaque,
    Transparent,
    Partial(GrayImage),
}

fn alpha_mask(decoded: &DynamicImage) -> AlphaMask {
    let rgba = decoded.to_rgba8();
    let mut mask = GrayImage::new(rgba.width(), rgba.height());
    let mut visible = 0usize;
    for (x, y, pixel) in rgba.enumerate_pixels() {
        if pixel[3] > 0 {
            mask.put_pixel(x, y, Luma([255]));
            visible += 1;
        }
    }
    let total = (rgba.width() * rgba.height()) as usize;
    match visible {
        0 => AlphaMask::Transparent,
        v if v == total => AlphaMask::Opaque,
        _ => AlphaMask::Partial(mask),
    }
}

/// All templates, by category then UI-scale key.
///
/// Immutable once loaded; `reload` builds a fresh set from disk.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    root: PathBuf,
    scales: Vec<String>,
    preprocessor: Preprocessor,
    templates: HashMap<Category, BTreeMap<String, Vec<Template>>>,
}

impl TemplateLibrary {
    /// An empty library; every lookup yields no templates.
    pub fn empty(preprocessor: Preprocessor) -> Self {
        Self {
            root: PathBuf::new(),
            scales: Vec::new(),
            preprocessor,
            templates: HashMap::new(),
        }
    }

    /// Scan `<root>/<category folder>/<scale>/` for every category and scale.
    ///
    /// Missing folders and unreadable files are not errors; they just leave
    /// that category smaller.
    pub fn load(root: impl AsRef<Path>, scales: &[String], preprocessor: Preprocessor) -> Self {
        let mut library = Self {
            root: root.as_ref().to_path_buf(),
            scales: scales.to_vec(),
            preprocessor,
            templates: HashMap::new(),
        };
        library.scan();
        library
    }

    /// Rescan the same root with the same preprocessing.
    pub fn reload(&mut self) -> usize {
        self.templates.clear();
        self.scan();
        self.total()
    }

    fn scan(&mut self) {
        for category in Category::ALL {
            let keep_label = category == Category::Location;
            let per_scale = self.templates.entry(category).or_default();
            for scale in &self.scales {
                let dir = self.root.join(category.folder()).join(scale);
                let loaded = load_directory(&dir, &self.preprocessor, keep_label);
                per_scale.insert(scale.clone(), loaded);
            }
        }

        log::info!(
            "🧩 Loaded {} templates from {} (scales: {})",
            self.total(),
            self.root.display(),
            self.scales.join(", ")
        );
        for category in Category::ALL {
            if self.count(category) == 0 {
                log::warn!("⚠️ No templates for category '{}'", category);
            }
        }
    }

    /// Templates for one category and scale, empty when none exist.
    pub fn templates(&self, category: Category, scale: &str) -> &[Template] {
        self.templates
            .get(&category)
            .and_then(|per_scale| per_scale.get(scale))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Insert templates directly, replacing what was there.
    pub fn insert(&mut self, category: Category, scale: &str, templates: Vec<Template>) {
        if !self.scales.iter().any(|s| s == scale) {
            self.scales.push(scale.to_string());
        }
        self.templates
            .entry(category)
            .or_default()
            .insert(scale.to_string(), templates);
    }

    pub fn scales(&self) -> &[String] {
        &self.scales
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn count(&self, category: Category) -> usize {
        self.templates
            .get(&category)
            .map(|per_scale| per_scale.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        Category::ALL.iter().map(|&c| self.count(c)).sum()
    }

    /// Short multi-line summary for the startup self-check.
    pub fn status(&self) -> String {
        let per_category = Category::ALL
            .iter()
            .map(|&c| format!("{}={}", c, self.count(c)))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "Assets Path: {} | Scales Loaded: {} | Total Templates: {} ({})",
            self.root.display(),
            self.scales.join(", "),
            self.total(),
            per_category
        )
    }
}

fn load_directory(dir: &Path, preprocessor: &Preprocessor, keep_label: bool) -> Vec<Template> {
    let paths = match list_images(dir) {
        Ok(paths) => paths,
        Err(VisionError::DirectoryUnreadable { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            return Vec::new();
        }
        Err(e) => {
            log::warn!("⚠️ {}", e);
            return Vec::new();
        }
    };

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        match Template::load(&path, preprocessor, keep_label) {
            Ok(template) => templates.push(template),
            Err(e) => log::warn!("⚠️ Skipping template: {}", e),
        }
    }
    templates
}

fn list_images(dir: &Path) -> VisionResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| VisionError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    paths.sort();
    Ok(paths)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
