//! Persisted configuration and the per-cycle resolved settings
//!
//! `Config` mirrors the JSON file field for field and tolerates partial or
//! older files (every field has a default). The decision loop never reads
//! it directly: it takes one snapshot per cycle and resolves it into
//! `Settings`, where every threshold and interval is filled in.

use super::error::{ConfigError, ConfigResult};
use crate::capture::Region;
use crate::vision::{Category, PreprocessConfig, SafeColorFilter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.95;
pub const DEFAULT_RECOGNITION_THRESHOLD: f32 = 0.85;

/// Screen regions of one game client. `null` or zero-size means unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRegions {
    pub local: Option<Region>,
    pub overview: Option<Region>,
    pub monster: Option<Region>,
    pub probe: Option<Region>,
    /// Solar-system name area, used for location recognition
    pub location: Option<Region>,
}

impl GroupRegions {
    /// The usable region for a category, if one is set.
    pub fn get(&self, category: Category) -> Option<Region> {
        let region = match category {
            Category::Local => self.local,
            Category::Overview => self.overview,
            Category::Monster => self.monster,
            Category::Probe => self.probe,
            Category::Location => self.location,
            Category::Scale => None,
        };
        region.filter(Region::is_valid)
    }

    pub fn set(&mut self, category: Category, region: Option<Region>) {
        match category {
            Category::Local => self.local = region,
            Category::Overview => self.overview = region,
            Category::Monster => self.monster = region,
            Category::Probe => self.probe = region,
            Category::Location => self.location = region,
            Category::Scale => {}
        }
    }

    /// A client is scanned only when it watches local or overview.
    pub fn has_threat_region(&self) -> bool {
        self.get(Category::Local).is_some() || self.get(Category::Overview).is_some()
    }
}

/// One monitored game client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientGroup {
    /// Stable identifier; per-client runtime state is keyed by it
    pub id: u32,
    pub name: String,
    pub regions: GroupRegions,
    /// Resolved UI-scale key, written back once detected
    pub scale: Option<String>,
    /// Last recognised location label
    pub location: Option<String>,
}

impl Default for ClientGroup {
    fn default() -> Self {
        Self {
            id: 0,
            name: "Client 1".to_string(),
            regions: GroupRegions::default(),
            scale: None,
            location: None,
        }
    }
}

impl ClientGroup {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub groups: Vec<ClientGroup>,
    /// Loosely keyed by category name; missing keys resolve to defaults
    pub thresholds: BTreeMap<String, f32>,
    /// Empty disables the webhook
    pub webhook_url: String,
    /// Seconds between cycles while anything is pending or confirmed
    pub jitter_delay: f64,
    /// Seconds between cycles while everything is clear
    pub scan_interval: f64,
    pub alert_cooldown: f64,
    pub probe_cooldown: f64,
    pub scale_check_interval: f64,
    pub location_check_interval: f64,
    /// Consecutive detection cycles needed to confirm
    pub confirm_cycles: u32,
    pub scales: Vec<String>,
    /// Scale used for matching until a client's scale is resolved
    pub default_scale: String,
    pub preprocess: PreprocessConfig,
    pub safe_color: SafeColorFilter,
    pub assets_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let thresholds = [Category::Local, Category::Overview, Category::Monster, Category::Probe]
            .iter()
            .map(|c| (c.key().to_string(), DEFAULT_DETECTION_THRESHOLD))
            .collect();
        Self {
            groups: vec![ClientGroup::default()],
            thresholds,
            webhook_url: String::new(),
            jitter_delay: 0.18,
            scan_interval: 0.5,
            alert_cooldown: 2.0,
            probe_cooldown: 2.0,
            scale_check_interval: 3.0,
            location_check_interval: 2.0,
            confirm_cycles: 2,
            scales: vec!["90".to_string(), "100".to_string(), "125".to_string()],
            default_scale: "100".to_string(),
            preprocess: PreprocessConfig::default(),
            safe_color: SafeColorFilter::default(),
            assets_dir: PathBuf::from("assets"),
        }
    }
}

impl Config {
    pub fn group(&self, id: u32) -> Option<&ClientGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn group_mut(&mut self, id: u32) -> Option<&mut ClientGroup> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    /// Next free group id.
    pub fn next_group_id(&self) -> u32 {
        self.groups.iter().map(|g| g.id + 1).max().unwrap_or(0)
    }
}

/// Fully populated thresholds for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub local: f32,
    pub overview: f32,
    pub monster: f32,
    pub probe: f32,
    pub location: f32,
    pub scale: f32,
}

impl Thresholds {
    pub fn get(&self, category: Category) -> f32 {
        match category {
            Category::Local => self.local,
            Category::Overview => self.overview,
            Category::Monster => self.monster,
            Category::Probe => self.probe,
            Category::Location => self.location,
            Category::Scale => self.scale,
        }
    }
}

/// Everything the decision loop needs from one configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub thresholds: Thresholds,
    pub webhook_url: String,
    pub jitter_delay: Duration,
    pub scan_interval: Duration,
    pub alert_cooldown: Duration,
    pub probe_cooldown: Duration,
    pub scale_check_interval: Duration,
    pub location_check_interval: Duration,
    pub confirm_cycles: u32,
    pub default_scale: String,
}

impl Settings {
    pub fn resolve(config: &Config) -> Self {
        let threshold = |category: Category, default: f32| {
            config
                .thresholds
                .get(category.key())
                .copied()
                .filter(|t| t.is_finite())
                .unwrap_or(default)
        };

        Self {
            thresholds: Thresholds {
                local: threshold(Category::Local, DEFAULT_DETECTION_THRESHOLD),
                overview: threshold(Category::Overview, DEFAULT_DETECTION_THRESHOLD),
                monster: threshold(Category::Monster, DEFAULT_DETECTION_THRESHOLD),
                probe: threshold(Category::Probe, DEFAULT_DETECTION_THRESHOLD),
                location: threshold(Category::Location, DEFAULT_RECOGNITION_THRESHOLD),
                scale: threshold(Category::Scale, DEFAULT_RECOGNITION_THRESHOLD),
            },
            webhook_url: config.webhook_url.trim().to_string(),
            jitter_delay: seconds(config.jitter_delay),
            scan_interval: seconds(config.scan_interval),
            alert_cooldown: seconds(config.alert_cooldown),
            probe_cooldown: seconds(config.probe_cooldown),
            scale_check_interval: seconds(config.scale_check_interval),
            location_check_interval: seconds(config.location_check_interval),
            confirm_cycles: config.confirm_cycles.max(1),
            default_scale: config.default_scale.clone(),
        }
    }
}

/// Negative, NaN, or absurd values collapse to zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Where the decision loop reads its snapshot and writes back resolved state.
pub trait ConfigStore: Send + Sync {
    /// A value copy of the current configuration.
    fn snapshot(&self) -> Config;

    /// Mutate the configuration; implementations persist immediately.
    fn update(&self, change: &mut dyn FnMut(&mut Config));
}

/// In-memory store, for headless runs and tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<Config>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn snapshot(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, change: &mut dyn FnMut(&mut Config)) {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        change(&mut config);
    }
}

/// JSON file store, written pretty-printed on every update.
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
    config: Mutex<Config>,
}

impl JsonConfigStore {
    /// Load `path`, or start from defaults when it does not exist yet.
    pub fn open_or_default(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let config = if path.exists() {
            load(&path)?
        } else {
            log::info!("📝 No config at {}, using defaults", path.display());
            Config::default()
        };
        Ok(Self {
            path,
            config: Mutex::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> ConfigResult<()> {
        let config = self.snapshot();
        save(&self.path, &config)
    }
}

impl ConfigStore for JsonConfigStore {
    fn snapshot(&self) -> Config {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, change: &mut dyn FnMut(&mut Config)) {
        let snapshot = {
            let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
            change(&mut config);
            config.clone()
        };
        if let Err(e) = save(&self.path, &snapshot) {
            log::warn!("⚠️ {}", e);
        }
    }
}

pub fn load(path: &Path) -> ConfigResult<Config> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save(path: &Path, config: &Config) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
