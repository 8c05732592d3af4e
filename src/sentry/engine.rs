//! Decision loop and the start/stop state machine around it
//!
//! One cycle: snapshot the configuration, scan every client, fold raw
//! detections through debounce, resolve priority across clients, gate
//! through the cooldowns, emit events, and compute the metronome sleep.
//! A single worker thread owns the `DecisionLoop`; the only place it waits
//! is the inter-cycle sleep, which doubles as the stop signal receiver.

use super::config::{ClientGroup, Config, ConfigStore, Settings};
use super::cooldown::CooldownGate;
use super::debounce::{Debounce, DetectionState};
use super::error::{EngineError, EngineResult};
use super::priority::resolve_alert;
use super::schedule::{cycle_target, is_due, next_sleep};
use super::types::{AlertCategory, AlertEvent, ClientRef, EngineState, ProbeEvent, SentryEvent};
use super::webhook::{self, WebhookAlert};
use crate::capture::{Region, ScreenCapture};
use crate::vision::{Category, Detector, MatchResult};
use image::RgbImage;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Matching parameters per detection category: friendly-colour exclusion is
/// only meaningful for the hostile panels.
fn excludes_safe_color(category: Category) -> bool {
    matches!(category, Category::Local | Category::Overview)
}

/// Runtime state of one configured client, keyed by its stable group id.
#[derive(Debug, Clone, Default)]
struct ClientSlot {
    debounce: BTreeMap<Category, Debounce>,
    scale: Option<String>,
    location: Option<String>,
    last_scale_check: Option<Instant>,
    last_location_check: Option<Instant>,
}

/// What one client looked like this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientReport {
    pub client: ClientRef,
    /// Resolved scale, `None` while still matching at the default scale
    pub scale: Option<String>,
    pub states: BTreeMap<Category, DetectionState>,
    pub matches: BTreeMap<Category, MatchResult>,
}

impl ClientReport {
    pub fn state(&self, category: Category) -> DetectionState {
        self.states
            .get(&category)
            .copied()
            .unwrap_or(DetectionState::Clear)
    }

    pub fn confirmed(&self, category: Category) -> bool {
        self.state(category).is_confirmed()
    }

    pub fn is_active(&self) -> bool {
        self.states.values().any(|s| s.is_active())
    }

    /// Whether this client's confirmed states feed into `category`.
    fn contributes_to(&self, category: AlertCategory) -> bool {
        match category {
            AlertCategory::Local => self.confirmed(Category::Local),
            AlertCategory::Overview => self.confirmed(Category::Overview),
            AlertCategory::Monster => self.confirmed(Category::Monster),
            AlertCategory::Mixed => {
                self.confirmed(Category::Local)
                    || self.confirmed(Category::Overview)
                    || self.confirmed(Category::Monster)
            }
        }
    }

    fn status_line(&self) -> String {
        let states = Category::DETECTION
            .iter()
            .map(|&category| {
                let count = self.matches.get(&category).map(|m| m.count).unwrap_or(0);
                let marker = match self.state(category) {
                    DetectionState::Clear => String::new(),
                    DetectionState::Pending(n) => format!("~{n}"),
                    DetectionState::Confirmed => "!".to_string(),
                };
                format!("{}={}{}", category, count, marker)
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "🔎 [{}] {} scale={}",
            self.client,
            states,
            self.scale.as_deref().unwrap_or("?")
        )
    }
}

/// Outcome of one `run_cycle`.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Resolved alert this cycle, whether or not the cooldown let it through
    pub alert: Option<AlertCategory>,
    pub alert_emitted: bool,
    pub probe_emitted: bool,
    /// Anything pending or confirmed on any client
    pub active: bool,
    pub sleep: Duration,
    pub clients: Vec<ClientReport>,
}

/// Read-only collaborators of one cycle.
struct CycleContext<'a> {
    detector: &'a Detector,
    capture: &'a dyn ScreenCapture,
    config: &'a dyn ConfigStore,
    events: &'a Sender<SentryEvent>,
    settings: &'a Settings,
    now: Instant,
}

impl CycleContext<'_> {
    fn emit(&self, event: SentryEvent) {
        // A dropped receiver only means nobody is listening
        let _ = self.events.send(event);
    }

    fn grab(&self, group: &ClientGroup, category: Category) -> Option<RgbImage> {
        let region: Region = group.regions.get(category)?;
        match self.capture.capture(region) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!("⚠️ [{}] {} capture failed: {}", group.name, category, e);
                None
            }
        }
    }
}

impl ClientSlot {
    fn new(group: &ClientGroup) -> Self {
        Self {
            scale: group.scale.clone(),
            ..Self::default()
        }
    }

    fn scan(&mut self, group: &ClientGroup, ctx: &CycleContext<'_>) -> ClientReport {
        let settings = ctx.settings;
        if group.scale.is_some() {
            self.scale = group.scale.clone();
        }

        let frames: HashMap<Category, RgbImage> = Category::DETECTION
            .iter()
            .filter_map(|&category| ctx.grab(group, category).map(|frame| (category, frame)))
            .collect();

        if self.scale.is_none()
            && is_due(self.last_scale_check, ctx.now, settings.scale_check_interval)
        {
            self.last_scale_check = Some(ctx.now);
            let probe_frame = frames
                .get(&Category::Local)
                .or_else(|| frames.get(&Category::Overview));
            if let Some(scale) = ctx.detector.detect_scale(probe_frame, settings.thresholds.scale) {
                log::info!("📐 [{}] UI scale resolved: {}", group.name, scale);
                ctx.emit(SentryEvent::Log(format!("📐 [{}] UI scale: {}%", group.name, scale)));
                let id = group.id;
                ctx.config.update(&mut |config: &mut Config| {
                    if let Some(stored) = config.group_mut(id) {
                        stored.scale = Some(scale.clone());
                    }
                });
                self.scale = Some(scale);
            }
        }

        let scale = self
            .scale
            .clone()
            .unwrap_or_else(|| settings.default_scale.clone());

        let mut states = BTreeMap::new();
        let mut matches = BTreeMap::new();
        for category in Category::DETECTION {
            let result = ctx.detector.count_matches(
                frames.get(&category),
                category,
                &scale,
                settings.thresholds.get(category),
                excludes_safe_color(category),
            );
            let state = self
                .debounce
                .entry(category)
                .or_default()
                .update(result.detected(), settings.confirm_cycles);
            states.insert(category, state);
            matches.insert(category, result);
        }

        if let Some(resolved) = self.scale.clone() {
            self.check_location(group, &resolved, ctx);
        }

        ClientReport {
            client: ClientRef {
                id: group.id,
                name: group.name.clone(),
            },
            scale: self.scale.clone(),
            states,
            matches,
        }
    }

    fn check_location(&mut self, group: &ClientGroup, scale: &str, ctx: &CycleContext<'_>) {
        if group.regions.get(Category::Location).is_none()
            || !is_due(self.last_location_check, ctx.now, ctx.settings.location_check_interval)
        {
            return;
        }
        self.last_location_check = Some(ctx.now);

        let frame = ctx.grab(group, Category::Location);
        let found = ctx
            .detector
            .match_location(frame.as_ref(), scale, ctx.settings.thresholds.location);
        let label = found.label.unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
        log::debug!("📍 [{}] location {} ({:.3})", group.name, label, found.score);

        if self.location.as_deref() == Some(label.as_str()) {
            return;
        }
        self.location = Some(label.clone());

        let id = group.id;
        let persisted = label.clone();
        ctx.config.update(&mut |config: &mut Config| {
            if let Some(stored) = config.group_mut(id) {
                stored.location = Some(persisted.clone());
            }
        });
        ctx.emit(SentryEvent::Location {
            client: ClientRef {
                id,
                name: group.name.clone(),
            },
            label,
        });
    }
}

/// The scan loop body. Owned by exactly one worker thread while running.
pub struct DecisionLoop {
    detector: Arc<Detector>,
    capture: Arc<dyn ScreenCapture>,
    config: Arc<dyn ConfigStore>,
    events: Sender<SentryEvent>,
    slots: BTreeMap<u32, ClientSlot>,
    cooldown: CooldownGate,
    first_run: bool,
}

impl DecisionLoop {
    pub fn new(
        detector: Arc<Detector>,
        capture: Arc<dyn ScreenCapture>,
        config: Arc<dyn ConfigStore>,
        events: Sender<SentryEvent>,
    ) -> Self {
        Self {
            detector,
            capture,
            config,
            events,
            slots: BTreeMap::new(),
            cooldown: CooldownGate::new(),
            first_run: true,
        }
    }

    /// Run one full cycle and report what happened, including how long to
    /// sleep before the next one.
    pub fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let config = self.config.snapshot();
        let settings = Settings::resolve(&config);

        self.sync_slots(&config.groups);

        let ctx = CycleContext {
            detector: &self.detector,
            capture: self.capture.as_ref(),
            config: self.config.as_ref(),
            events: &self.events,
            settings: &settings,
            now: started,
        };

        if self.first_run {
            self.first_run = false;
            let with_regions = config
                .groups
                .iter()
                .filter(|g| g.regions.has_threat_region())
                .count();
            let line = format!(
                "🧪 Self-check | {} | Clients: {} configured, {} with local/overview regions",
                self.detector.library().status(),
                config.groups.len(),
                with_regions
            );
            log::info!("{}", line);
            ctx.emit(SentryEvent::Log(line));
            if with_regions == 0 {
                log::warn!("⚠️ No client has a local or overview region; nothing will alert");
            }
        }

        let mut clients = Vec::with_capacity(config.groups.len());
        for group in &config.groups {
            let Some(slot) = self.slots.get_mut(&group.id) else {
                continue;
            };
            let report = slot.scan(group, &ctx);
            if group.regions.has_threat_region() {
                let line = report.status_line();
                log::debug!("{}", line);
                ctx.emit(SentryEvent::Log(line));
            }
            clients.push(report);
        }

        let any = |category: Category| clients.iter().any(|c| c.confirmed(category));
        let alert = resolve_alert(
            any(Category::Local),
            any(Category::Overview),
            any(Category::Monster),
        );

        let due = alert.filter(|&category| {
            self.cooldown.should_alert(category, started, settings.alert_cooldown)
        });
        let alert_emitted = due.is_some();
        if let Some(category) = due {
            let triggering: Vec<ClientRef> = clients
                .iter()
                .filter(|c| c.contributes_to(category))
                .map(|c| c.client.clone())
                .collect();
            let event = SentryEvent::Alert(AlertEvent {
                category,
                clients: triggering,
            });
            log::info!("{}", event);
            ctx.emit(event);
            webhook::dispatch(&settings.webhook_url, WebhookAlert::Threat(category));
        }

        let mut probe_emitted = false;
        if any(Category::Probe) && self.cooldown.should_probe(started, settings.probe_cooldown) {
            probe_emitted = true;
            let triggering: Vec<ClientRef> = clients
                .iter()
                .filter(|c| c.confirmed(Category::Probe))
                .map(|c| c.client.clone())
                .collect();
            let event = SentryEvent::Probe(ProbeEvent { clients: triggering });
            log::info!("{}", event);
            ctx.emit(event);
            webhook::dispatch(&settings.webhook_url, WebhookAlert::Probe);
        }

        let active = clients.iter().any(ClientReport::is_active);
        let sleep = next_sleep(cycle_target(active, &settings), started.elapsed());

        CycleReport {
            alert,
            alert_emitted,
            probe_emitted,
            active,
            sleep,
            clients,
        }
    }

    /// Match slots to configured groups by id: new ids get a fresh slot,
    /// removed ids lose theirs.
    fn sync_slots(&mut self, groups: &[ClientGroup]) {
        self.slots.retain(|id, _| {
            let keep = groups.iter().any(|g| g.id == *id);
            if !keep {
                log::debug!("➖ Dropping client slot {}", id);
            }
            keep
        });
        for group in groups {
            self.slots.entry(group.id).or_insert_with(|| {
                log::debug!("➕ New client slot {} ({})", group.id, group.name);
                ClientSlot::new(group)
            });
        }
    }

    pub fn client_count(&self) -> usize {
        self.slots.len()
    }
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the detector and the scan worker; `Idle -> Running -> StopRequested -> Idle`.
pub struct SentryEngine {
    detector: Arc<Detector>,
    capture: Arc<dyn ScreenCapture>,
    config: Arc<dyn ConfigStore>,
    events: Sender<SentryEvent>,
    state: EngineState,
    worker: Option<Worker>,
}

impl SentryEngine {
    pub fn new(
        detector: Detector,
        capture: Arc<dyn ScreenCapture>,
        config: Arc<dyn ConfigStore>,
        events: Sender<SentryEvent>,
    ) -> Self {
        Self {
            detector: Arc::new(detector),
            capture,
            config,
            events,
            state: EngineState::Idle,
            worker: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            log::debug!("🎮 Sentry state: {:?} -> {:?}", self.state, state);
            self.state = state;
            let _ = self.events.send(SentryEvent::State(state));
        }
    }

    /// Spawn the worker with fresh debounce, cooldown, and first-run state.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let decision = DecisionLoop::new(
            Arc::clone(&self.detector),
            Arc::clone(&self.capture),
            Arc::clone(&self.config),
            self.events.clone(),
        );
        // Announce first so listeners never see worker output before it
        self.set_state(EngineState::Running);
        let spawned = std::thread::Builder::new()
            .name("sentry-scan".to_string())
            .spawn(move || run_worker(decision, stop_rx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(EngineState::Idle);
                return Err(e.into());
            }
        };

        self.worker = Some(Worker { stop_tx, handle });
        log::info!("🚀 Sentry started");
        Ok(())
    }

    /// Signal the worker and wait for it to exit. The cycle in progress
    /// always completes. Stopping an idle engine is a no-op.
    pub fn stop(&mut self) -> EngineResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.set_state(EngineState::StopRequested);
        // Send fails only if the worker already exited; join below covers that
        let _ = worker.stop_tx.send(());
        let joined = worker.handle.join();
        self.set_state(EngineState::Idle);

        match joined {
            Ok(()) => {
                log::info!("⏹️ Sentry stopped");
                Ok(())
            }
            Err(_) => {
                log::error!("❌ Scan worker panicked");
                Err(EngineError::WorkerPanicked)
            }
        }
    }

    /// Rescan template assets. Refused while the worker holds the detector.
    pub fn reload_templates(&mut self) -> EngineResult<usize> {
        if self.worker.is_some() {
            return Err(EngineError::ReloadWhileRunning);
        }
        let total = Arc::make_mut(&mut self.detector).reload();
        let _ = self
            .events
            .send(SentryEvent::Log(format!("🔄 Templates reloaded: {}", total)));
        Ok(total)
    }
}

impl Drop for SentryEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("❌ {}", e);
        }
    }
}

fn run_worker(mut decision: DecisionLoop, stop_rx: Receiver<()>) {
    log::debug!("🎮 Scan loop started");
    loop {
        let report = decision.run_cycle();
        match stop_rx.recv_timeout(report.sleep) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("🎮 Scan loop ended");
}
