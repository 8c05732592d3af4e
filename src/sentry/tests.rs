// Tests for the decision loop and engine lifecycle
// Focus: debounce through real cycles, alert composition, cooldown gating,
// scale/location persistence, slot sync, start/stop

use super::config::{ClientGroup, Config, ConfigStore, MemoryConfigStore};
use super::debounce::DetectionState;
use super::engine::{DecisionLoop, SentryEngine};
use super::error::EngineError;
use super::types::{AlertCategory, EngineState, SentryEvent};
use crate::capture::{CaptureError, CaptureResult, Region, ScreenCapture};
use crate::vision::{Category, Detector, Preprocessor, SafeColorFilter, Template, TemplateLibrary};
use image::{Rgb, RgbImage};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LOCAL: Region = Region { x: 0, y: 0, width: 40, height: 40 };
const OVERVIEW: Region = Region { x: 100, y: 0, width: 40, height: 40 };
const MONSTER: Region = Region { x: 200, y: 0, width: 40, height: 40 };
const PROBE: Region = Region { x: 300, y: 0, width: 40, height: 40 };
const LOCATION: Region = Region { x: 0, y: 100, width: 30, height: 14 };

/// Screen that serves prepared frames per region and fails for the rest.
#[derive(Default)]
struct FakeScreen {
    frames: Mutex<Vec<(Region, RgbImage)>>,
}

impl FakeScreen {
    fn show(&self, region: Region, frame: RgbImage) {
        let mut frames = self.frames.lock().unwrap();
        frames.retain(|(r, _)| *r != region);
        frames.push((region, frame));
    }
}

impl ScreenCapture for FakeScreen {
    fn capture(&self, region: Region) -> CaptureResult<RgbImage> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| *r == region)
            .map(|(_, frame)| frame.clone())
            .ok_or_else(|| CaptureError::CaptureFailed {
                description: "nothing on screen".to_string(),
            })
    }
}

fn plus_icon(color: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(8, 8, |x, y| if x == 3 || y == 3 { color } else { Rgb([0, 0, 0]) })
}

fn cross_icon(color: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(8, 8, |x, y| {
        if x == y || x + y == 7 { color } else { Rgb([0, 0, 0]) }
    })
}

fn square_icon(color: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(8, 8, |x, y| {
        if x == 0 || x == 7 || y == 0 || y == 7 { color } else { Rgb([0, 0, 0]) }
    })
}

/// 40x40 black frame with `icon` pasted at (x, y).
fn frame_with(icon: &RgbImage, x: i64, y: i64) -> RgbImage {
    let mut frame = RgbImage::new(40, 40);
    image::imageops::replace(&mut frame, icon, x, y);
    frame
}

fn template(icon: &RgbImage, preprocessor: &Preprocessor, label: Option<&str>) -> Template {
    Template::new(
        preprocessor.apply(&image::imageops::grayscale(icon)),
        None,
        label.map(str::to_string),
    )
}

const RED: Rgb<u8> = Rgb([255, 80, 80]);
const WHITE: Rgb<u8> = Rgb([230, 230, 230]);

/// Red plus for hostiles (local and overview), white cross for monsters
/// and probes, hollow square as the 100% scale fingerprint, white plus as
/// "Jita".
fn detector() -> Detector {
    let pre = Preprocessor::default();
    let mut library = TemplateLibrary::empty(pre.clone());
    library.insert(Category::Local, "100", vec![template(&plus_icon(RED), &pre, None)]);
    library.insert(Category::Overview, "100", vec![template(&plus_icon(RED), &pre, None)]);
    library.insert(Category::Monster, "100", vec![template(&cross_icon(WHITE), &pre, None)]);
    library.insert(Category::Probe, "100", vec![template(&cross_icon(WHITE), &pre, None)]);
    library.insert(Category::Scale, "90", Vec::new());
    library.insert(Category::Scale, "100", vec![template(&square_icon(WHITE), &pre, None)]);
    library.insert(
        Category::Location,
        "100",
        vec![
            template(&plus_icon(WHITE), &pre, Some("Jita")),
            template(&cross_icon(WHITE), &pre, Some("Amarr")),
        ],
    );
    Detector::new(library, SafeColorFilter::default())
}

fn config_with(group: ClientGroup) -> Config {
    let mut config = Config::default();
    config.thresholds.insert("local".to_string(), 0.95);
    config.groups = vec![group];
    config
}

fn group(id: u32, name: &str) -> ClientGroup {
    let mut group = ClientGroup::new(id, name);
    group.regions.local = Some(LOCAL);
    group.regions.overview = Some(OVERVIEW);
    group.regions.monster = Some(MONSTER);
    group.regions.probe = Some(PROBE);
    group.scale = Some("100".to_string());
    group
}

struct Harness {
    screen: Arc<FakeScreen>,
    store: Arc<MemoryConfigStore>,
    events: Receiver<SentryEvent>,
    decision: DecisionLoop,
}

fn harness(config: Config) -> Harness {
    let screen = Arc::new(FakeScreen::default());
    let store = Arc::new(MemoryConfigStore::new(config));
    let (tx, rx) = mpsc::channel();
    let decision = DecisionLoop::new(
        Arc::new(detector()),
        screen.clone(),
        store.clone(),
        tx,
    );
    Harness {
        screen,
        store,
        events: rx,
        decision,
    }
}

fn drain(rx: &Receiver<SentryEvent>) -> Vec<SentryEvent> {
    rx.try_iter().collect()
}

fn alerts(events: &[SentryEvent]) -> Vec<AlertCategory> {
    events
        .iter()
        .filter_map(|e| match e {
            SentryEvent::Alert(alert) => Some(alert.category),
            _ => None,
        })
        .collect()
}

// ============================================================
// DECISION LOOP SCENARIOS
// ============================================================

#[test]
fn test_local_hostile_confirms_on_second_cycle() {
    let mut h = harness(config_with(group(0, "Main")));
    h.screen.show(LOCAL, frame_with(&plus_icon(RED), 12, 9));

    let first = h.decision.run_cycle();
    assert_eq!(first.clients[0].state(Category::Local), DetectionState::Pending(1));
    assert_eq!(first.alert, None);
    assert!(first.active);
    assert!(first.sleep <= Duration::from_millis(180));

    let second = h.decision.run_cycle();
    assert_eq!(second.clients[0].state(Category::Local), DetectionState::Confirmed);
    assert_eq!(second.alert, Some(AlertCategory::Local));
    assert!(second.alert_emitted);

    let events = drain(&h.events);
    assert_eq!(alerts(&events), vec![AlertCategory::Local]);
    let alert = events.iter().find_map(|e| match e {
        SentryEvent::Alert(alert) => Some(alert.clone()),
        _ => None,
    });
    let alert = alert.unwrap();
    assert_eq!(alert.clients.len(), 1);
    assert_eq!(alert.clients[0].id, 0);
}

#[test]
fn test_repeat_alert_waits_for_cooldown() {
    let mut h = harness(config_with(group(0, "Main")));
    h.screen.show(LOCAL, frame_with(&plus_icon(RED), 12, 9));

    h.decision.run_cycle();
    assert!(h.decision.run_cycle().alert_emitted);

    // Same category, well inside the 2 s repeat interval
    let third = h.decision.run_cycle();
    assert_eq!(third.alert, Some(AlertCategory::Local));
    assert!(!third.alert_emitted);
}

#[test]
fn test_escalation_to_mixed_fires_immediately() {
    let mut h = harness(config_with(group(0, "Main")));
    h.screen.show(LOCAL, frame_with(&plus_icon(RED), 12, 9));
    h.decision.run_cycle();
    assert!(h.decision.run_cycle().alert_emitted);

    h.screen.show(MONSTER, frame_with(&cross_icon(WHITE), 5, 20));
    let pending = h.decision.run_cycle();
    assert_eq!(pending.clients[0].state(Category::Monster), DetectionState::Pending(1));
    assert!(!pending.alert_emitted, "still local inside cooldown");

    let mixed = h.decision.run_cycle();
    assert_eq!(mixed.alert, Some(AlertCategory::Mixed));
    assert!(mixed.alert_emitted);
}

#[test]
fn test_all_clear_resets_and_sleeps_long() {
    let mut h = harness(config_with(group(0, "Main")));
    h.screen.show(LOCAL, frame_with(&plus_icon(RED), 12, 9));
    h.decision.run_cycle();
    h.decision.run_cycle();

    h.screen.show(LOCAL, RgbImage::new(40, 40));
    let clear = h.decision.run_cycle();
    assert_eq!(clear.clients[0].state(Category::Local), DetectionState::Clear);
    assert_eq!(clear.alert, None);
    assert!(!clear.active);
    assert!(clear.sleep > Duration::from_millis(180));
    assert!(clear.sleep <= Duration::from_millis(500));

    // A one-cycle flicker inside the repeat window must not fire again
    h.screen.show(LOCAL, frame_with(&plus_icon(RED), 3, 3));
    h.decision.run_cycle();
    let back = h.decision.run_cycle();
    assert_eq!(back.alert, Some(AlertCategory::Local));
    assert!(!back.alert_emitted);
    assert_eq!(alerts(&drain(&h.events)), vec![AlertCategory::Local]);
}

#[test]
fn test_isolated_detection_never_alerts() {
    let mut h = harness(config_with(group(0, "Main")));
    h.screen.show(OVERVIEW, frame_with(&plus_icon(RED), 20, 20));
    assert_eq!(h.decision.run_cycle().alert, None);

    h.screen.show(OVERVIEW, RgbImage::new(40, 40));
    let report = h.decision.run_cycle();
    assert_eq!(report.alert, None);
    assert!(alerts(&drain(&h.events)).is_empty());
}

#[test]
fn test_friendly_overview_entry_is_ignored() {
    let mut h = harness(config_with(group(0, "Main")));
    h.screen.show(OVERVIEW, frame_with(&plus_icon(Rgb([40, 220, 40])), 20, 20));

    for _ in 0..3 {
        let report = h.decision.run_cycle();
        assert_eq!(report.clients[0].state(Category::Overview), DetectionState::Clear);
        assert!(report.clients[0].matches[&Category::Overview].suppressed_score > 0.9);
    }
}

#[test]
fn test_idle_cycle_uses_metronome_sleep() {
    let mut h = harness(config_with(group(0, "Main")));
    let report = h.decision.run_cycle();
    assert!(!report.active);
    assert!(report.sleep <= Duration::from_millis(500));
    assert!(report.sleep > Duration::from_millis(300));
}

#[test]
fn test_probe_event_has_own_cooldown() {
    let mut h = harness(config_with(group(0, "Main")));
    h.screen.show(PROBE, frame_with(&cross_icon(WHITE), 30, 1));

    assert!(!h.decision.run_cycle().probe_emitted);
    let second = h.decision.run_cycle();
    assert!(second.probe_emitted);
    assert_eq!(second.alert, None);
    assert!(!h.decision.run_cycle().probe_emitted);

    let probes = drain(&h.events)
        .into_iter()
        .filter(|e| matches!(e, SentryEvent::Probe(_)))
        .count();
    assert_eq!(probes, 1);
}

#[test]
fn test_alert_lists_every_triggering_client() {
    let mut config = config_with(group(0, "Main"));
    let mut alt = group(4, "Alt");
    alt.regions.local = Some(Region::new(500, 500, 40, 40));
    config.groups.push(alt);

    let mut h = harness(config);
    h.screen.show(LOCAL, frame_with(&plus_icon(RED), 12, 9));
    h.screen.show(Region::new(500, 500, 40, 40), frame_with(&plus_icon(RED), 0, 0));
    h.decision.run_cycle();
    h.decision.run_cycle();

    let alert = drain(&h.events)
        .into_iter()
        .find_map(|e| match e {
            SentryEvent::Alert(alert) => Some(alert),
            _ => None,
        })
        .unwrap();
    let ids: Vec<u32> = alert.clients.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![0, 4]);
}

#[test]
fn test_first_cycle_emits_self_check() {
    let mut h = harness(config_with(group(0, "Main")));
    h.decision.run_cycle();
    h.decision.run_cycle();

    let events = drain(&h.events);
    let self_checks: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            SentryEvent::Log(line) if line.contains("Self-check") => Some(line),
            _ => None,
        })
        .collect();
    assert_eq!(self_checks.len(), 1);
    assert!(self_checks[0].contains("Total Templates"));
    assert!(self_checks[0].contains("Clients: 1 configured, 1 with local/overview regions"));

    // Every event renders as exactly one line
    for event in &events {
        assert!(!event.to_string().contains('\n'), "multi-line event: {}", event);
    }
}

// ============================================================
// SCALE, LOCATION, CLIENT SLOTS
// ============================================================

#[test]
fn test_scale_is_detected_and_persisted() {
    let mut unresolved = group(0, "Main");
    unresolved.scale = None;
    let mut h = harness(config_with(unresolved));
    h.screen.show(LOCAL, frame_with(&square_icon(WHITE), 20, 4));

    let report = h.decision.run_cycle();
    assert_eq!(report.clients[0].scale.as_deref(), Some("100"));
    assert_eq!(h.store.snapshot().groups[0].scale.as_deref(), Some("100"));
}

#[test]
fn test_unresolved_scale_matches_at_default() {
    let mut unresolved = group(0, "Main");
    unresolved.scale = None;
    let mut h = harness(config_with(unresolved));
    h.screen.show(LOCAL, frame_with(&plus_icon(RED), 12, 9));

    let report = h.decision.run_cycle();
    assert_eq!(report.clients[0].scale, None);
    assert_eq!(report.clients[0].state(Category::Local), DetectionState::Pending(1));
    assert_eq!(h.store.snapshot().groups[0].scale, None);
}

#[test]
fn test_location_change_is_emitted_once() {
    let mut main = group(0, "Main");
    main.regions.location = Some(LOCATION);
    let mut h = harness(config_with(main));
    let mut frame = RgbImage::new(30, 14);
    image::imageops::replace(&mut frame, &plus_icon(WHITE), 11, 3);
    h.screen.show(LOCATION, frame);

    h.decision.run_cycle();
    h.decision.run_cycle();

    let labels: Vec<String> = drain(&h.events)
        .into_iter()
        .filter_map(|e| match e {
            SentryEvent::Location { client, label } => {
                assert_eq!(client.id, 0);
                Some(label)
            }
            _ => None,
        })
        .collect();
    assert_eq!(labels, vec!["Jita".to_string()]);
    assert_eq!(h.store.snapshot().groups[0].location.as_deref(), Some("Jita"));
}

#[test]
fn test_unrecognised_location_reports_unknown() {
    let mut main = group(0, "Main");
    main.regions.location = Some(LOCATION);
    let mut h = harness(config_with(main));
    h.screen.show(LOCATION, RgbImage::from_pixel(30, 14, Rgb([90, 90, 90])));

    h.decision.run_cycle();
    let label = drain(&h.events).into_iter().find_map(|e| match e {
        SentryEvent::Location { label, .. } => Some(label),
        _ => None,
    });
    assert_eq!(label.as_deref(), Some(super::engine::UNKNOWN_LOCATION));
}

#[test]
fn test_slots_follow_group_ids() {
    let mut config = config_with(group(0, "Main"));
    config.groups.push(group(1, "Alt"));
    let mut h = harness(config);

    h.decision.run_cycle();
    assert_eq!(h.decision.client_count(), 2);

    h.store.update(&mut |config: &mut Config| config.groups.retain(|g| g.id != 0));
    let report = h.decision.run_cycle();
    assert_eq!(h.decision.client_count(), 1);
    assert_eq!(report.clients.len(), 1);
    assert_eq!(report.clients[0].client.name, "Alt");
}

#[test]
fn test_removed_group_does_not_shift_debounce() {
    let mut config = config_with(group(0, "Main"));
    let mut alt = group(1, "Alt");
    alt.regions.local = Some(Region::new(500, 500, 40, 40));
    config.groups.push(alt);
    let mut h = harness(config);
    h.screen.show(Region::new(500, 500, 40, 40), frame_with(&plus_icon(RED), 0, 0));

    h.decision.run_cycle();
    h.store.update(&mut |config: &mut Config| config.groups.retain(|g| g.id != 0));
    let report = h.decision.run_cycle();

    assert_eq!(report.clients[0].client.id, 1);
    assert_eq!(report.clients[0].state(Category::Local), DetectionState::Confirmed);
}

// ============================================================
// ENGINE LIFECYCLE
// ============================================================

fn engine() -> (SentryEngine, Receiver<SentryEvent>) {
    let (tx, rx) = mpsc::channel();
    let engine = SentryEngine::new(
        Detector::empty(),
        Arc::new(FakeScreen::default()),
        Arc::new(MemoryConfigStore::new(Config::default())),
        tx,
    );
    (engine, rx)
}

#[test]
fn test_engine_start_stop_cycle() {
    let (mut engine, rx) = engine();
    assert_eq!(engine.state(), EngineState::Idle);

    engine.start().unwrap();
    assert_eq!(engine.state(), EngineState::Running);
    assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));

    // Wait until the worker has produced its first cycle
    let first_log = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first_log, SentryEvent::State(EngineState::Running));
    let self_check = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(self_check, SentryEvent::Log(ref line) if line.contains("Self-check")));

    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Idle);

    let states: Vec<EngineState> = drain(&rx)
        .into_iter()
        .filter_map(|e| match e {
            SentryEvent::State(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![EngineState::StopRequested, EngineState::Idle]);

    // Restart works after a full stop
    engine.start().unwrap();
    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Idle);
}

#[test]
fn test_reload_only_while_idle() {
    let (mut engine, _rx) = engine();
    engine.start().unwrap();
    assert!(matches!(
        engine.reload_templates(),
        Err(EngineError::ReloadWhileRunning)
    ));
    engine.stop().unwrap();
    assert_eq!(engine.reload_templates().unwrap(), 0);
}

#[test]
fn test_stop_when_idle_is_noop() {
    let (mut engine, rx) = engine();
    engine.stop().unwrap();
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(drain(&rx).is_empty());
}

#[test]
fn test_drop_stops_running_engine() {
    let (mut engine, rx) = engine();
    engine.start().unwrap();
    drop(engine);

    let last_state = drain(&rx)
        .into_iter()
        .filter_map(|e| match e {
            SentryEvent::State(state) => Some(state),
            _ => None,
        })
        .last();
    assert_eq!(last_state, Some(EngineState::Idle));
}
