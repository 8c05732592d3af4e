// Sentry module
// The decision loop: per-cycle scanning of every configured client, debounce,
// alert priority, cooldowns, adaptive sleep, and the start/stop state machine
// that owns the scan worker.

pub mod config;
pub mod cooldown;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod priority;
pub mod schedule;
pub mod types;
pub mod webhook;

#[cfg(test)]
mod tests;

// Re-export the main types for easy access
pub use config::{
    ClientGroup, Config, ConfigStore, GroupRegions, JsonConfigStore, MemoryConfigStore, Settings,
    Thresholds,
};
pub use cooldown::CooldownGate;
pub use debounce::{Debounce, DetectionState};
pub use engine::{ClientReport, CycleReport, DecisionLoop, SentryEngine, UNKNOWN_LOCATION};
pub use error::{ConfigError, ConfigResult, EngineError, EngineResult};
pub use priority::resolve_alert;
pub use schedule::{cycle_target, is_due, next_sleep};
pub use types::{AlertCategory, AlertEvent, ClientRef, EngineState, ProbeEvent, SentryEvent};
pub use webhook::WebhookAlert;
