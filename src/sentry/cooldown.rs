// Non-blocking rate limiting for alerts and probe warnings

use super::types::AlertCategory;
use std::time::{Duration, Instant};

/// Process-wide emission timestamps. Pure comparisons, never sleeps.
#[derive(Debug, Clone, Default)]
pub struct CooldownGate {
    last_alert: Option<Instant>,
    last_category: Option<AlertCategory>,
    last_probe: Option<Instant>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire on a category change, or when the same category has waited out
    /// `repeat`. A fired alert is recorded.
    pub fn should_alert(
        &mut self,
        category: AlertCategory,
        now: Instant,
        repeat: Duration,
    ) -> bool {
        let changed = self.last_category != Some(category);
        let elapsed = self
            .last_alert
            .is_none_or(|last| now.saturating_duration_since(last) >= repeat);

        if changed || elapsed {
            self.last_alert = Some(now);
            self.last_category = Some(category);
            true
        } else {
            false
        }
    }

    pub fn should_probe(&mut self, now: Instant, cooldown: Duration) -> bool {
        let elapsed = self
            .last_probe
            .is_none_or(|last| now.saturating_duration_since(last) >= cooldown);
        if elapsed {
            self.last_probe = Some(now);
        }
        elapsed
    }

    pub fn last_category(&self) -> Option<AlertCategory> {
        self.last_category
    }
}
