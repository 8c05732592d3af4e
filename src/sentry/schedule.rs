// Cycle timing: metronome sleep and throttled expensive checks

use super::config::Settings;
use std::time::{Duration, Instant};

/// Time left of `target` once `elapsed` has been spent. Never negative.
pub fn next_sleep(target: Duration, elapsed: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

/// Poll fast while anything is pending or confirmed, slow otherwise.
pub fn cycle_target(active: bool, settings: &Settings) -> Duration {
    if active {
        settings.jitter_delay
    } else {
        settings.scan_interval
    }
}

/// Whether a throttled check may run again. A check never run is due.
pub fn is_due(last: Option<Instant>, now: Instant, every: Duration) -> bool {
    last.is_none_or(|last| now.saturating_duration_since(last) >= every)
}
