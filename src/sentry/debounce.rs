// Debounce: a detection only counts after N consecutive detecting cycles

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    Clear,
    /// Detected for this many consecutive cycles, not yet confirmed
    Pending(u32),
    Confirmed,
}

impl DetectionState {
    pub fn is_confirmed(self) -> bool {
        self == DetectionState::Confirmed
    }

    /// Pending or confirmed.
    pub fn is_active(self) -> bool {
        self != DetectionState::Clear
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Debounce {
    streak: u32,
}

impl Debounce {
    /// Fold one cycle's raw detection in. A miss resets immediately.
    pub fn update(&mut self, detected: bool, confirm_cycles: u32) -> DetectionState {
        if detected {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.streak = 0;
        }
        self.state(confirm_cycles)
    }

    pub fn state(&self, confirm_cycles: u32) -> DetectionState {
        match self.streak {
            0 => DetectionState::Clear,
            n if n >= confirm_cycles.max(1) => DetectionState::Confirmed,
            n => DetectionState::Pending(n),
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn reset(&mut self) {
        self.streak = 0;
    }
}
