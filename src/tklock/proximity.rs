//! Proximity pipeline (§4.4.2).
//!
//! Two values: `actual` (instantaneous) and `effective` (debounced via a
//! cover-delay timer armed only on the open edge).

use super::history::ProximityHistory;
use crate::config::Settings;
use crate::datapipe::CoverState;
use crate::heartbeat::HeartbeatDispatcher;

pub const TIMER_NAME: &str = "tklock.proximity_cover_delay";
pub const WAKELOCK_NAME: &str = "mce_proximity_uncover";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedPattern {
    Uncovered,
    Uncovering,
    Covered,
}

pub struct ProximityPipeline {
    pub actual: CoverState,
    pub effective: CoverState,
}

impl ProximityPipeline {
    pub fn new() -> Self {
        Self {
            actual: CoverState::Undefined,
            effective: CoverState::Undefined,
        }
    }

    /// `actual` changed. Returns the LED pattern to display and, if the
    /// cover-delay timer should be armed, the clamped delay in ms.
    pub fn on_actual_changed(
        &mut self,
        new_actual: CoverState,
        in_call: bool,
        settings: &Settings,
        history: &mut ProximityHistory,
        now_ms: u64,
        heartbeat: &mut HeartbeatDispatcher,
    ) -> LedPattern {
        let old = self.actual;
        self.actual = new_actual;
        history.push(now_ms, new_actual);

        let led = match (old, new_actual) {
            (_, CoverState::Closed) => LedPattern::Covered,
            (CoverState::Closed, CoverState::Open) => LedPattern::Uncovering,
            _ => LedPattern::Uncovered,
        };

        match new_actual {
            CoverState::Open => {
                let delay_ms = if in_call {
                    settings.proximity_delay_incall_ms
                } else {
                    settings.proximity_delay_default_ms
                }
                .clamp(
                    crate::config::PROXIMITY_DELAY_MIN_MS,
                    crate::config::PROXIMITY_DELAY_MAX_MS,
                ) as u64;
                heartbeat.create(TIMER_NAME, delay_ms);
                heartbeat.start(TIMER_NAME, now_ms);
            }
            CoverState::Closed => {
                heartbeat.stop(TIMER_NAME);
                self.effective = CoverState::Closed;
            }
            CoverState::Undefined => {}
        }
        led
    }

    /// The cover-delay timer fired: copy `actual` into `effective`.
    /// Returns `true` if `effective` actually changed (caller should
    /// publish and re-evaluate dependents).
    pub fn on_delay_fired(&mut self) -> bool {
        if self.effective != self.actual {
            self.effective = self.actual;
            true
        } else {
            false
        }
    }
}

impl Default for ProximityPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn closed_edge_is_immediate() {
        let mut p = ProximityPipeline::new();
        let mut hist = ProximityHistory::new();
        let mut hb = HeartbeatDispatcher::new();
        let settings = Settings::default();
        p.on_actual_changed(CoverState::Closed, false, &settings, &mut hist, 0, &mut hb);
        assert_eq!(p.effective, CoverState::Closed);
        assert!(!hb.is_active(TIMER_NAME));
    }

    #[test]
    fn scenario_s1_open_edge_debounces_through_timer() {
        let mut p = ProximityPipeline::new();
        let mut hist = ProximityHistory::new();
        let mut hb = HeartbeatDispatcher::new();
        let settings = Settings::default();

        p.on_actual_changed(CoverState::Closed, true, &settings, &mut hist, 0, &mut hb);
        assert_eq!(p.effective, CoverState::Closed);

        p.on_actual_changed(CoverState::Open, true, &settings, &mut hist, 100, &mut hb);
        assert_eq!(p.effective, CoverState::Closed); // not yet debounced
        assert!(hb.is_active(TIMER_NAME));

        let changed = p.on_delay_fired();
        assert!(changed);
        assert_eq!(p.effective, CoverState::Open);
    }
}
