//! Low-power ("glance") UI (§4.4.10).
//!
//! Observes the proximity-actual history (`history::ProximityHistory`)
//! for two settings-gated heuristics: "from pocket" and "on table"
//! (hover). Triggering requests display LPM-ON and marks the LPM-UI
//! "wanted" state for a later IPC burst.

use super::history::ProximityHistory;
use crate::config::LpmTriggers;
use crate::datapipe::{CoverState, DisplayState};

pub struct GlancePrerequisites {
    pub system_is_user_mode: bool,
    pub compositor_running: bool,
    pub display_off: bool,
    pub exception_active: bool,
    pub lid_not_closed: bool,
    pub proximity_effective_open: bool,
}

impl GlancePrerequisites {
    fn hold(&self) -> bool {
        self.system_is_user_mode
            && self.compositor_running
            && self.display_off
            && !self.exception_active
            && self.lid_not_closed
            && self.proximity_effective_open
    }
}

const FROM_POCKET_RECENCY_MS: u64 = 1_500;
const FROM_POCKET_MIN_CLOSED_MS: u64 = 3_000;
const HOVER_MAX_GAP_MS: u64 = 1_500;
const HOVER_MIN_TRAILING_OPEN_MS: u64 = 3_000;

fn detect_from_pocket(history: &ProximityHistory, now_ms: u64) -> bool {
    let samples: Vec<_> = history.iter_chronological().collect();
    let Some(last) = samples.last() else { return false };
    if last.state != CoverState::Open || now_ms.saturating_sub(last.tick_ms) > FROM_POCKET_RECENCY_MS {
        return false;
    }
    // Find how long `closed` was held immediately before `last`.
    let mut closed_since = None;
    for sample in samples.iter().rev().skip(1) {
        if sample.state == CoverState::Closed {
            closed_since = Some(sample.tick_ms);
        } else {
            break;
        }
    }
    match closed_since {
        Some(closed_start) => last.tick_ms.saturating_sub(closed_start) >= FROM_POCKET_MIN_CLOSED_MS,
        None => false,
    }
}

fn detect_on_table(history: &ProximityHistory) -> bool {
    let samples: Vec<_> = history.iter_chronological().collect();
    if samples.len() < 3 {
        return false;
    }
    // Look for open -> closed -> open: a stable open period of at least
    // `HOVER_MIN_TRAILING_OPEN_MS` (the sample `a.tick_ms` is when the
    // state became open, so `b.tick_ms - a.tick_ms` is how long it held)
    // ended by a brief closed blip that reopens within `HOVER_MAX_GAP_MS`.
    for w in samples.windows(3) {
        let (a, b, c) = (w[0], w[1], w[2]);
        if a.state == CoverState::Open && b.state == CoverState::Closed && c.state == CoverState::Open {
            let trailing_open_ms = b.tick_ms.saturating_sub(a.tick_ms);
            let blip_ms = c.tick_ms.saturating_sub(b.tick_ms);
            if trailing_open_ms >= HOVER_MIN_TRAILING_OPEN_MS && blip_ms <= HOVER_MAX_GAP_MS {
                return true;
            }
        }
    }
    false
}

pub struct GlanceMachine {
    last_display: DisplayState,
    pub lpm_ui_wanted: bool,
}

impl GlanceMachine {
    pub fn new() -> Self {
        Self {
            last_display: DisplayState::Undefined,
            lpm_ui_wanted: false,
        }
    }

    /// Re-evaluate on any proximity-actual change. Returns `true` if
    /// display LPM-ON should be requested.
    pub fn evaluate(
        &mut self,
        history: &ProximityHistory,
        now_ms: u64,
        triggers: LpmTriggers,
        prereqs: &GlancePrerequisites,
    ) -> bool {
        if !prereqs.hold() {
            return false;
        }
        let from_pocket = triggers.contains(LpmTriggers::FROM_POCKET) && detect_from_pocket(history, now_ms);
        let on_table = triggers.contains(LpmTriggers::ON_TABLE) && detect_on_table(history);
        if from_pocket || on_table {
            self.lpm_ui_wanted = true;
            true
        } else {
            false
        }
    }

    /// A transition toward OFF from ON/DIM resets the history, to avoid
    /// bounce.
    pub fn on_display_changed(&mut self, new_display: DisplayState, history: &mut ProximityHistory) {
        if self.last_display.is_on_or_dim() && new_display.is_off_like() {
            history.clear();
        }
        self.last_display = new_display;
    }
}

impl Default for GlanceMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prereqs() -> GlancePrerequisites {
        GlancePrerequisites {
            system_is_user_mode: true,
            compositor_running: true,
            display_off: true,
            exception_active: false,
            lid_not_closed: true,
            proximity_effective_open: true,
        }
    }

    #[test]
    fn from_pocket_detected() {
        let mut history = ProximityHistory::new();
        history.push(0, CoverState::Closed);
        history.push(3_500, CoverState::Open);
        let mut glance = GlanceMachine::new();
        let triggered = glance.evaluate(&history, 4_000, LpmTriggers::FROM_POCKET, &prereqs());
        assert!(triggered);
    }

    #[test]
    fn on_table_hover_pattern_detected() {
        let mut history = ProximityHistory::new();
        history.push(0, CoverState::Open);
        history.push(3_500, CoverState::Closed);
        history.push(3_900, CoverState::Open);
        let mut glance = GlanceMachine::new();
        let triggered = glance.evaluate(&history, 4_000, LpmTriggers::ON_TABLE, &prereqs());
        assert!(triggered);
    }

    #[test]
    fn on_table_hover_rejected_when_open_period_too_short() {
        let mut history = ProximityHistory::new();
        history.push(0, CoverState::Open);
        history.push(500, CoverState::Closed);
        history.push(900, CoverState::Open);
        let mut glance = GlanceMachine::new();
        let triggered = glance.evaluate(&history, 1_000, LpmTriggers::ON_TABLE, &prereqs());
        assert!(!triggered);
    }

    #[test]
    fn on_table_hover_rejected_when_blip_too_slow_to_reopen() {
        let mut history = ProximityHistory::new();
        history.push(0, CoverState::Open);
        history.push(3_500, CoverState::Closed);
        history.push(5_500, CoverState::Open);
        let mut glance = GlanceMachine::new();
        let triggered = glance.evaluate(&history, 6_000, LpmTriggers::ON_TABLE, &prereqs());
        assert!(!triggered);
    }

    #[test]
    fn prerequisites_block_detection() {
        let mut history = ProximityHistory::new();
        history.push(0, CoverState::Closed);
        history.push(3_500, CoverState::Open);
        let mut glance = GlanceMachine::new();
        let mut blocked = prereqs();
        blocked.display_off = false;
        let triggered = glance.evaluate(&history, 4_000, LpmTriggers::all(), &blocked);
        assert!(!triggered);
    }

    #[test]
    fn off_transition_from_on_resets_history() {
        let mut history = ProximityHistory::new();
        history.push(0, CoverState::Open);
        let mut glance = GlanceMachine::new();
        glance.on_display_changed(DisplayState::On, &mut history);
        glance.on_display_changed(DisplayState::Off, &mut history);
        assert!(history.last().is_none());
    }
}
