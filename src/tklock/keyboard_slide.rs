//! Keyboard slide (§4.4.7).
//!
//! Opening the slide is gated by `display_next == OFF` and the
//! configured trigger policy (plus an optional proximity wait). Closing
//! is gated separately; accepting a close primes an auto-relock that any
//! activity cancels.

use crate::config::TriggerPolicy;
use crate::datapipe::{CoverState, DisplayState};

pub const AUTO_RELOCK_TAG: &str = "kbd slide";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardSlideOutcome {
    pub request_display_on: bool,
    pub request_tkunlock: bool,
    pub request_display_off: bool,
    pub request_tklock: bool,
    pub arm_auto_relock: bool,
}

pub struct KeyboardSlideMachine {
    auto_relock_armed: bool,
    slide_was_opened: bool,
}

fn trigger_matches(policy: TriggerPolicy, proximity_open: bool, lid_not_closed: bool) -> bool {
    match policy {
        TriggerPolicy::Never => false,
        TriggerPolicy::Always => true,
        TriggerPolicy::ProximityAndLid => proximity_open && lid_not_closed,
    }
}

impl KeyboardSlideMachine {
    pub fn new() -> Self {
        Self {
            auto_relock_armed: false,
            slide_was_opened: false,
        }
    }

    pub fn on_slide_opened(
        &mut self,
        display_next: DisplayState,
        open_trigger: TriggerPolicy,
        proximity_effective: CoverState,
        lid_filtered: CoverState,
    ) -> KeyboardSlideOutcome {
        let mut outcome = KeyboardSlideOutcome::default();
        if display_next != DisplayState::Off {
            return outcome;
        }
        let accepted = trigger_matches(
            open_trigger,
            proximity_effective == CoverState::Open,
            lid_filtered != CoverState::Closed,
        );
        if accepted {
            outcome.request_display_on = true;
            outcome.request_tkunlock = true;
            outcome.arm_auto_relock = true;
            self.auto_relock_armed = true;
            self.slide_was_opened = true;
        }
        outcome
    }

    pub fn on_slide_closed(&mut self, close_trigger: TriggerPolicy) -> KeyboardSlideOutcome {
        let mut outcome = KeyboardSlideOutcome::default();
        let accepted = match close_trigger {
            TriggerPolicy::Never => false,
            TriggerPolicy::Always => true,
            TriggerPolicy::ProximityAndLid => self.slide_was_opened,
        };
        if accepted {
            outcome.request_display_off = true;
            outcome.request_tklock = true;
        }
        self.slide_was_opened = false;
        outcome
    }

    /// Any activity while an auto-relock is primed cancels it.
    pub fn on_activity(&mut self) -> bool {
        let was_armed = self.auto_relock_armed;
        self.auto_relock_armed = false;
        was_armed
    }

    pub fn is_auto_relock_armed(&self) -> bool {
        self.auto_relock_armed
    }
}

impl Default for KeyboardSlideMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_accepted_only_while_display_off() {
        let mut m = KeyboardSlideMachine::new();
        let outcome = m.on_slide_opened(
            DisplayState::On,
            TriggerPolicy::Always,
            CoverState::Open,
            CoverState::Open,
        );
        assert!(!outcome.request_display_on);
    }

    #[test]
    fn open_gated_by_proximity_and_lid_policy() {
        let mut m = KeyboardSlideMachine::new();
        let outcome = m.on_slide_opened(
            DisplayState::Off,
            TriggerPolicy::ProximityAndLid,
            CoverState::Closed,
            CoverState::Open,
        );
        assert!(!outcome.request_display_on);

        let outcome = m.on_slide_opened(
            DisplayState::Off,
            TriggerPolicy::ProximityAndLid,
            CoverState::Open,
            CoverState::Open,
        );
        assert!(outcome.request_display_on);
        assert!(outcome.request_tkunlock);
        assert!(m.is_auto_relock_armed());
    }

    #[test]
    fn activity_cancels_auto_relock() {
        let mut m = KeyboardSlideMachine::new();
        m.on_slide_opened(DisplayState::Off, TriggerPolicy::Always, CoverState::Open, CoverState::Open);
        assert!(m.is_auto_relock_armed());
        assert!(m.on_activity());
        assert!(!m.is_auto_relock_armed());
    }
}
