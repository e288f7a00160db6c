//! Autolock / inactivity-lock machine (§4.4.3).
//!
//! A heartbeat-timer-backed machine: armed when the display starts
//! transitioning toward OFF, disarmed the moment it leaves OFF. On fire,
//! an immediate devicelock-locked check can short-circuit the wait.

use crate::config::{Settings, AUTOLOCK_DELAY_MAX_MS, AUTOLOCK_DELAY_MIN_MS};
use crate::datapipe::{DevicelockState, DisplayState};
use crate::heartbeat::HeartbeatDispatcher;

pub const TIMER_NAME: &str = "tklock.autolock";

pub struct AutolockMachine;

pub struct AutolockGates<'a> {
    pub settings: &'a Settings,
    pub tklock_already_set: bool,
    pub exception_active: bool,
}

impl AutolockMachine {
    fn guards_hold(display_next: DisplayState, gates: &AutolockGates) -> bool {
        display_next.is_off_like()
            && gates.settings.autolock_enabled
            && !gates.tklock_already_set
            && !gates.exception_active
    }

    /// Call whenever `display_next` changes.
    pub fn on_display_next_changed(
        &mut self,
        old: DisplayState,
        new: DisplayState,
        gates: &AutolockGates,
        heartbeat: &mut HeartbeatDispatcher,
        now_ms: u64,
    ) {
        let entering_off = !old.is_off_like() && new.is_off_like();
        let leaving_off = old.is_off_like() && !new.is_off_like();

        if entering_off && Self::guards_hold(new, gates) {
            let delay = gates
                .settings
                .autolock_delay_ms
                .clamp(AUTOLOCK_DELAY_MIN_MS, AUTOLOCK_DELAY_MAX_MS) as u64;
            heartbeat.create(TIMER_NAME, delay);
            heartbeat.start(TIMER_NAME, now_ms);
        } else if leaving_off {
            heartbeat.stop(TIMER_NAME);
        }
    }

    /// Timer fired. Returns `true` if tklock should be requested.
    pub fn on_timer_fired(&mut self, devicelock_state: DevicelockState, gates: &AutolockGates) -> bool {
        if devicelock_state == DevicelockState::Locked {
            return true;
        }
        Self::guards_hold(DisplayState::Off, gates)
    }
}

impl Default for AutolockMachine {
    fn default() -> Self {
        Self
    }
}
