//! Proximity-lock (§4.4.5).
//!
//! A non-heartbeat (absolute-deadline) timer: armed for a fixed 3 s when
//! the display transitions toward OFF while proximity is covered. Unlike
//! the heartbeat timers, its deadline is explicitly re-checked on
//! resume rather than assumed to have fired — §5: "non-heartbeat timers
//! may miss deadlines during sleep and must be re-evaluated at resume
//! (the proximity-lock machine does exactly this)".

use crate::datapipe::{CoverState, DisplayState};
use crate::heartbeat::now_boottime_ms;

pub const DELAY_MS: u64 = 3_000;
pub const PROXIMITY_TAG: &str = "tklock.proximity_lock";

pub struct ProximityLock {
    deadline_ms: Option<u64>,
}

pub struct ProximityLockGates {
    pub tklock_already_set: bool,
    pub exception_active: bool,
}

impl ProximityLock {
    pub fn new() -> Self {
        Self { deadline_ms: None }
    }

    fn guards_hold(display_next: DisplayState, effective_proximity: CoverState, gates: &ProximityLockGates) -> bool {
        display_next.is_off_like()
            && !gates.tklock_already_set
            && !gates.exception_active
            && effective_proximity == CoverState::Closed
    }

    /// Call when `display_next` changes. Returns `true` if the proximity
    /// sensor's on-demand reference count should be incremented.
    pub fn on_display_next_changed(
        &mut self,
        old: DisplayState,
        new: DisplayState,
        effective_proximity: CoverState,
        gates: &ProximityLockGates,
        now_ms: u64,
    ) -> bool {
        let entering_off = !old.is_off_like() && new.is_off_like();
        if entering_off && Self::guards_hold(new, effective_proximity, gates) {
            self.deadline_ms = Some(now_ms + DELAY_MS);
            true
        } else {
            if !new.is_off_like() {
                self.deadline_ms = None;
            }
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// Poll whether the deadline has passed. Call both from the normal
    /// dispatch loop and once right after resume (with the fresh
    /// boot-time clock) so a deadline that elapsed during suspend still
    /// fires (§5).
    pub fn poll(
        &mut self,
        now_ms: u64,
        display_next: DisplayState,
        effective_proximity: CoverState,
        gates: &ProximityLockGates,
    ) -> bool {
        let Some(deadline) = self.deadline_ms else {
            return false;
        };
        if now_ms < deadline {
            return false;
        }
        self.deadline_ms = None;
        Self::guards_hold(display_next, effective_proximity, gates)
    }
}

impl Default for ProximityLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gates() -> ProximityLockGates {
        ProximityLockGates {
            tklock_already_set: false,
            exception_active: false,
        }
    }

    #[test]
    fn arms_only_when_effective_proximity_closed() {
        let mut p = ProximityLock::new();
        let ref_count_bump = p.on_display_next_changed(
            DisplayState::On,
            DisplayState::Off,
            CoverState::Closed,
            &gates(),
            0,
        );
        assert!(ref_count_bump);
        assert!(p.is_armed());
    }

    #[test]
    fn fires_after_deadline_with_gates_still_holding() {
        let mut p = ProximityLock::new();
        p.on_display_next_changed(DisplayState::On, DisplayState::Off, CoverState::Closed, &gates(), 0);
        assert!(!p.poll(2_999, DisplayState::Off, CoverState::Closed, &gates()));
        assert!(p.poll(3_000, DisplayState::Off, CoverState::Closed, &gates()));
    }

    #[test]
    fn resume_after_suspend_fires_opportunistically() {
        let mut p = ProximityLock::new();
        p.on_display_next_changed(DisplayState::On, DisplayState::Off, CoverState::Closed, &gates(), 0);
        // Suspend for much longer than the timer's period; resume clock
        // jumps straight past the deadline.
        let resumed_now = now_boottime_ms().max(100_000);
        assert!(p.poll(resumed_now, DisplayState::Off, CoverState::Closed, &gates()));
    }
}
