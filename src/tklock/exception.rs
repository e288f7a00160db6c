//! UI-exception handling (§3.6, §4.4.8) — the most intricate machine in
//! the TKLock core.
//!
//! Exceptions stack by priority `notif > alarm > call > linger > noanim`.
//! Exactly one type is topmost whenever the mask is non-empty. Grounded
//! in the design notes' resolution of the exception/display/tklock
//! cycle: one owner of the record (this struct), the topmost channel is
//! a pure mirror, and every decision is recomputed from scratch rather
//! than edited incrementally.

use crate::datapipe::{CoverState, DevicelockState, DisplayState, UiExceptionMask, UiExceptionType};

/// §3.6: the single owned exception record.
#[derive(Debug, Clone)]
pub struct ExceptionRecord {
    pub active_mask: UiExceptionMask,
    pub topmost: UiExceptionType,
    saved_display: DisplayState,
    saved_tklock_bit: bool,
    saved_devicelock: DevicelockState,
    pub in_sync: bool,
    pub restore: bool,
    was_called: bool,
    linger_deadline_ms: u64,
}

impl Default for ExceptionRecord {
    fn default() -> Self {
        Self {
            active_mask: UiExceptionMask::empty(),
            topmost: UiExceptionType::None,
            saved_display: DisplayState::Undefined,
            saved_tklock_bit: false,
            saved_devicelock: DevicelockState::Undefined,
            in_sync: false,
            restore: false,
            was_called: false,
            linger_deadline_ms: 0,
        }
    }
}

/// Inputs the snapshot needs at exception start, and the gates later
/// re-evaluation needs — threaded through explicitly rather than held,
/// per the design notes' "recompute from scratch" resolution of the
/// exception/display/tklock cycle.
pub struct ExceptionInputs {
    pub display_next: DisplayState,
    pub tklock_bit: bool,
    pub devicelock_state: DevicelockState,
    pub system_is_user_mode: bool,
    pub init_done: bool,
}

/// What the machine wants the caller to do as a result of a rethink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionOutcome {
    pub request_display_off_proximity_blanking: bool,
    pub request_unblank: bool,
    pub finished_restore: Option<(DisplayState, bool)>,
}

fn priority_order() -> [UiExceptionType; 5] {
    [
        UiExceptionType::Notif,
        UiExceptionType::Alarm,
        UiExceptionType::Call,
        UiExceptionType::Linger,
        UiExceptionType::Noanim,
    ]
}

impl ExceptionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    fn recompute_topmost(&mut self) {
        self.topmost = priority_order()
            .into_iter()
            .find(|t| self.active_mask.contains(t.mask()))
            .unwrap_or(UiExceptionType::None);
    }

    pub fn is_active(&self) -> bool {
        !self.active_mask.is_empty()
    }

    /// Begin (or extend) an exception of type `kind`.
    pub fn start(&mut self, kind: UiExceptionType, inputs: &ExceptionInputs) {
        if self.active_mask.is_empty() {
            self.saved_display = inputs.display_next;
            self.saved_tklock_bit = inputs.tklock_bit;
            self.saved_devicelock = inputs.devicelock_state;
            self.in_sync = true;
            self.restore = kind != UiExceptionType::Noanim;
            if !inputs.system_is_user_mode && !inputs.init_done {
                self.restore = false;
            }
        }
        self.active_mask |= kind.mask();
        self.recompute_topmost();
    }

    /// End an exception of type `kind`, recording the requested linger.
    /// Returns `Some(linger_deadline_ms)` when the mask became empty and
    /// the caller should arm the linger timer for
    /// `linger_deadline_ms - now_ms`.
    pub fn end(&mut self, kind: UiExceptionType, linger_ms: u64, now_ms: u64) -> Option<u64> {
        self.active_mask &= !kind.mask();
        self.linger_deadline_ms = self.linger_deadline_ms.max(now_ms + linger_ms);
        self.recompute_topmost();
        if self.active_mask.is_empty() {
            Some(self.linger_deadline_ms)
        } else {
            None
        }
    }

    /// The linger timer fired: run *finish*. Returns the tklock bit to
    /// restore and the display state to restore to, or `None` if restore
    /// was denied or the gates (proximity/lid) block a display restore.
    pub fn finish(
        &mut self,
        proximity_actual_open: bool,
        lid_filtered_closed: bool,
    ) -> (Option<bool>, Option<DisplayState>) {
        if !self.restore {
            return (None, None);
        }
        let tklock = Some(self.saved_tklock_bit);
        let display = if proximity_actual_open && !lid_filtered_closed {
            Some(self.saved_display)
        } else {
            None
        };
        self.restore = false;
        (tklock, display)
    }

    /// Display transitioned off unexpectedly while an exception is
    /// active: mark out-of-sync, and drop restore unless CALL is
    /// topmost.
    pub fn display_transitioned_off_unexpectedly(&mut self) {
        if !self.is_active() {
            return;
        }
        self.in_sync = false;
        if self.topmost != UiExceptionType::Call {
            self.restore = false;
        }
    }

    /// TKLock was removed out-of-sync with this record. `is_incoming_call`
    /// is the corner case (§4.4.8) that must *not* clear restore.
    pub fn tklock_removed_out_of_sync(&mut self, is_incoming_call: bool) {
        if self.restore && !is_incoming_call {
            self.restore = false;
        }
    }

    pub fn devicelock_went_unlocked(&mut self) {
        if self.restore {
            self.restore = false;
        }
    }

    pub fn incoming_call_ringing(&mut self) {
        self.was_called = true;
        self.in_sync = true;
    }

    /// Re-evaluate the CALL/HANDSET/proximity blanking rule; call after
    /// any change to topmost, audio route, or proximity.
    pub fn rethink_call_proximity(
        &self,
        audio_route_is_handset: bool,
        proximity_covered: bool,
        lid_not_closed: bool,
        proximity_open: bool,
    ) -> ExceptionOutcome {
        let mut outcome = ExceptionOutcome::default();
        if self.topmost == UiExceptionType::Call && audio_route_is_handset && proximity_covered {
            outcome.request_display_off_proximity_blanking = true;
        } else if self.in_sync && lid_not_closed && proximity_open {
            outcome.request_unblank = true;
        }
        outcome
    }
}

pub fn cover_is_closed(state: CoverState) -> bool {
    state == CoverState::Closed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ExceptionInputs {
        ExceptionInputs {
            display_next: DisplayState::On,
            tklock_bit: false,
            devicelock_state: DevicelockState::Unlocked,
            system_is_user_mode: true,
            init_done: true,
        }
    }

    #[test]
    fn i3_exactly_one_topmost_when_mask_nonempty() {
        let mut rec = ExceptionRecord::new();
        rec.start(UiExceptionType::Alarm, &inputs());
        rec.start(UiExceptionType::Notif, &inputs());
        assert_eq!(rec.topmost, UiExceptionType::Notif);
        rec.end(UiExceptionType::Notif, 0, 0);
        assert_eq!(rec.topmost, UiExceptionType::Alarm);
    }

    #[test]
    fn noanim_never_sets_restore() {
        let mut rec = ExceptionRecord::new();
        rec.start(UiExceptionType::Noanim, &inputs());
        assert!(!rec.restore);
    }

    #[test]
    fn restore_denied_before_init_done_outside_user_mode() {
        let mut rec = ExceptionRecord::new();
        let mut inp = inputs();
        inp.system_is_user_mode = false;
        inp.init_done = false;
        rec.start(UiExceptionType::Call, &inp);
        assert!(!rec.restore);
    }

    #[test]
    fn ending_last_exception_returns_linger_deadline() {
        let mut rec = ExceptionRecord::new();
        rec.start(UiExceptionType::Call, &inputs());
        let deadline = rec.end(UiExceptionType::Call, 2_000, 9_000);
        assert_eq!(deadline, Some(11_000));
    }

    #[test]
    fn finish_restores_display_only_when_proximity_open_and_lid_not_closed() {
        let mut rec = ExceptionRecord::new();
        rec.start(UiExceptionType::Call, &inputs());
        rec.end(UiExceptionType::Call, 0, 0);
        let (tklock, display) = rec.finish(true, false);
        assert_eq!(tklock, Some(false));
        assert!(display.is_some());

        let mut rec2 = ExceptionRecord::new();
        rec2.start(UiExceptionType::Call, &inputs());
        rec2.end(UiExceptionType::Call, 0, 0);
        let (_, display2) = rec2.finish(false, false);
        assert!(display2.is_none());
    }

    #[test]
    fn display_off_unexpectedly_preserves_restore_only_for_call() {
        let mut rec = ExceptionRecord::new();
        rec.start(UiExceptionType::Call, &inputs());
        rec.display_transitioned_off_unexpectedly();
        assert!(rec.restore);
        assert!(!rec.in_sync);

        let mut rec2 = ExceptionRecord::new();
        rec2.start(UiExceptionType::Alarm, &inputs());
        rec2.display_transitioned_off_unexpectedly();
        assert!(!rec2.restore);
    }
}
