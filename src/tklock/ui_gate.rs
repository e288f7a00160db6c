//! TKLock UI gate and submode sync (§4.4.1, §4.4.9).
//!
//! `tklock_ui_set_enabled` is the single policy gate through which every
//! request to flip the UI-visible lock state passes; the submode filter
//! (§4.4.1) is the single writer of the submode tklock bit and always
//! routes through this gate first, which is what keeps I1 true: the
//! published submode tklock bit equals `tklock_ui_enabled` once the
//! sync job has run.

use crate::datapipe::{CoverState, DevicelockState, DisplayState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDenial {
    UiServiceNotRunning,
    DevicelockedInLockscreen,
    LidClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateOutcome {
    pub accepted: bool,
    pub denial: Option<GateDenial>,
    pub want_device_unlock_query: bool,
    /// Schedule the notify idle job (§4.4.9 "notify scheduling").
    pub schedule_notify: bool,
    /// Schedule the submode-sync idle job.
    pub schedule_sync: bool,
}

pub struct UiGate {
    enabled: bool,
}

impl UiGate {
    pub fn new() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `tklock_ui_set_enabled(b)` (§4.4.9).
    pub fn set_enabled(
        &mut self,
        want_enabled: bool,
        ui_service_running: bool,
        devicelock_state: DevicelockState,
        devicelock_in_lockscreen_policy: bool,
        lid_state: CoverState,
    ) -> GateOutcome {
        if want_enabled && !ui_service_running {
            return GateOutcome {
                accepted: false,
                denial: Some(GateDenial::UiServiceNotRunning),
                ..Default::default()
            };
        }
        if !want_enabled
            && devicelock_state == DevicelockState::Locked
            && devicelock_in_lockscreen_policy
        {
            return GateOutcome {
                accepted: false,
                denial: Some(GateDenial::DevicelockedInLockscreen),
                want_device_unlock_query: true,
                ..Default::default()
            };
        }
        if !want_enabled && lid_state == CoverState::Closed {
            return GateOutcome {
                accepted: false,
                denial: Some(GateDenial::LidClosed),
                ..Default::default()
            };
        }
        self.enabled = want_enabled;
        GateOutcome {
            accepted: true,
            denial: None,
            want_device_unlock_query: false,
            schedule_notify: true,
            schedule_sync: true,
        }
    }

    /// §4.4.9 "notify scheduling": never send the open/close request
    /// while the display is mid-transition in any of these ways.
    pub fn may_send_notify_now(&self, display_next: DisplayState, display_actual: DisplayState) -> bool {
        let powering_down = display_actual == DisplayState::PowerDown;
        let transitioning_from_lpm = display_actual.is_lpm() && !display_next.is_lpm();
        let transitioning_into_off = display_next.is_off_like() && display_actual != display_next;
        !(powering_down || transitioning_from_lpm || transitioning_into_off)
    }
}

impl Default for UiGate {
    fn default() -> Self {
        Self::new()
    }
}

/// §4.4.1 submode filter: the single writer for the tklock submode bit.
/// Applies the gate, then replaces the incoming bit with the accepted
/// UI state — the invariant I1 depends on this being the *only* path
/// that writes the submode tklock bit.
pub fn submode_filter(
    gate: &mut UiGate,
    requested_bit: bool,
    ui_service_running: bool,
    devicelock_state: DevicelockState,
    devicelock_in_lockscreen_policy: bool,
    lid_state: CoverState,
) -> bool {
    gate.set_enabled(
        requested_bit,
        ui_service_running,
        devicelock_state,
        devicelock_in_lockscreen_policy,
        lid_state,
    );
    gate.is_enabled()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabling_denied_when_ui_service_not_running() {
        let mut gate = UiGate::new();
        let outcome = gate.set_enabled(true, false, DevicelockState::Unlocked, true, CoverState::Open);
        assert!(!outcome.accepted);
        assert_eq!(outcome.denial, Some(GateDenial::UiServiceNotRunning));
    }

    #[test]
    fn disabling_denied_when_devicelocked_in_lockscreen_policy() {
        let mut gate = UiGate::new();
        gate.set_enabled(true, true, DevicelockState::Unlocked, true, CoverState::Open);
        let outcome = gate.set_enabled(false, true, DevicelockState::Locked, true, CoverState::Open);
        assert!(!outcome.accepted);
        assert!(outcome.want_device_unlock_query);
    }

    #[test]
    fn disabling_denied_when_lid_closed() {
        let mut gate = UiGate::new();
        gate.set_enabled(true, true, DevicelockState::Unlocked, true, CoverState::Open);
        let outcome = gate.set_enabled(false, true, DevicelockState::Unlocked, true, CoverState::Closed);
        assert!(!outcome.accepted);
        assert_eq!(outcome.denial, Some(GateDenial::LidClosed));
    }

    #[test]
    fn i1_submode_filter_mirrors_accepted_ui_state() {
        let mut gate = UiGate::new();
        let bit = submode_filter(&mut gate, true, true, DevicelockState::Unlocked, true, CoverState::Open);
        assert!(bit);
        assert_eq!(bit, gate.is_enabled());
    }

    #[test]
    fn notify_blocked_while_powering_down_or_into_off() {
        let gate = UiGate::new();
        assert!(!gate.may_send_notify_now(DisplayState::Off, DisplayState::PowerDown));
        assert!(!gate.may_send_notify_now(DisplayState::Off, DisplayState::On));
        assert!(gate.may_send_notify_now(DisplayState::On, DisplayState::On));
    }
}
