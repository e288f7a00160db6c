//! Inactivity & idle-shutdown (C8, §4.5).
//!
//! Grounded on the teacher's `Scheduler` delegate-callback pattern:
//! activity actions fire once through a registered callback list, then
//! the list is cleared — the same "collect, then invoke, then forget"
//! discipline [`crate::heartbeat`] uses for timer fire-sets, applied
//! here to registered IPC callbacks instead of timer names.

use crate::datapipe::{ChargerState, DisplayState, SystemState};
use crate::heartbeat::HeartbeatDispatcher;

pub const INACTIVITY_TIMER: &str = "inactivity.timer";
pub const IDLE_SHUTDOWN_TIMER: &str = "inactivity.idle_shutdown";
pub const WAKELOCK_NAME: &str = "mce_inactivity_cb";
pub const WAKELOCK_HOLD_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Active,
    Inactive,
}

pub struct ActivityFilterInputs {
    pub display: DisplayState,
    pub system_state: SystemState,
    pub lockscreen_up: bool,
    pub alarm_active: bool,
    pub call_active: bool,
    pub interaction_expected: bool,
}

/// §4.5: "When activity events are published while the display is off,
/// system not in USER, or lockscreen is up without active alarm/call/
/// interaction-expected, the event is filtered out."
pub fn activity_is_filtered(inputs: &ActivityFilterInputs) -> bool {
    if inputs.display.is_off_like() {
        return true;
    }
    if inputs.system_state != SystemState::User {
        return true;
    }
    if inputs.lockscreen_up && !(inputs.alarm_active || inputs.call_active || inputs.interaction_expected) {
        return true;
    }
    false
}

/// A registered `(service, path, interface, method)` activity callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityAction {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub method: String,
}

pub struct InactivityMachine {
    actions: Vec<ActivityAction>,
    state: ActivityState,
}

pub struct IdleShutdownGates {
    pub idle_shutdown_enabled: bool,
    pub charger_state: ChargerState,
    pub os_update_running: bool,
    pub init_done: bool,
    pub system_state: SystemState,
}

impl InactivityMachine {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            state: ActivityState::Inactive,
        }
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn register_action(&mut self, action: ActivityAction) -> bool {
        if self.actions.contains(&action) {
            return false;
        }
        self.actions.push(action);
        true
    }

    pub fn unregister_action(&mut self, service: &str, path: &str, interface: &str, method: &str) {
        self.actions
            .retain(|a| !(a.service == service && a.path == path && a.interface == interface && a.method == method));
    }

    /// A bus peer vanished: drop every action it registered.
    pub fn owner_gone(&mut self, service: &str) {
        self.actions.retain(|a| a.service != service);
    }

    /// Distinct `service` names with at least one registered action,
    /// for the periodic disconnect-liveness sweep.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        let mut seen = std::collections::HashSet::new();
        self.actions
            .iter()
            .map(|a| a.service.as_str())
            .filter(move |s| seen.insert(*s))
    }

    /// An activity event was observed (already known not to be
    /// filtered by [`activity_is_filtered`]). Restarts the inactivity
    /// timer, and if this transitions from Inactive, returns the
    /// actions to fire once (caller invokes them fire-and-forget, then
    /// this machine forgets them — matching §4.5's "invoked once ...
    /// then all actions are cleared").
    pub fn on_activity(
        &mut self,
        delay_ms: u64,
        heartbeat: &mut HeartbeatDispatcher,
        now_ms: u64,
    ) -> Vec<ActivityAction> {
        let was_inactive = self.state == ActivityState::Inactive;
        self.state = ActivityState::Active;
        heartbeat.create(INACTIVITY_TIMER, delay_ms);
        heartbeat.start(INACTIVITY_TIMER, now_ms);
        if was_inactive {
            std::mem::take(&mut self.actions)
        } else {
            Vec::new()
        }
    }

    /// Inactivity timer fired. Returns whether to arm the idle-shutdown
    /// heartbeat timer.
    pub fn on_inactivity_timer_fired(
        &mut self,
        gates: &IdleShutdownGates,
        idle_shutdown_delay_ms: u64,
        heartbeat: &mut HeartbeatDispatcher,
        now_ms: u64,
    ) -> bool {
        self.state = ActivityState::Inactive;
        let should_arm = gates.idle_shutdown_enabled
            && gates.charger_state == ChargerState::Off
            && !gates.os_update_running
            && gates.init_done
            && gates.system_state == SystemState::User;
        if should_arm {
            heartbeat.create(IDLE_SHUTDOWN_TIMER, idle_shutdown_delay_ms);
            heartbeat.start(IDLE_SHUTDOWN_TIMER, now_ms);
        }
        should_arm
    }

    /// Idle-shutdown timer fired: caller should request a normal
    /// system shutdown.
    pub fn on_idle_shutdown_fired(&mut self) {}
}

impl Default for InactivityMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gates() -> IdleShutdownGates {
        IdleShutdownGates {
            idle_shutdown_enabled: true,
            charger_state: ChargerState::Off,
            os_update_running: false,
            init_done: true,
            system_state: SystemState::User,
        }
    }

    #[test]
    fn filtered_while_display_off() {
        let inputs = ActivityFilterInputs {
            display: DisplayState::Off,
            system_state: SystemState::User,
            lockscreen_up: false,
            alarm_active: false,
            call_active: false,
            interaction_expected: false,
        };
        assert!(activity_is_filtered(&inputs));
    }

    #[test]
    fn i4_filtered_while_lockscreen_up_without_interaction() {
        let inputs = ActivityFilterInputs {
            display: DisplayState::On,
            system_state: SystemState::User,
            lockscreen_up: true,
            alarm_active: false,
            call_active: false,
            interaction_expected: false,
        };
        assert!(activity_is_filtered(&inputs));

        let inputs2 = ActivityFilterInputs {
            call_active: true,
            ..inputs
        };
        assert!(!activity_is_filtered(&inputs2));
    }

    #[test]
    fn first_active_transition_drains_registered_actions_once() {
        let mut m = InactivityMachine::new();
        m.register_action(ActivityAction {
            service: "com.example".into(),
            path: "/".into(),
            interface: "com.example.I".into(),
            method: "Go".into(),
        });
        let mut hb = HeartbeatDispatcher::new();
        let fired = m.on_activity(1_000, &mut hb, 0);
        assert_eq!(fired.len(), 1);

        m.on_inactivity_timer_fired(&gates(), 5_000, &mut hb, 1_000);
        let fired_again = m.on_activity(1_000, &mut hb, 2_000);
        assert!(fired_again.is_empty());
    }

    #[test]
    fn idle_shutdown_armed_only_when_all_gates_hold() {
        let mut m = InactivityMachine::new();
        let mut hb = HeartbeatDispatcher::new();
        let armed = m.on_inactivity_timer_fired(&gates(), 10_000, &mut hb, 0);
        assert!(armed);
        assert!(hb.is_active(IDLE_SHUTDOWN_TIMER));

        let mut m2 = InactivityMachine::new();
        let mut hb2 = HeartbeatDispatcher::new();
        let mut blocked_gates = gates();
        blocked_gates.charger_state = ChargerState::On;
        let armed2 = m2.on_inactivity_timer_fired(&blocked_gates, 10_000, &mut hb2, 0);
        assert!(!armed2);
    }

    #[test]
    fn owner_gone_drops_its_actions() {
        let mut m = InactivityMachine::new();
        m.register_action(ActivityAction {
            service: "com.example".into(),
            path: "/".into(),
            interface: "com.example.I".into(),
            method: "Go".into(),
        });
        m.owner_gone("com.example");
        let mut hb = HeartbeatDispatcher::new();
        assert!(m.on_activity(1_000, &mut hb, 0).is_empty());
    }
}
