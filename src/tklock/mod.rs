//! TKLock core (C7, §4.4) — the largest component.
//!
//! Eleven sub-machines, each a small self-contained type, orchestrated
//! by [`TklockContext`]/[`TklockService`]. Grounded on the teacher's
//! `app::service::AppService` pattern: `tick()`/event-handlers
//! orchestrate sub-evaluations against a shared blackboard
//! (`FsmContext` there, [`TklockContext`] here).

pub mod autolock;
pub mod autolock_after_devicelock;
pub mod doubletap;
pub mod exception;
pub mod glance;
pub mod history;
pub mod keyboard_slide;
pub mod legacy_input;
pub mod lid;
pub mod notification;
pub mod proximity;
pub mod proximity_lock;
pub mod ui_gate;

use crate::config::Settings;
use crate::datapipe::{CallState, CoverState, DevicelockState, DisplayState, UiExceptionType};
use crate::heartbeat::HeartbeatDispatcher;
use crate::sysfs::SysfsControl;
use crate::wakelock::WakelockRegistry;

use autolock::AutolockMachine;
use autolock_after_devicelock::AutolockAfterDevicelock;
use doubletap::DoubletapCalibration;
use exception::{ExceptionInputs, ExceptionRecord};
use glance::GlanceMachine;
use history::ProximityHistory;
use keyboard_slide::KeyboardSlideMachine;
use lid::{LidPipeline, LidSensorFlag};
use notification::NotificationTable;
use proximity::ProximityPipeline;
use proximity_lock::ProximityLock;
use ui_gate::UiGate;

/// The shared blackboard every sub-machine reads from and writes into.
/// Populated by the main loop (§5: single-threaded cooperative,
/// no sub-machine entered concurrently with itself).
pub struct TklockContext {
    pub display_next: DisplayState,
    pub display_actual: DisplayState,
    pub proximity_actual: CoverState,
    pub proximity_effective: CoverState,
    pub lid_actual: CoverState,
    pub lid_filtered: CoverState,
    pub devicelock_state: DevicelockState,
    pub call_state: CallState,
    pub music_playing: bool,
    pub ui_service_running: bool,
    pub compositor_running: bool,
    pub system_is_user_mode: bool,
    pub init_done: bool,
    pub tklock_bit: bool,
}

impl Default for TklockContext {
    fn default() -> Self {
        Self {
            display_next: DisplayState::Undefined,
            display_actual: DisplayState::Undefined,
            proximity_actual: CoverState::Undefined,
            proximity_effective: CoverState::Undefined,
            lid_actual: CoverState::Undefined,
            lid_filtered: CoverState::Undefined,
            devicelock_state: DevicelockState::Undefined,
            call_state: CallState::None,
            music_playing: false,
            ui_service_running: false,
            compositor_running: false,
            system_is_user_mode: false,
            init_done: false,
            tklock_bit: false,
        }
    }
}

/// Owns every sub-machine. Construction wires in the sysfs controls
/// discovered at startup; everything else is pure in-process state.
pub struct TklockService {
    pub exception: ExceptionRecord,
    pub proximity: ProximityPipeline,
    pub proximity_history: ProximityHistory,
    pub autolock: AutolockMachine,
    pub autolock_after_devicelock: AutolockAfterDevicelock,
    pub proximity_lock: ProximityLock,
    pub lid: LidPipeline,
    pub lid_flag: LidSensorFlag,
    pub keyboard_slide: KeyboardSlideMachine,
    pub ui_gate: UiGate,
    pub glance: GlanceMachine,
    pub doubletap: DoubletapCalibration,
    pub notifications: NotificationTable,
}

impl TklockService {
    pub fn new(lid_flag_path: impl AsRef<std::path::Path>, doubletap_ctl: SysfsControl) -> Self {
        Self {
            exception: ExceptionRecord::new(),
            proximity: ProximityPipeline::new(),
            proximity_history: ProximityHistory::new(),
            autolock: AutolockMachine::new(),
            autolock_after_devicelock: AutolockAfterDevicelock::new(),
            proximity_lock: ProximityLock::new(),
            lid: LidPipeline::new(),
            lid_flag: LidSensorFlag::load(lid_flag_path),
            keyboard_slide: KeyboardSlideMachine::new(),
            ui_gate: UiGate::new(),
            glance: GlanceMachine::new(),
            doubletap: DoubletapCalibration::new(doubletap_ctl),
            notifications: NotificationTable::new(),
        }
    }

    fn exception_inputs(ctx: &TklockContext) -> ExceptionInputs {
        ExceptionInputs {
            display_next: ctx.display_next,
            tklock_bit: ctx.tklock_bit,
            devicelock_state: ctx.devicelock_state,
            system_is_user_mode: ctx.system_is_user_mode,
            init_done: ctx.init_done,
        }
    }

    /// Proximity-actual changed: drives the cover-delay LED pattern
    /// (§4.4.2), the proximity-lock absolute timer (§4.4.5), the
    /// history ring buffer feeding glance (§4.4.10), and a rethink of
    /// the call-proximity exception outcome (§4.4.8).
    pub fn on_proximity_actual_changed(
        &mut self,
        ctx: &mut TklockContext,
        new_actual: CoverState,
        settings: &Settings,
        heartbeat: &mut HeartbeatDispatcher,
        now_ms: u64,
    ) {
        ctx.proximity_actual = new_actual;
        self.proximity.on_actual_changed(
            new_actual,
            ctx.call_state == CallState::Active,
            settings,
            &mut self.proximity_history,
            now_ms,
            heartbeat,
        );
    }

    /// `display_next` changed: re-arms/cancels the autolock timer, the
    /// post-devicelock window, the keyboard-slide auto-relock, and the
    /// glance history reset.
    pub fn on_display_next_changed(
        &mut self,
        ctx: &mut TklockContext,
        old: DisplayState,
        new: DisplayState,
        settings: &Settings,
        heartbeat: &mut HeartbeatDispatcher,
        now_ms: u64,
    ) {
        ctx.display_next = new;
        let gates = autolock::AutolockGates {
            settings,
            tklock_already_set: ctx.tklock_bit,
            exception_active: self.exception.is_active(),
        };
        self.autolock.on_display_next_changed(old, new, &gates, heartbeat, now_ms);
        self.autolock_after_devicelock
            .on_display_next_changed(old, new, now_ms, heartbeat);
        let pl_gates = proximity_lock::ProximityLockGates {
            tklock_already_set: ctx.tklock_bit,
            exception_active: self.exception.is_active(),
        };
        self.proximity_lock
            .on_display_next_changed(old, new, ctx.proximity_effective, &pl_gates, now_ms);
        self.glance.on_display_changed(new, &mut self.proximity_history);
    }

    /// `devicelock` state changed: drives autolock-after-devicelock and
    /// the exception's "unlocked clears restore" rule.
    pub fn on_devicelock_changed(&mut self, ctx: &mut TklockContext, new_state: DevicelockState, heartbeat: &mut HeartbeatDispatcher) -> bool {
        ctx.devicelock_state = new_state;
        if new_state == DevicelockState::Unlocked {
            self.exception.devicelock_went_unlocked();
        }
        self.autolock_after_devicelock.on_devicelock_changed(new_state, heartbeat)
    }

    /// Begin a UI exception of `kind` (§4.4.8). Call before flipping
    /// whatever datapipe the caller is reacting to.
    pub fn start_exception(&mut self, ctx: &TklockContext, kind: UiExceptionType) {
        self.exception.start(kind, &Self::exception_inputs(ctx));
    }

    /// End a UI exception of `kind`; returns the linger deadline if the
    /// mask became empty.
    pub fn end_exception(&mut self, kind: UiExceptionType, linger_ms: u64, now_ms: u64) -> Option<u64> {
        self.exception.end(kind, linger_ms, now_ms)
    }

    /// Poll the non-heartbeat proximity-lock deadline; call both from
    /// the main dispatch loop and once right after resume (§5).
    pub fn poll_proximity_lock(&mut self, ctx: &TklockContext, now_ms: u64) -> bool {
        let gates = proximity_lock::ProximityLockGates {
            tklock_already_set: ctx.tklock_bit,
            exception_active: self.exception.is_active(),
        };
        self.proximity_lock
            .poll(now_ms, ctx.display_next, ctx.proximity_effective, &gates)
    }

    /// Submode filter (§4.4.1): the single writer of the tklock bit.
    pub fn submode_filter(&mut self, ctx: &TklockContext, requested_bit: bool, settings: &Settings) -> bool {
        ui_gate::submode_filter(
            &mut self.ui_gate,
            requested_bit,
            ctx.ui_service_running,
            ctx.devicelock_state,
            settings.devicelock_in_lockscreen,
            ctx.lid_filtered,
        )
    }

    /// Legacy input bits + grab decision (§4.4.11), recomputed fresh.
    pub fn rethink_legacy_input(
        &self,
        ctx: &TklockContext,
        settings: &Settings,
        system_shutting_down: bool,
    ) -> (legacy_input::LegacyInputBits, legacy_input::InputGrab) {
        let inputs = legacy_input::LegacyInputInputs {
            display: ctx.display_next,
            system_shutting_down,
            call_state: ctx.call_state,
            music_playing: ctx.music_playing,
            doubletap_mode: settings.doubletap_mode,
            proximity_effective: ctx.proximity_effective,
        };
        let bits = legacy_input::rethink_bits(&inputs);
        let grab = legacy_input::rethink_grab(
            ctx.display_next,
            ctx.proximity_effective,
            settings.proximity_blocks_touch,
            settings.input_policy_enabled,
        );
        (bits, grab)
    }

    /// Wakelock discipline for the notify-scheduling window (I6):
    /// held iff either notify timer is armed. Callers pass the two
    /// armed flags after evaluating the notify/grace timers.
    pub fn sync_notify_wakelock(
        &self,
        registry: &WakelockRegistry,
        open_timer_armed: bool,
        grace_timer_armed: bool,
    ) {
        const NAME: &str = "mce_tklock_notify";
        if open_timer_armed || grace_timer_armed {
            registry.acquire(NAME);
        } else {
            registry.release(NAME);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn doubletap_ctl() -> SysfsControl {
        SysfsControl::new("test-dt", vec![])
    }

    #[test]
    fn construction_wires_every_submachine() {
        let path = std::env::temp_dir().join(format!("mce-tklock-mod-test-{}", std::process::id()));
        std::fs::remove_file(&path).ok();
        let svc = TklockService::new(&path, doubletap_ctl());
        assert!(!svc.exception.is_active());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn submode_filter_denies_when_ui_service_not_running() {
        let path = std::env::temp_dir().join(format!("mce-tklock-mod-test2-{}", std::process::id()));
        std::fs::remove_file(&path).ok();
        let mut svc = TklockService::new(&path, doubletap_ctl());
        let ctx = TklockContext::default();
        let settings = Settings::default();
        assert!(!svc.submode_filter(&ctx, true, &settings));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn notify_wakelock_held_iff_either_timer_armed() {
        let path = std::env::temp_dir().join(format!("mce-tklock-mod-test3-{}", std::process::id()));
        std::fs::remove_file(&path).ok();
        let svc = TklockService::new(&path, doubletap_ctl());
        let registry = WakelockRegistry::new();
        svc.sync_notify_wakelock(&registry, true, false);
        assert!(registry.is_held("mce_tklock_notify"));
        svc.sync_notify_wakelock(&registry, false, false);
        assert!(!registry.is_held("mce_tklock_notify"));
        std::fs::remove_file(&path).ok();
    }
}
