//! Boot/mode bootstrap (C11, §2 row C11 + §6.4 marker-file contract).
//!
//! Tracks system lifecycle transitions, assigns initial submode bits at
//! process start, and drives the shutdown LED pattern. The LED driver
//! is grounded on the teacher's `LedPatternEngine` (pattern selection by
//! priority, ticked once per loop) generalized from "FSM state /
//! connectivity / error" layers to one boot-state-driven pattern.

use std::path::Path;

use log::info;

use crate::datapipe::SystemState;
use crate::submode::{Submode, SubmodeRegister};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootState {
    #[default]
    Boot,
    User,
    ActDead,
    Shutdown,
    Reboot,
}

impl From<SystemState> for BootState {
    fn from(s: SystemState) -> Self {
        match s {
            SystemState::User => BootState::User,
            SystemState::ActDead => BootState::ActDead,
            SystemState::Shutdown => BootState::Shutdown,
            SystemState::Reboot => BootState::Reboot,
            SystemState::Boot | SystemState::Undefined => BootState::Boot,
        }
    }
}

/// Legal system-lifecycle transitions. Anything not listed is rejected
/// (the caller should log and ignore it rather than publish).
pub fn is_legal_transition(from: BootState, to: BootState) -> bool {
    use BootState::*;
    matches!(
        (from, to),
        (Boot, User)
            | (Boot, ActDead)
            | (User, ActDead)
            | (ActDead, User)
            | (User, Shutdown)
            | (ActDead, Shutdown)
            | (User, Reboot)
            | (ActDead, Reboot)
    )
}

/// §6.4: a bootup marker file under the runtime directory, plus a MALF
/// marker that only takes effect if a matching filesystem flag is also
/// present — both must agree before the MALF submode bit is set.
pub fn initial_submodes(
    runtime_dir: &Path,
    malf_fs_flag_path: &Path,
    submodes: &mut SubmodeRegister,
) {
    submodes.set_bit(Submode::BOOTUP);

    let bootup_marker = runtime_dir.join("mce-bootup");
    let _ = std::fs::write(&bootup_marker, b"");

    let malf_runtime_marker = runtime_dir.join("mce-malf");
    let runtime_flag_present = malf_runtime_marker.exists();
    let fs_flag_present = malf_fs_flag_path.exists();
    if runtime_flag_present && fs_flag_present {
        submodes.set_bit(Submode::MALF);
        info!("bootstate: MALF marker present on both filesystem and runtime dir, setting MALF submode");
    }
}

pub fn clear_bootup(submodes: &mut SubmodeRegister) {
    submodes.clear_bit(Submode::BOOTUP);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownLedPattern {
    None,
    PoweringDown,
    Rebooting,
}

impl From<BootState> for ShutdownLedPattern {
    fn from(state: BootState) -> Self {
        match state {
            BootState::Shutdown => ShutdownLedPattern::PoweringDown,
            BootState::Reboot => ShutdownLedPattern::Rebooting,
            _ => ShutdownLedPattern::None,
        }
    }
}

/// Drives the shutdown LED sequence off the current boot state, ticked
/// once per main-loop iteration — same priority-select-then-tick shape
/// as the teacher's pattern engine, reduced to the single layer this
/// system needs.
pub struct ShutdownLedDriver {
    phase_ms: u32,
    active: ShutdownLedPattern,
}

impl ShutdownLedDriver {
    pub fn new() -> Self {
        Self {
            phase_ms: 0,
            active: ShutdownLedPattern::None,
        }
    }

    pub fn tick(&mut self, boot_state: BootState, delta_ms: u32) -> ShutdownLedPattern {
        let selected = ShutdownLedPattern::from(boot_state);
        if selected != self.active {
            self.phase_ms = 0;
        } else {
            self.phase_ms = self.phase_ms.wrapping_add(delta_ms);
        }
        self.active = selected;
        selected
    }
}

impl Default for ShutdownLedDriver {
    fn default() -> Self {
        Self::new()
    }
}
