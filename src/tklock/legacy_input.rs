//! Legacy input gating: keypad/touchscreen/double-tap enable bits and
//! touch/keypad input grab (§4.4.11).
//!
//! Re-derived from scratch on every "rethink" rather than maintained
//! incrementally, same discipline as [`super::exception`]'s topmost
//! recompute.

use crate::config::TriggerPolicy;
use crate::datapipe::{CallState, CoverState, DisplayState};
use crate::sysfs::SysfsControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyInputBits {
    pub kp_enabled: bool,
    pub ts_enabled: bool,
    pub dt_enabled: bool,
}

pub struct LegacyInputInputs {
    pub display: DisplayState,
    pub system_shutting_down: bool,
    pub call_state: CallState,
    pub music_playing: bool,
    pub doubletap_mode: TriggerPolicy,
    pub proximity_effective: CoverState,
}

pub fn rethink_bits(inputs: &LegacyInputInputs) -> LegacyInputBits {
    let kp_enabled = inputs.display.is_on_or_dim()
        && !inputs.system_shutting_down
        && (inputs.call_state == CallState::Active || inputs.music_playing);
    let ts_enabled = inputs.display.is_on_or_dim();
    let dt_enabled = inputs.display.is_off_like() || inputs.display.is_lpm();
    let dt_enabled = dt_enabled
        && match inputs.doubletap_mode {
            TriggerPolicy::Never => false,
            TriggerPolicy::Always => true,
            TriggerPolicy::ProximityAndLid => inputs.proximity_effective == CoverState::Open,
        };
    LegacyInputBits {
        kp_enabled,
        ts_enabled,
        // Forcing touchscreen on whenever double-tap is enabled is the
        // caller's job once it sees `dt_enabled`; the bit returned here
        // is double-tap's own enable state.
        dt_enabled,
    }
}

/// Writes the three computed bits to their discovered sysfs control
/// files. Each write independently no-ops if its control was never
/// discovered (§7 kind 4).
pub struct LegacyInputWriter {
    pub kp_ctl: SysfsControl,
    pub ts_ctl: SysfsControl,
    pub dt_ctl: SysfsControl,
}

impl LegacyInputWriter {
    pub fn apply(&mut self, bits: LegacyInputBits) {
        let _ = self.kp_ctl.write(if bits.kp_enabled { "0" } else { "1" });
        let _ = self.ts_ctl.write(if bits.ts_enabled { "0" } else { "1" });
        let _ = self.dt_ctl.write(if bits.dt_enabled { "1" } else { "0" });
        // Forcing touchscreen interrupts on whenever double-tap wake is
        // enabled, per §4.4.11.
        if bits.dt_enabled && !bits.ts_enabled {
            let _ = self.ts_ctl.write("0");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputGrab {
    Grab,
    Release,
}

/// Touch/keypad input grab decision, gated by the global input-policy
/// flag.
pub fn rethink_grab(
    display: DisplayState,
    proximity_effective: CoverState,
    proximity_blocks_touch: bool,
    input_policy_enabled: bool,
) -> InputGrab {
    if !input_policy_enabled {
        return InputGrab::Release;
    }
    let want_grab = !display.is_on_or_dim()
        || (proximity_blocks_touch && proximity_effective == CoverState::Closed);
    if want_grab {
        InputGrab::Grab
    } else {
        InputGrab::Release
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> LegacyInputInputs {
        LegacyInputInputs {
            display: DisplayState::On,
            system_shutting_down: false,
            call_state: CallState::None,
            music_playing: false,
            doubletap_mode: TriggerPolicy::Always,
            proximity_effective: CoverState::Open,
        }
    }

    #[test]
    fn kp_enabled_requires_call_or_music_and_on_dim() {
        let mut inputs = base();
        assert!(!rethink_bits(&inputs).kp_enabled);
        inputs.music_playing = true;
        assert!(rethink_bits(&inputs).kp_enabled);
        inputs.display = DisplayState::Off;
        assert!(!rethink_bits(&inputs).kp_enabled);
    }

    #[test]
    fn ts_enabled_follows_on_dim_only() {
        let mut inputs = base();
        assert!(rethink_bits(&inputs).ts_enabled);
        inputs.display = DisplayState::LpmOn;
        assert!(!rethink_bits(&inputs).ts_enabled);
    }

    #[test]
    fn dt_enabled_gated_by_policy_and_proximity() {
        let mut inputs = base();
        inputs.display = DisplayState::Off;
        inputs.doubletap_mode = TriggerPolicy::ProximityAndLid;
        inputs.proximity_effective = CoverState::Closed;
        assert!(!rethink_bits(&inputs).dt_enabled);
        inputs.proximity_effective = CoverState::Open;
        assert!(rethink_bits(&inputs).dt_enabled);
    }

    #[test]
    fn grab_released_when_policy_disabled() {
        assert_eq!(
            rethink_grab(DisplayState::Off, CoverState::Open, true, false),
            InputGrab::Release
        );
    }

    #[test]
    fn grab_engaged_while_display_off_or_proximity_closed() {
        assert_eq!(
            rethink_grab(DisplayState::Off, CoverState::Open, true, true),
            InputGrab::Grab
        );
        assert_eq!(
            rethink_grab(DisplayState::On, CoverState::Closed, true, true),
            InputGrab::Grab
        );
        assert_eq!(
            rethink_grab(DisplayState::On, CoverState::Open, true, true),
            InputGrab::Release
        );
    }
}
