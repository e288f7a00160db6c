//! Charging policy (C9, §4.6).
//!
//! A seven-step sequential evaluator writing into one state variable,
//! grounded on the teacher's `SafetySupervisor::evaluate` discipline
//! (sequential guarded conditions folding into a single state, with
//! before/after-transition logging rather than per-tick noise).

use log::info;

use crate::config::{ChargingMode, Settings};
use crate::datapipe::{BatteryStatus, ChargingState, UsbCableState};
use crate::sysfs::SysfsControl;

const BATTERY_FULL_LEVEL_PCT: u8 = 100;
const BATTERY_FLOOR_PCT: u8 = 5;

pub struct ChargingInputs {
    pub cable: UsbCableState,
    pub battery_status: BatteryStatus,
    pub battery_level_pct: u8,
}

/// Persistent evaluator state across calls (§4.6's "battery-full seen
/// since last reset" and "forced-charging override").
pub struct ChargingPolicy {
    battery_full_seen: bool,
    forced_charging: bool,
    current: ChargingState,
}

impl ChargingPolicy {
    pub fn new() -> Self {
        Self {
            battery_full_seen: false,
            forced_charging: false,
            current: ChargingState::Unknown,
        }
    }

    pub fn current(&self) -> ChargingState {
        self.current
    }

    pub fn is_forced(&self) -> bool {
        self.forced_charging
    }

    /// `forced_charging_request(state)` (§6.1). Returns `true` if this
    /// changed anything — R3: a duplicate request produces no second
    /// signal.
    pub fn set_forced(&mut self, enabled: bool) -> bool {
        if self.forced_charging == enabled {
            return false;
        }
        self.forced_charging = enabled;
        true
    }

    /// Run the seven-step evaluator (§4.6) and, if the resulting state
    /// flipped, write the configured literal to `ctl` and return
    /// `Some(new_state)` for the caller to broadcast.
    pub fn evaluate(
        &mut self,
        inputs: &ChargingInputs,
        settings: &Settings,
        ctl: &mut SysfsControl,
    ) -> Option<ChargingState> {
        // Step 1: cable disconnected short-circuits everything else.
        let mut result = if inputs.cable == UsbCableState::Disconnected {
            self.battery_full_seen = false;
            self.forced_charging = false;
            if settings.charging_mode == ChargingMode::Disable {
                ChargingState::Disabled
            } else {
                ChargingState::Enabled
            }
        } else {
            // Step 2.
            if inputs.battery_status == BatteryStatus::Full || inputs.battery_level_pct >= BATTERY_FULL_LEVEL_PCT {
                self.battery_full_seen = true;
            }

            // Steps 3-5.
            match settings.charging_mode {
                ChargingMode::Disable => ChargingState::Disabled,
                ChargingMode::Enable => ChargingState::Enabled,
                ChargingMode::Thresholds | ChargingMode::ThresholdsAfterFull => {
                    let gated = settings.charging_mode == ChargingMode::Thresholds || self.battery_full_seen;
                    if !gated {
                        self.current
                    } else {
                        let (enable_limit, disable_limit) =
                            if settings.charging_disable_limit_pct <= settings.charging_enable_limit_pct {
                                (settings.charging_enable_limit_pct, 100)
                            } else {
                                (settings.charging_enable_limit_pct, settings.charging_disable_limit_pct)
                            };
                        if inputs.battery_level_pct <= enable_limit {
                            ChargingState::Enabled
                        } else if inputs.battery_level_pct >= disable_limit {
                            ChargingState::Disabled
                        } else {
                            self.current
                        }
                    }
                }
            }
        };

        // Step 6: forced-charging override.
        if self.forced_charging {
            result = ChargingState::Enabled;
            if inputs.cable == UsbCableState::Disconnected || self.battery_full_seen {
                self.forced_charging = false;
            }
        }

        // Step 7: floor.
        if inputs.battery_level_pct < BATTERY_FLOOR_PCT {
            result = ChargingState::Enabled;
        }

        if result == self.current {
            return None;
        }
        self.current = result;
        info!("charging: transitioned to {:?}", result);
        let literal = match result {
            ChargingState::Enabled => "1",
            ChargingState::Disabled => "0",
            ChargingState::Unknown => return None,
        };
        let _ = ctl.write(literal);
        Some(result)
    }

    /// A control file discovered at all means charging suspension is
    /// possible (§4.6's "charging is suspendable" signal).
    pub fn is_suspendable(ctl: &SysfsControl) -> bool {
        ctl.is_available()
    }
}

impl Default for ChargingPolicy {
    fn default() -> Self {
        Self::new()
    }
}
