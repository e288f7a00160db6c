//! Inbound observed bus signals (§6.3) — the subscription half of C4.
//!
//! [`BusClient`]/[`McuRequestIface`] cover outbound calls and inbound
//! method calls; this module is the third leg, signals this daemon only
//! *listens* to. Grounded on the same thin-adapter shape as
//! `bus::interface` (deserialize a wire message, call a domain method),
//! turned around: instead of serving a method call, [`parse_message`]
//! turns a received signal into an [`ObservedSignal`], which
//! [`crate::Daemon::apply_observed_signal`] then applies.
//!
//! The retrieval pack's `original_source/` held no files for this
//! system, so the interface/member names below are not lifted from a
//! source file; they reconstruct the historical Maemo/Sailfish peer
//! naming this codebase's own `com.nokia.mce.*` names already follow
//! (battery management entity, device lock daemon, call state daemon,
//! the system state controller, the compositor, usb-moded, and the
//! policy/audio daemon). See `DESIGN.md` for that assumption on record.

use log::debug;

use crate::audio::{AudioObserver, PolicyTuple};
use crate::bus::client::BusClient;
use crate::datapipe::{BatteryStatus, CallState, ChargerState, DevicelockState, SystemState, UsbCableState};
use crate::error::BusError;

pub const BME_IFACE: &str = "com.nokia.bme.signal";
pub const DEVICELOCK_IFACE: &str = "com.nokia.devicelock.signal";
pub const CSD_CALL_IFACE: &str = "com.nokia.csd.call";
pub const DSME_IFACE: &str = "com.nokia.dsme.signal";
pub const LIPSTICK_IFACE: &str = "com.nokia.lipstick";
pub const USB_MODED_IFACE: &str = "com.nokia.usb_moded";
pub const POLICY_IFACE: &str = "com.nokia.policy";

const MATCH_RULES: &[&str] = &[
    "type='signal',interface='com.nokia.bme.signal'",
    "type='signal',interface='com.nokia.devicelock.signal',member='stateChanged'",
    "type='signal',interface='com.nokia.csd.call',member='call_status'",
    "type='signal',interface='com.nokia.dsme.signal',member='state_change_ind'",
    "type='signal',interface='com.nokia.lipstick',member='interaction_expected'",
    "type='signal',interface='com.nokia.usb_moded',member='usb_connection_state_ind'",
    "type='signal',interface='com.nokia.policy',member='audio_actions'",
];

/// Register every match rule this daemon observes; call once at
/// startup, before the receive loop in `main.rs` starts reading.
pub fn subscribe(client: &BusClient) -> Result<(), BusError> {
    for rule in MATCH_RULES {
        client.add_match(rule)?;
    }
    Ok(())
}

/// A parsed inbound signal, ready for [`crate::Daemon::apply_observed_signal`].
#[derive(Debug, Clone)]
pub enum ObservedSignal {
    BatteryStatus(BatteryStatus),
    BatteryLevelPct(u8),
    Charger(ChargerState),
    UsbCable(UsbCableState),
    DevicelockState(DevicelockState),
    CallState(CallState),
    SystemState(SystemState),
    InteractionExpected(bool),
    AudioActions(Vec<PolicyTuple>),
}

/// Parse one received message into an [`ObservedSignal`], or `None` if
/// it's not a signal this daemon observes (method calls/returns,
/// errors, and signals on interfaces nothing here cares about).
pub fn parse_message(msg: &zbus::Message) -> Option<ObservedSignal> {
    let header = msg.header();
    if header.message_type() != zbus::message::Type::Signal {
        return None;
    }
    let iface = header.interface()?.to_string();
    let member = header.member()?.to_string();

    match (iface.as_str(), member.as_str()) {
        (BME_IFACE, "battery_full") => Some(ObservedSignal::BatteryStatus(BatteryStatus::Full)),
        (BME_IFACE, "battery_ok") => Some(ObservedSignal::BatteryStatus(BatteryStatus::Ok)),
        (BME_IFACE, "battery_low") => Some(ObservedSignal::BatteryStatus(BatteryStatus::Low)),
        (BME_IFACE, "battery_empty") => Some(ObservedSignal::BatteryStatus(BatteryStatus::Empty)),
        (BME_IFACE, "charger_connected") => Some(ObservedSignal::Charger(ChargerState::On)),
        (BME_IFACE, "charger_disconnected") => Some(ObservedSignal::Charger(ChargerState::Off)),
        (BME_IFACE, "battery_state_changed") => {
            let (now, max): (i32, i32) = msg.body().deserialize().ok()?;
            let pct = if max > 0 { (now.saturating_mul(100) / max).clamp(0, 100) } else { 0 };
            Some(ObservedSignal::BatteryLevelPct(pct as u8))
        }
        (DEVICELOCK_IFACE, "stateChanged") => {
            let state: String = msg.body().deserialize().ok()?;
            Some(ObservedSignal::DevicelockState(match state.as_str() {
                "locked" => DevicelockState::Locked,
                "unlocked" => DevicelockState::Unlocked,
                _ => DevicelockState::Undefined,
            }))
        }
        (CSD_CALL_IFACE, "call_status") => {
            let state: String = msg.body().deserialize().ok()?;
            Some(ObservedSignal::CallState(match state.as_str() {
                "ringing" => CallState::Ringing,
                "active" => CallState::Active,
                "none" | "idle" => CallState::None,
                _ => CallState::Invalid,
            }))
        }
        (DSME_IFACE, "state_change_ind") => {
            let state: String = msg.body().deserialize().ok()?;
            Some(ObservedSignal::SystemState(match state.as_str() {
                "USER" => SystemState::User,
                "ACTDEAD" => SystemState::ActDead,
                "SHUTDOWN" => SystemState::Shutdown,
                "REBOOT" => SystemState::Reboot,
                "BOOT" => SystemState::Boot,
                _ => SystemState::Undefined,
            }))
        }
        (LIPSTICK_IFACE, "interaction_expected") => {
            let expected: bool = msg.body().deserialize().ok()?;
            Some(ObservedSignal::InteractionExpected(expected))
        }
        (USB_MODED_IFACE, "usb_connection_state_ind") => {
            let state: String = msg.body().deserialize().ok()?;
            Some(ObservedSignal::UsbCable(match state.as_str() {
                "connected" => UsbCableState::Connected,
                "disconnected" => UsbCableState::Disconnected,
                "ask" | "ask-user" => UsbCableState::AskUser,
                _ => UsbCableState::Undefined,
            }))
        }
        (POLICY_IFACE, "audio_actions") => {
            let raw: Vec<(String, String, i64, String, String)> = msg.body().deserialize().ok()?;
            Some(ObservedSignal::AudioActions(AudioObserver::parse_policy_tuples(&raw)))
        }
        _ => {
            debug!("bus: ignoring unrecognized signal {iface}.{member}");
            None
        }
    }
}
