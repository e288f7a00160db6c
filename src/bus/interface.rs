//! The served bus interface (§6.1/§6.2) — the inbound half of C4.
//!
//! [`BusClient`] (this module's sibling) is the outbound half: requests
//! and signals *we* send. This struct is what a peer like the
//! compositor or an application calls *into* us through. Grounded on
//! the teacher's ports-trait boundary idea, turned inside-out: instead
//! of a trait the domain depends on, this is a thin adapter the domain
//! is called through — every method here does nothing but translate a
//! D-Bus call into a lock + a call on [`crate::Daemon`] and translate
//! the result back into a wire reply, exactly the shape of the
//! teacher's `RpcPort` adapters in `rpc/`.
//!
//! Real names (`com.nokia.mce.request`, `/com/nokia/mce/request`,
//! `com.nokia.mce.signal`) are the well-known interface this spec's
//! system (mce) has always served under; a distillation that invented
//! fresh names here would not be a generalization, it would be noise.

use std::sync::{Arc, Mutex};

use zbus::interface;

use crate::Daemon;

pub const SERVICE_NAME: &str = "com.nokia.mce";
pub const REQUEST_PATH: &str = "/com/nokia/mce/request";
pub const REQUEST_IFACE: &str = "com.nokia.mce.request";
pub const SIGNAL_PATH: &str = "/com/nokia/mce/signal";
pub const SIGNAL_IFACE: &str = "com.nokia.mce.signal";

/// Shared handle to the single daemon instance. The object server
/// dispatches interface methods from its own task; every method here
/// takes the lock for the short, non-blocking duration of one state
/// machine call and releases it before returning, so the "single
/// thread touches the state machines" discipline (§5) holds in
/// practice even though the lock itself is, mechanically, available
/// from more than one OS thread.
#[derive(Clone)]
pub struct McuRequestIface {
    daemon: Arc<Mutex<Daemon>>,
}

impl McuRequestIface {
    pub fn new(daemon: Arc<Mutex<Daemon>>) -> Self {
        Self { daemon }
    }
}

#[interface(name = "com.nokia.mce.request")]
impl McuRequestIface {
    /// `tklock_mode_get` (§6.1).
    fn tklock_mode_get(&self) -> String {
        self.daemon.lock().unwrap().tklock_mode_get()
    }

    /// `tklock_mode_change(mode_name)` (§6.1). Unknown mode names are a
    /// parse failure and become a bus error, per §7 kind 3 ("explicit
    /// parse/semantic failures" get a well-formed error reply).
    fn tklock_mode_change(&self, mode_name: String) -> zbus::fdo::Result<()> {
        self.daemon
            .lock()
            .unwrap()
            .tklock_mode_change(&mode_name)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(e))
    }

    /// `tklock_callback(value)` from the compositor (§6.1): encodes
    /// UNLOCK/CLOSED.
    fn tklock_callback(&self, value: i32) {
        self.daemon.lock().unwrap().tklock_callback(value);
    }

    /// Slot ownership (§3.5) is keyed by the *caller's* unique bus
    /// name, not anything the caller supplies on the wire — §6.1's
    /// signature carries no owner argument, so it is read off the
    /// method call's own header instead.
    fn notification_begin(
        &self,
        #[zbus(header)] header: zbus::message::Header<'_>,
        name: String,
        duration_ms: u64,
        activity_extend_ms: i64,
    ) {
        let owner = header.sender().map(|s| s.to_string()).unwrap_or_else(|| "unknown-owner".into());
        self.daemon
            .lock()
            .unwrap()
            .notification_begin(&owner, &name, duration_ms, activity_extend_ms);
    }

    fn notification_end(
        &self,
        #[zbus(header)] header: zbus::message::Header<'_>,
        name: String,
        linger_ms: u64,
    ) {
        let owner = header.sender().map(|s| s.to_string()).unwrap_or_else(|| "unknown-owner".into());
        self.daemon
            .lock()
            .unwrap()
            .notification_end(&owner, &name, linger_ms);
    }

    fn blanking_policy_get(&self) -> String {
        self.daemon.lock().unwrap().blanking_policy_get()
    }

    fn keyboard_slide_state_get(&self) -> String {
        self.daemon.lock().unwrap().keyboard_slide_state_get()
    }

    fn keyboard_available_state_get(&self) -> bool {
        self.daemon.lock().unwrap().keyboard_available
    }

    fn mouse_available_state_get(&self) -> bool {
        self.daemon.lock().unwrap().mouse_available
    }

    fn inactivity_status_get(&self) -> bool {
        self.daemon.lock().unwrap().inactivity_status_get()
    }

    fn charging_state_get(&self) -> String {
        self.daemon.lock().unwrap().charging_state_get()
    }

    fn forced_charging_get(&self) -> bool {
        self.daemon.lock().unwrap().forced_charging
    }

    fn charging_suspendable_get(&self) -> bool {
        self.daemon.lock().unwrap().charging_suspendable
    }

    /// `forced_charging_request(state)` (§6.1). Invalid values return
    /// `org.freedesktop.DBus.Error.InvalidArgs` verbatim, per spec.
    fn forced_charging_request(&self, state: String) -> zbus::fdo::Result<()> {
        let enabled = match state.as_str() {
            "enabled" => true,
            "disabled" => false,
            other => {
                return Err(zbus::fdo::Error::InvalidArgs(format!(
                    "forced_charging_request: invalid state '{other}'"
                )))
            }
        };
        self.daemon.lock().unwrap().forced_charging_request(enabled);
        Ok(())
    }

    fn add_activity_callback(
        &self,
        service: String,
        path: String,
        interface: String,
        method: String,
    ) -> bool {
        self.daemon
            .lock()
            .unwrap()
            .inactivity
            .register_action(crate::inactivity::ActivityAction {
                service,
                path,
                interface,
                method,
            })
    }

    fn remove_activity_callback(&self, service: String, path: String, interface: String, method: String) {
        self.daemon
            .lock()
            .unwrap()
            .inactivity
            .unregister_action(&service, &path, &interface, &method);
    }
}
