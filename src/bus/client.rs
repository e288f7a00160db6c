//! Thin wrapper over a blocking D-Bus connection (§6.1-6.3).
//!
//! Grounded on the teacher's ports pattern (`app::ports::RpcPort`-style
//! trait boundary the domain depends on): the domain modules never touch
//! `zbus` directly, they call through [`BusClient`], keeping the wire
//! library swappable and the call sites testable without a live bus.

use zbus::blocking::Connection;
use zbus::zvariant::OwnedValue;
use zbus::Message;

use crate::error::BusError;

/// A connected system-bus client. All calls are synchronous from the
/// caller's point of view — per §5 ("no synchronous waits in the main
/// loop"), callers that cannot afford to block dispatch these through
/// the worker pool (C3) rather than calling methods here directly from
/// the main loop.
pub struct BusClient {
    conn: Connection,
}

impl BusClient {
    pub fn connect_system() -> Result<Self, BusError> {
        let conn = Connection::system().map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn request_name(&self, well_known_name: &str) -> Result<(), BusError> {
        self.conn
            .request_name(well_known_name)
            .map(|_| ())
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    pub fn inner(&self) -> &Connection {
        &self.conn
    }

    /// Generic method call; callers deserialize the reply body themselves.
    pub fn call_method(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        method: &str,
        body: &(impl serde::Serialize + zbus::zvariant::DynamicType),
    ) -> Result<Message, BusError> {
        self.conn
            .call_method(Some(destination), path, Some(interface), method, body)
            .map(|m| (*m).clone())
            .map_err(|e| BusError::CallFailed(e.to_string()))
    }

    /// `org.freedesktop.DBus.GetNameOwner`; `None` if the name currently
    /// has no owner.
    pub fn get_name_owner(&self, service_name: &str) -> Option<String> {
        self.call_method(
            "org.freedesktop.DBus",
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
            "GetNameOwner",
            &service_name,
        )
        .ok()
        .and_then(|m| m.body().deserialize::<String>().ok())
    }

    /// `org.freedesktop.DBus.NameHasOwner`; works for both well-known
    /// and unique bus names, so it doubles as a liveness probe for a
    /// specific peer's unique connection name (§3.5's owner-monitor).
    pub fn name_has_owner(&self, name: &str) -> bool {
        self.call_method(
            "org.freedesktop.DBus",
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
            "NameHasOwner",
            &name,
        )
        .ok()
        .and_then(|m| m.body().deserialize::<bool>().ok())
        .unwrap_or(false)
    }

    /// `org.freedesktop.DBus.GetConnectionUnixProcessID`.
    pub fn get_connection_pid(&self, unique_name: &str) -> Option<u32> {
        self.call_method(
            "org.freedesktop.DBus",
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
            "GetConnectionUnixProcessID",
            &unique_name,
        )
        .ok()
        .and_then(|m| m.body().deserialize::<u32>().ok())
    }

    pub fn get_connection_uid(&self, unique_name: &str) -> Option<u32> {
        self.call_method(
            "org.freedesktop.DBus",
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
            "GetConnectionUnixUser",
            &unique_name,
        )
        .ok()
        .and_then(|m| m.body().deserialize::<u32>().ok())
    }

    /// `org.freedesktop.DBus.AddMatch`; registers one match rule so the
    /// bus starts routing matching signals to this connection (§6.3).
    pub fn add_match(&self, rule: &str) -> Result<(), BusError> {
        self.call_method(
            "org.freedesktop.DBus",
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
            "AddMatch",
            &rule,
        )
        .map(|_| ())
    }

    /// A cloned handle to the underlying connection, for the
    /// signal-receive loop (`bus::signals`) to read raw messages from on
    /// its own thread — never from the main loop itself (§5). Cheap:
    /// `zbus::blocking::Connection` is an `Arc`-backed handle.
    pub fn clone_connection(&self) -> Connection {
        self.conn.clone()
    }

    /// Emit a signal on our own connection.
    pub fn emit_signal(
        &self,
        path: &str,
        interface: &str,
        signal: &str,
        body: &(impl serde::Serialize + zbus::zvariant::DynamicType),
    ) -> Result<(), BusError> {
        self.conn
            .emit_signal(None::<()>, path, interface, signal, body)
            .map_err(|e| BusError::Transport(e.to_string()))
    }
}

/// Helper for decoding the nested-array shape of the `audio_actions`
/// signal (§6.3) without pulling the full policy grammar into this
/// module.
pub fn decode_owned_value_as_i32(v: &OwnedValue) -> Option<i32> {
    i32::try_from(v.clone()).ok()
}
