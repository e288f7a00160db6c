//! Bus client (C4, §3.7/§4.8/§6.1-6.3).
//!
//! [`client::BusClient`] is the thin synchronous wrapper over the wire
//! library; [`peer::PeerTracker`] is the pure peer name-owner state
//! machine. [`BusService`] glues the two together: it watches a fixed
//! set of service names, issues the owner/pid queries through the
//! client, and feeds the results back into the tracker.

pub mod client;
pub mod interface;
pub mod peer;
pub mod signals;

pub use client::BusClient;
pub use interface::McuRequestIface;
pub use peer::{PeerInfo, PeerTrackState, PeerTracker};

use log::warn;

/// Drives [`PeerTracker`] by issuing the actual D-Bus queries through a
/// [`BusClient`]. Split out from the tracker itself so the tracker stays
/// testable without a live connection (see `peer::tests`).
pub struct BusService {
    client: BusClient,
    tracker: PeerTracker,
}

impl BusService {
    pub fn new(client: BusClient, stop_grace_ms: u64) -> Self {
        Self {
            client,
            tracker: PeerTracker::new(stop_grace_ms),
        }
    }

    pub fn client(&self) -> &BusClient {
        &self.client
    }

    pub fn tracker(&self) -> &PeerTracker {
        &self.tracker
    }

    /// Begin watching a service name: issue an initial `GetNameOwner`
    /// query and drive the tracker's state from the result.
    pub fn watch(&mut self, service_name: &str) {
        self.tracker.watch(service_name);
        self.refresh_owner(service_name);
    }

    /// Re-query and update a peer's owner; call this on startup and
    /// whenever a `NameOwnerChanged` signal names this peer.
    pub fn refresh_owner(&mut self, service_name: &str) {
        let owner = self.client.get_name_owner(service_name);
        self.tracker.owner_changed(service_name, owner.clone());
        if let Some(owner) = owner {
            self.identify(service_name, &owner);
        }
    }

    fn identify(&mut self, service_name: &str, unique_name: &str) {
        let pid = self.client.get_connection_pid(unique_name);
        let uid = self.client.get_connection_uid(unique_name);
        match (pid, uid) {
            (Some(pid), Some(uid)) => {
                let cmdline = std::fs::read_to_string(format!("/proc/{pid}/cmdline"))
                    .unwrap_or_default()
                    .replace('\0', " ")
                    .trim()
                    .to_string();
                self.tracker
                    .identified(service_name, pid, uid, uid, cmdline);
            }
            _ => warn!(
                "bus: could not fully identify peer '{}' ({})",
                service_name, unique_name
            ),
        }
    }

    pub fn expire_stopped(&mut self, now_ms: u64) {
        self.tracker.expire_stopped(now_ms);
    }

    pub fn is_running(&self, service_name: &str) -> bool {
        self.tracker.is_running(service_name)
    }
}
