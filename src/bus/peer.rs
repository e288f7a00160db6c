//! Per-peer name-owner tracking state machine (§3.7).
//!
//! Kept free of any actual D-Bus call so it can be driven and tested in
//! isolation; [`super::client::BusClient`] issues the real
//! `GetNameOwner`/`GetConnectionUnixProcessID` calls and feeds their
//! results back in through [`PeerTracker::owner_changed`] and
//! [`PeerTracker::identified`].

use std::collections::HashMap;

use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeerTrackState {
    #[default]
    Initial,
    QueryOwner,
    QueryPid,
    Identify,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct PeerInfo {
    pub service_name: String,
    pub name_owner: Option<String>,
    pub state: PeerTrackState,
    pub pid: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub cmdline: Option<String>,
    /// Monotonic tick at which this entry became `Stopped`; it is only
    /// dropped from the table after a grace period has elapsed (§3.7:
    /// "slot removed only after a stop grace").
    stopped_at_ms: Option<u64>,
}

impl PeerInfo {
    fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == PeerTrackState::Running
    }
}

/// Tracks name ownership for a fixed set of watched bus service names.
pub struct PeerTracker {
    peers: HashMap<String, PeerInfo>,
    stop_grace_ms: u64,
}

impl PeerTracker {
    pub fn new(stop_grace_ms: u64) -> Self {
        Self {
            peers: HashMap::new(),
            stop_grace_ms,
        }
    }

    /// Begin watching a service name; does nothing if already watched.
    pub fn watch(&mut self, service_name: &str) {
        self.peers
            .entry(service_name.to_string())
            .or_insert_with(|| PeerInfo::new(service_name));
    }

    pub fn info(&self, service_name: &str) -> Option<&PeerInfo> {
        self.peers.get(service_name)
    }

    /// A `NameOwnerChanged` signal (or the reply to an explicit
    /// `GetNameOwner` query) arrived for `service_name`.
    ///
    /// `new_owner = None` means the peer has no owner (gone, or never
    /// started). `Some(owner)` moves the tracker to `query-pid`; the
    /// caller is expected to follow up with `GetConnectionUnixProcessID`
    /// and call [`identified`](Self::identified) with the result.
    pub fn owner_changed(&mut self, service_name: &str, new_owner: Option<String>) {
        self.watch(service_name);
        let peer = self.peers.get_mut(service_name).unwrap();
        match new_owner {
            Some(owner) => {
                peer.name_owner = Some(owner);
                peer.state = PeerTrackState::QueryPid;
                debug!("peer '{}': owner acquired, querying pid", service_name);
            }
            None => {
                peer.name_owner = None;
                let was_running = peer.state == PeerTrackState::Running;
                peer.state = PeerTrackState::Stopped;
                peer.pid = None;
                peer.uid = None;
                peer.gid = None;
                peer.cmdline = None;
                if was_running {
                    info!("peer '{}': owner lost, now stopped", service_name);
                }
            }
        }
    }

    /// Identity query (pid/uid/gid/cmdline) completed; moves the peer to
    /// `running`.
    pub fn identified(&mut self, service_name: &str, pid: u32, uid: u32, gid: u32, cmdline: String) {
        if let Some(peer) = self.peers.get_mut(service_name) {
            peer.pid = Some(pid);
            peer.uid = Some(uid);
            peer.gid = Some(gid);
            peer.cmdline = Some(cmdline);
            peer.state = PeerTrackState::Running;
            info!("peer '{}': identified (pid={})", service_name, pid);
        }
    }

    /// Advance any `Stopped` peer's grace timer; peers whose grace has
    /// elapsed are dropped from the table entirely.
    pub fn expire_stopped(&mut self, now_ms: u64) {
        self.peers.retain(|name, peer| {
            if peer.state != PeerTrackState::Stopped {
                return true;
            }
            let stopped_at = *peer.stopped_at_ms.get_or_insert(now_ms);
            let keep = now_ms < stopped_at + self.stop_grace_ms;
            if !keep {
                debug!("peer '{}': stop grace elapsed, dropping", name);
            }
            keep
        });
    }

    pub fn is_running(&self, service_name: &str) -> bool {
        self.peers
            .get(service_name)
            .map(PeerInfo::is_running)
            .unwrap_or(false)
    }
}
