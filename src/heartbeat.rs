//! Heartbeat timer service (C2, §3.8/§4.2).
//!
//! Timers keep their deadline in monotonic-boot-time so they fire after
//! long suspends — the Linux analogue of the teacher's tick-counted
//! [`crate::` scheduler] (`scheduler.rs`'s `ScheduleEntry`), generalized
//! from "ticks elapsed since arm" to "wall-clock deadline", and from a
//! closure-per-schedule to a delegate callback (same reasoning as the
//! teacher's [`SchedulerDelegate`]: a timer that wants to re-arm itself
//! needs mutable access back into the dispatcher, which a captured
//! closure cannot safely hold while the dispatcher is mid-iteration).

use std::collections::HashMap;

use log::{debug, info};

/// Read the current monotonic-boot-time clock in milliseconds.
///
/// `CLOCK_BOOTTIME` includes time spent suspended, which is exactly the
/// property heartbeat timers need (§5: "Heartbeat timers (C2) are tied to
/// monotonic-boot-time so they fire across suspend").
#[cfg(target_os = "linux")]
pub fn now_boottime_ms() -> u64 {
    let ts = nix::time::clock_gettime(nix::time::ClockId::CLOCK_BOOTTIME)
        .expect("CLOCK_BOOTTIME must be available on Linux");
    ts.tv_sec() as u64 * 1000 + ts.tv_nsec() as u64 / 1_000_000
}

#[cfg(not(target_os = "linux"))]
pub fn now_boottime_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Receives fire notifications from [`HeartbeatDispatcher::dispatch`].
///
/// Implementations may call back into the dispatcher (`start`/`stop`/
/// `set_period`) to re-arm a one-shot timer for periodic behavior — this
/// is always safe because `dispatch` has already finished iterating its
/// own timer table by the time any delegate callback runs.
pub trait HeartbeatDelegate {
    fn on_heartbeat_fired(&mut self, name: &'static str, dispatcher: &mut HeartbeatDispatcher);
}

struct TimerEntry {
    period_ms: u64,
    next_deadline_ms: u64,
    active: bool,
    insertion_seq: u64,
}

/// The heartbeat timer dispatcher. Owns every registered timer in a
/// fixed-identity table keyed by name (§3.8: "a timer is either active
/// with a valid deadline or inactive").
pub struct HeartbeatDispatcher {
    timers: HashMap<&'static str, TimerEntry>,
    next_seq: u64,
}

impl Default for HeartbeatDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatDispatcher {
    pub fn new() -> Self {
        Self {
            timers: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Register a new timer, inactive until [`start`](Self::start) is
    /// called. Re-creating an existing name resets it.
    pub fn create(&mut self, name: &'static str, period_ms: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert(
            name,
            TimerEntry {
                period_ms,
                next_deadline_ms: 0,
                active: false,
                insertion_seq: seq,
            },
        );
    }

    pub fn set_period(&mut self, name: &'static str, period_ms: u64) {
        if let Some(t) = self.timers.get_mut(name) {
            t.period_ms = period_ms;
        }
    }

    /// Arm the timer: deadline = `now_ms` + its period.
    pub fn start(&mut self, name: &'static str, now_ms: u64) {
        if let Some(t) = self.timers.get_mut(name) {
            t.next_deadline_ms = now_ms + t.period_ms;
            t.active = true;
            debug!(
                "heartbeat '{}': armed, deadline={}ms",
                name, t.next_deadline_ms
            );
        }
    }

    /// Arm the timer with an explicit deadline (used by callers that have
    /// already computed an absolute boot-time deadline, e.g. the
    /// proximity-lock machine resuming after suspend).
    pub fn start_at(&mut self, name: &'static str, deadline_ms: u64) {
        if let Some(t) = self.timers.get_mut(name) {
            t.next_deadline_ms = deadline_ms;
            t.active = true;
        }
    }

    pub fn stop(&mut self, name: &'static str) {
        if let Some(t) = self.timers.get_mut(name) {
            t.active = false;
        }
    }

    pub fn delete(&mut self, name: &'static str) {
        self.timers.remove(name);
    }

    pub fn is_active(&self, name: &'static str) -> bool {
        self.timers.get(name).map(|t| t.active).unwrap_or(false)
    }

    /// Run one dispatch pass: every active timer whose deadline has
    /// passed fires exactly once (one-shot semantics — the timer goes
    /// inactive before its callback runs; the callback may re-arm it via
    /// `start`/`start_at`). Ordering among timers firing in the same pass
    /// is by deadline then insertion order (§4.2); this ordering is
    /// computed fresh each pass so it cannot drift across passes.
    pub fn dispatch(&mut self, now_ms: u64, delegate: &mut dyn HeartbeatDelegate) {
        let mut fired: Vec<(&'static str, u64, u64)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.active && t.next_deadline_ms <= now_ms)
            .map(|(name, t)| (*name, t.next_deadline_ms, t.insertion_seq))
            .collect();
        fired.sort_by_key(|(_, deadline, seq)| (*deadline, *seq));

        for (name, _, _) in fired {
            if let Some(t) = self.timers.get_mut(name) {
                t.active = false;
            }
            info!("heartbeat '{}': fired", name);
            delegate.on_heartbeat_fired(name, self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        fires: Vec<&'static str>,
    }

    impl HeartbeatDelegate for Recorder {
        fn on_heartbeat_fired(&mut self, name: &'static str, _d: &mut HeartbeatDispatcher) {
            self.fires.push(name);
        }
    }

    #[test]
    fn fires_once_when_deadline_passed() {
        let mut disp = HeartbeatDispatcher::new();
        disp.create("t1", 1_000);
        disp.start("t1", 0);

        let mut rec = Recorder { fires: vec![] };
        disp.dispatch(500, &mut rec);
        assert!(rec.fires.is_empty());

        disp.dispatch(1_000, &mut rec);
        assert_eq!(rec.fires, vec!["t1"]);
        assert!(!disp.is_active("t1"));

        // Does not fire again without re-arming.
        disp.dispatch(5_000, &mut rec);
        assert_eq!(rec.fires, vec!["t1"]);
    }

    #[test]
    fn callback_can_rearm_for_periodic_behavior() {
        let mut disp = HeartbeatDispatcher::new();
        disp.create("periodic", 100);
        disp.start("periodic", 0);

        struct Rearm;
        impl HeartbeatDelegate for Rearm {
            fn on_heartbeat_fired(&mut self, name: &'static str, d: &mut HeartbeatDispatcher) {
                d.start(name, 100);
            }
        }
        let mut rearm = Rearm;
        disp.dispatch(100, &mut rearm);
        assert!(disp.is_active("periodic"));
        disp.dispatch(199, &mut rearm);
        assert!(disp.is_active("periodic")); // not yet due again
        disp.dispatch(200, &mut rearm);
        assert!(disp.is_active("periodic"));
    }

    #[test]
    fn same_deadline_ties_break_by_insertion_order_and_are_stable() {
        let mut disp = HeartbeatDispatcher::new();
        disp.create("first", 10);
        disp.create("second", 10);
        disp.start("first", 0);
        disp.start("second", 0);

        let mut rec = Recorder { fires: vec![] };
        disp.dispatch(10, &mut rec);
        assert_eq!(rec.fires, vec!["first", "second"]);
    }

    #[test]
    fn stop_prevents_firing() {
        let mut disp = HeartbeatDispatcher::new();
        disp.create("t", 10);
        disp.start("t", 0);
        disp.stop("t");

        let mut rec = Recorder { fires: vec![] };
        disp.dispatch(100, &mut rec);
        assert!(rec.fires.is_empty());
    }

    #[test]
    fn deleted_timer_is_forgotten() {
        let mut disp = HeartbeatDispatcher::new();
        disp.create("t", 10);
        disp.start("t", 0);
        disp.delete("t");
        assert!(!disp.is_active("t"));
    }
}
