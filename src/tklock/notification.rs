//! Notification slot table (§3.5, §4.4.13).
//!
//! Fixed-capacity array of 32 slots, indexed by integer rather than
//! shared ownership, per the "arena+index" discipline (spec §9 design
//! notes). Owner-name → slot-index lookups are a side map; an
//! owner-peer name-owner watch is reference-counted over the slots it
//! currently holds.

use std::collections::HashMap;

pub const MAX_SLOTS: usize = 32;
pub const LENGTH_MIN_MS: u64 = 1_000;
pub const LENGTH_MAX_MS: u64 = 30_000;
pub const RENEW_MIN_MS: u64 = 0;
pub const RENEW_MAX_MS: u64 = 5_000;

pub const AUTOSTOP_TIMER: &str = "tklock.notification_autostop";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    owner: String,
    name: String,
    until_ms: u64,
    renew_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Accepted,
    IgnoredZeroLength,
    TooMany,
}

pub struct NotificationTable {
    slots: [Option<Slot>; MAX_SLOTS],
    owner_refs: HashMap<String, u32>,
    /// Most recently requested linger, recorded after the last slot
    /// vacates (§3.5 "global `linger_tick`").
    last_linger_ms: u64,
}

impl NotificationTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            owner_refs: HashMap::new(),
            last_linger_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    pub fn last_linger_ms(&self) -> u64 {
        self.last_linger_ms
    }

    fn find_by_name(&self, owner: &str, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| {
            s.as_ref()
                .map(|s| s.owner == owner && s.name == name)
                .unwrap_or(false)
        })
    }

    fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    fn ref_owner(&mut self, owner: &str) {
        *self.owner_refs.entry(owner.to_string()).or_insert(0) += 1;
    }

    /// Returns `true` if this was the owner's last referencing slot and
    /// its name-owner watch should now be released.
    fn unref_owner(&mut self, owner: &str) -> bool {
        if let Some(count) = self.owner_refs.get_mut(owner) {
            *count -= 1;
            if *count == 0 {
                self.owner_refs.remove(owner);
                return true;
            }
        }
        false
    }

    /// `notification_begin(owner, name, length_ms, renew_ms)` (§4.4.13).
    /// Returns whether this is the first slot overall (caller should
    /// start the NOTIF exception) and the outcome.
    pub fn begin(
        &mut self,
        owner: &str,
        name: &str,
        length_ms: u64,
        renew_ms: i64,
        now_ms: u64,
    ) -> (BeginOutcome, bool) {
        if length_ms == 0 {
            return (BeginOutcome::IgnoredZeroLength, false);
        }
        let was_empty = self.is_empty();
        let length_ms = length_ms.clamp(LENGTH_MIN_MS, LENGTH_MAX_MS);
        let renew_ms = if renew_ms < 0 {
            RENEW_MIN_MS
        } else {
            (renew_ms as u64).clamp(RENEW_MIN_MS, RENEW_MAX_MS)
        };
        let slot = Slot {
            owner: owner.to_string(),
            name: name.to_string(),
            until_ms: now_ms + length_ms,
            renew_ms,
        };
        if let Some(idx) = self.find_by_name(owner, name) {
            self.slots[idx] = Some(slot);
            return (BeginOutcome::Accepted, was_empty);
        }
        let Some(idx) = self.first_free() else {
            return (BeginOutcome::TooMany, false);
        };
        self.ref_owner(owner);
        self.slots[idx] = Some(slot);
        (BeginOutcome::Accepted, was_empty)
    }

    /// `notification_end(owner, name, linger_ms)`. Returns `true` if
    /// this vacated the last slot (caller should end the NOTIF
    /// exception with `linger_ms`, recorded via [`last_linger_ms`]).
    pub fn end(&mut self, owner: &str, name: &str, linger_ms: u64) -> bool {
        let Some(idx) = self.find_by_name(owner, name) else {
            return false;
        };
        self.slots[idx] = None;
        self.unref_owner(owner);
        if self.is_empty() {
            self.last_linger_ms = linger_ms;
            true
        } else {
            false
        }
    }

    /// Touch activity extends every active slot by its own renew
    /// amount (§4.4.13, S2).
    pub fn extend_all_on_activity(&mut self, now_ms: u64) {
        for slot in self.slots.iter_mut().flatten() {
            if slot.renew_ms > 0 {
                slot.until_ms = slot.until_ms.max(now_ms + slot.renew_ms);
            }
        }
    }

    /// Drop expired slots. Returns `true` if this vacated the last
    /// slot.
    pub fn expire(&mut self, now_ms: u64, linger_ms: u64) -> bool {
        let mut any_removed = false;
        for slot in self.slots.iter_mut() {
            if let Some(s) = slot {
                if s.until_ms <= now_ms {
                    let owner = s.owner.clone();
                    *slot = None;
                    self.unref_owner(&owner);
                    any_removed = true;
                }
            }
        }
        if any_removed && self.is_empty() {
            self.last_linger_ms = linger_ms;
            true
        } else {
            false
        }
    }

    /// The earliest `until` among active slots, driving the autostop
    /// timer.
    pub fn soonest_until_ms(&self) -> Option<u64> {
        self.slots.iter().flatten().map(|s| s.until_ms).min()
    }

    /// Distinct owners currently holding at least one slot, for the
    /// periodic disconnect-liveness sweep (§3.5's per-owner monitor).
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.owner_refs.keys().map(String::as_str)
    }

    /// Remove every slot belonging to `owner` (its bus peer vanished).
    /// Returns `true` if this vacated the last slot.
    pub fn owner_gone(&mut self, owner: &str, linger_ms: u64) -> bool {
        let mut removed_any = false;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().map(|s| s.owner == owner).unwrap_or(false) {
                *slot = None;
                removed_any = true;
            }
        }
        if removed_any {
            self.owner_refs.remove(owner);
        }
        if removed_any && self.is_empty() {
            self.last_linger_ms = linger_ms;
            true
        } else {
            false
        }
    }

    /// I7: verifies no two slots share `{owner, name}`. Exposed for
    /// tests and debug assertions, not required on any hot path.
    pub fn no_duplicate_keys(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.slots
            .iter()
            .flatten()
            .all(|s| seen.insert((s.owner.clone(), s.name.clone())))
    }
}

impl Default for NotificationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b1_zero_length_ignored() {
        let mut t = NotificationTable::new();
        let (outcome, _) = t.begin("a", "n", 0, 1000, 0);
        assert_eq!(outcome, BeginOutcome::IgnoredZeroLength);
        assert!(t.is_empty());
    }

    #[test]
    fn b2_length_clamped_to_max() {
        let mut t = NotificationTable::new();
        t.begin("a", "n", 30_000_000, -1, 0);
        assert_eq!(t.soonest_until_ms(), Some(LENGTH_MAX_MS));
    }

    #[test]
    fn r2_begin_then_end_round_trips_to_empty() {
        let mut t = NotificationTable::new();
        t.begin("a", "n", 5_000, -1, 0);
        assert!(!t.is_empty());
        let was_last = t.end("a", "n", 0);
        assert!(was_last);
        assert!(t.is_empty());
    }

    #[test]
    fn matching_name_slot_is_replaced_not_duplicated() {
        let mut t = NotificationTable::new();
        t.begin("a", "n", 5_000, -1, 0);
        t.begin("a", "n", 7_000, -1, 0);
        assert!(t.no_duplicate_keys());
        assert_eq!(t.soonest_until_ms(), Some(7_000));
    }

    #[test]
    fn too_many_when_all_slots_full() {
        let mut t = NotificationTable::new();
        for i in 0..MAX_SLOTS {
            let (outcome, _) = t.begin("owner", &format!("n{i}"), 1_000, -1, 0);
            assert_eq!(outcome, BeginOutcome::Accepted);
        }
        let (outcome, _) = t.begin("owner", "overflow", 1_000, -1, 0);
        assert_eq!(outcome, BeginOutcome::TooMany);
    }

    #[test]
    fn scenario_s2_renew_on_touch_then_end_with_linger() {
        let mut t = NotificationTable::new();
        t.begin("A", "N", 10_000, 1_000, 0);
        t.extend_all_on_activity(5_000);
        assert!(t.soonest_until_ms().unwrap() >= 6_000);

        let was_last = t.end("A", "N", 2_000);
        assert!(was_last);
        assert_eq!(t.last_linger_ms(), 2_000);
        assert!(t.is_empty());
    }

    #[test]
    fn owner_gone_clears_all_its_slots() {
        let mut t = NotificationTable::new();
        t.begin("A", "one", 5_000, -1, 0);
        t.begin("A", "two", 5_000, -1, 0);
        t.begin("B", "three", 5_000, -1, 0);
        let was_last = t.owner_gone("A", 500);
        assert!(!was_last); // B's slot still active
        assert!(t.find_by_name("A", "one").is_none());
        assert!(t.find_by_name("B", "three").is_some());
    }
}
