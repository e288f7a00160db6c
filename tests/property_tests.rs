//! Property tests for core invariants that are easy to get subtly wrong
//! under arbitrary input sequences.

use mce_core::charging::{ChargingInputs, ChargingPolicy};
use mce_core::config::Settings;
use mce_core::datapipe::{BatteryStatus, ChargingState, CoverState, UsbCableState};
use mce_core::sysfs::SysfsControl;
use mce_core::tklock::history::{ProximityHistory, HISTORY_LEN};
use mce_core::tklock::notification::{BeginOutcome, NotificationTable, MAX_SLOTS};
use proptest::prelude::*;

fn scratch_ctl(name: &str) -> (SysfsControl, std::path::PathBuf) {
    let path = std::env::temp_dir().join(format!(
        "mce-proptest-{}-{}-{}",
        std::process::id(),
        name,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ));
    std::fs::write(&path, "").unwrap();
    (SysfsControl::new("proptest", vec![path.clone()]), path)
}

#[derive(Debug, Clone)]
enum SlotOp {
    Begin(u8, u16),
    End(u8),
    Expire(u64),
}

fn arb_slot_op() -> impl Strategy<Value = SlotOp> {
    prop_oneof![
        (0u8..=40, 0u16..=40_000).prop_map(|(owner, len)| SlotOp::Begin(owner, len)),
        (0u8..=40).prop_map(SlotOp::End),
        (0u64..=40_000).prop_map(SlotOp::Expire),
    ]
}

proptest! {
    /// Arbitrary interleavings of begin/end/expire never push the table
    /// past its fixed capacity and never leave two slots sharing a key
    /// (I7).
    #[test]
    fn notification_table_never_overfills_or_duplicates(
        ops in proptest::collection::vec(arb_slot_op(), 1..=200),
    ) {
        let mut t = NotificationTable::new();
        let mut now = 0u64;
        for op in ops {
            match op {
                SlotOp::Begin(owner, len) => {
                    let (outcome, _) = t.begin(&format!("owner{owner}"), "n", len as u64, -1, now);
                    prop_assert!(matches!(
                        outcome,
                        BeginOutcome::Accepted | BeginOutcome::IgnoredZeroLength | BeginOutcome::TooMany
                    ));
                }
                SlotOp::End(owner) => {
                    t.end(&format!("owner{owner}"), "n", 0);
                }
                SlotOp::Expire(advance) => {
                    now += advance;
                    t.expire(now, 0);
                }
            }
            prop_assert!(t.no_duplicate_keys());
        }
        // Fill every slot with distinct keys and confirm the (MAX_SLOTS+1)th is rejected.
        let mut t2 = NotificationTable::new();
        for i in 0..MAX_SLOTS {
            let (outcome, _) = t2.begin("single-owner", &format!("n{i}"), 1_000, -1, 0);
            prop_assert_eq!(outcome, BeginOutcome::Accepted);
        }
        let (outcome, _) = t2.begin("single-owner", "overflow", 1_000, -1, 0);
        prop_assert_eq!(outcome, BeginOutcome::TooMany);
    }
}

#[derive(Debug, Clone, Copy)]
enum ChargeOp {
    Connect,
    Disconnect,
    Level(u8),
    Full,
}

fn arb_charge_op() -> impl Strategy<Value = ChargeOp> {
    prop_oneof![
        Just(ChargeOp::Connect),
        Just(ChargeOp::Disconnect),
        (0u8..=100).prop_map(ChargeOp::Level),
        Just(ChargeOp::Full),
    ]
}

proptest! {
    /// Whatever sequence of cable/level/full events arrives, the battery
    /// floor (I5) always wins: once level drops under 5%, the very next
    /// evaluation reports Enabled.
    #[test]
    fn charging_floor_always_forces_enabled(
        ops in proptest::collection::vec(arb_charge_op(), 1..=100),
    ) {
        let (mut ctl, path) = scratch_ctl("floor-prop");
        let mut policy = ChargingPolicy::new();
        let settings = Settings::default();
        let mut cable = UsbCableState::Connected;
        let mut level = 50u8;
        let mut status = BatteryStatus::Ok;

        for op in ops {
            match op {
                ChargeOp::Connect => cable = UsbCableState::Connected,
                ChargeOp::Disconnect => cable = UsbCableState::Disconnected,
                ChargeOp::Level(v) => { level = v; status = BatteryStatus::Ok; }
                ChargeOp::Full => { level = 100; status = BatteryStatus::Full; }
            }
            let inputs = ChargingInputs {
                cable,
                battery_status: status,
                battery_level_pct: level,
            };
            policy.evaluate(&inputs, &settings, &mut ctl);
            if level < 5 {
                // The floor (step 7) overrides every other step
                // unconditionally, cable state included.
                prop_assert_ne!(policy.current(), ChargingState::Disabled);
            }
        }
        std::fs::remove_file(&path).ok();
    }
}

proptest! {
    /// The ring never reports more samples than its fixed capacity no
    /// matter how many pushes it absorbs, and the oldest entry is always
    /// the one that would survive under pure FIFO eviction.
    #[test]
    fn proximity_history_ring_bounded(
        pushes in proptest::collection::vec(any::<bool>(), 0..=500),
    ) {
        let mut h = ProximityHistory::new();
        for (i, open) in pushes.iter().enumerate() {
            let state = if *open { CoverState::Open } else { CoverState::Closed };
            h.push(i as u64, state);
        }
        let samples: Vec<_> = h.iter_chronological().collect();
        prop_assert!(samples.len() <= HISTORY_LEN);
        if pushes.len() >= HISTORY_LEN {
            let expected_oldest = (pushes.len() - HISTORY_LEN) as u64;
            prop_assert_eq!(samples.first().unwrap().tick_ms, expected_oldest);
        }
    }
}

proptest! {
    /// Settings::validate always leaves every clamped field inside its
    /// documented range, regardless of the out-of-range input.
    #[test]
    fn settings_validate_always_clamps_into_range(
        autolock_delay in 0u32..=10_000_000,
        enable_pct in 0u8..=100,
        disable_pct in 0u8..=100,
    ) {
        let mut s = Settings::default();
        s.autolock_delay_ms = autolock_delay;
        s.charging_enable_limit_pct = enable_pct;
        s.charging_disable_limit_pct = disable_pct;
        s.validate();

        prop_assert!(s.autolock_delay_ms >= mce_core::config::AUTOLOCK_DELAY_MIN_MS);
        prop_assert!(s.autolock_delay_ms <= mce_core::config::AUTOLOCK_DELAY_MAX_MS);
        // Falls back to 100 whenever disable wasn't already strictly
        // above enable; when enable itself is 100 the fallback still
        // only ties it, so >= rather than > is the real invariant.
        prop_assert!(s.charging_disable_limit_pct >= s.charging_enable_limit_pct);
    }
}
