//! Double-tap gesture recalibration (§4.4.12).
//!
//! On enable, write `4` to the gesture sysfs and walk an escalating
//! retry schedule (2, 4, 8, 16, 30 s). After the schedule is exhausted,
//! recalibration switches to being driven purely by the heartbeat
//! dispatcher rather than its own one-shot timers (see DESIGN.md's
//! Open Question decisions). On disable, write `0`, stop both
//! schedules, and sleep one calibration-delay period.

use crate::heartbeat::HeartbeatDispatcher;
use crate::sysfs::SysfsControl;

pub const RETRY_TIMER: &str = "tklock.doubletap_retry";
pub const HEARTBEAT_TIMER: &str = "tklock.doubletap_heartbeat";

const RETRY_SCHEDULE_MS: [u64; 5] = [2_000, 4_000, 8_000, 16_000, 30_000];

pub struct DoubletapCalibration {
    ctl: SysfsControl,
    retry_index: usize,
    enabled: bool,
}

impl DoubletapCalibration {
    pub fn new(ctl: SysfsControl) -> Self {
        Self {
            ctl,
            retry_index: 0,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self, heartbeat: &mut HeartbeatDispatcher, now_ms: u64) {
        self.enabled = true;
        self.retry_index = 0;
        let _ = self.ctl.write("4");
        heartbeat.create(RETRY_TIMER, RETRY_SCHEDULE_MS[0]);
        heartbeat.start(RETRY_TIMER, now_ms);
    }

    /// Retry timer fired: rewrite `4` and re-arm with the next schedule
    /// entry, or switch to the heartbeat-driven phase once exhausted.
    pub fn on_retry_fired(&mut self, heartbeat: &mut HeartbeatDispatcher, now_ms: u64) {
        if !self.enabled {
            return;
        }
        let _ = self.ctl.write("4");
        self.retry_index += 1;
        if self.retry_index < RETRY_SCHEDULE_MS.len() {
            heartbeat.set_period(RETRY_TIMER, RETRY_SCHEDULE_MS[self.retry_index]);
            heartbeat.start(RETRY_TIMER, now_ms);
        } else {
            heartbeat.stop(RETRY_TIMER);
            heartbeat.create(HEARTBEAT_TIMER, RETRY_SCHEDULE_MS[RETRY_SCHEDULE_MS.len() - 1]);
            heartbeat.start(HEARTBEAT_TIMER, now_ms);
        }
    }

    /// The post-exhaustion periodic heartbeat fired: rewrite `4` and
    /// keep ticking forever.
    pub fn on_heartbeat_fired(&mut self, heartbeat: &mut HeartbeatDispatcher, now_ms: u64) {
        if !self.enabled {
            return;
        }
        let _ = self.ctl.write("4");
        heartbeat.start(HEARTBEAT_TIMER, now_ms);
    }

    pub fn disable(&mut self, heartbeat: &mut HeartbeatDispatcher) {
        self.enabled = false;
        let _ = self.ctl.write("0");
        heartbeat.stop(RETRY_TIMER);
        heartbeat.stop(HEARTBEAT_TIMER);
        // One calibration-delay period of quiet before the caller may
        // re-enable; expressed as the first schedule entry since the
        // spec names no separate constant for it.
        std::thread::sleep(std::time::Duration::from_millis(RETRY_SCHEDULE_MS[0]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctl(name: &str) -> (SysfsControl, PathBuf) {
        let path = std::env::temp_dir().join(format!("mce-dt-test-{}-{}", std::process::id(), name));
        std::fs::write(&path, "").unwrap();
        (SysfsControl::new("doubletap", vec![path.clone()]), path)
    }

    #[test]
    fn enable_writes_four_and_arms_first_retry() {
        let (c, path) = ctl("enable");
        let mut dt = DoubletapCalibration::new(c);
        let mut hb = HeartbeatDispatcher::new();
        dt.enable(&mut hb, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4");
        assert!(hb.is_active(RETRY_TIMER));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn retry_schedule_escalates_then_switches_to_heartbeat() {
        let (c, path) = ctl("escalate");
        let mut dt = DoubletapCalibration::new(c);
        let mut hb = HeartbeatDispatcher::new();
        dt.enable(&mut hb, 0);
        for _ in 0..RETRY_SCHEDULE_MS.len() {
            dt.on_retry_fired(&mut hb, 0);
        }
        assert!(!hb.is_active(RETRY_TIMER));
        assert!(hb.is_active(HEARTBEAT_TIMER));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn disable_writes_zero_and_stops_timers() {
        let (c, path) = ctl("disable");
        let mut dt = DoubletapCalibration::new(c);
        let mut hb = HeartbeatDispatcher::new();
        dt.enable(&mut hb, 0);
        dt.disable(&mut hb);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
        assert!(!hb.is_active(RETRY_TIMER));
        assert!(!dt.is_enabled());
        std::fs::remove_file(&path).ok();
    }
}
