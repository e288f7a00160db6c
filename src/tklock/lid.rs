//! Lid-sensor pipeline with ALS filter (§4.4.6).
//!
//! Three lid sub-states (`Lo`, `Hi`, `Na`) derived from the last lux
//! reading vs. a configured threshold, and three independent "wait for"
//! timers gating close→blank and open→unblank. A persistent flag file
//! records whether this device's lid sensor has ever transitioned
//! closed→open; until it has, lid-close actions stay inhibited.

use std::path::{Path, PathBuf};

use crate::datapipe::{CoverState, DisplayState};
use crate::heartbeat::HeartbeatDispatcher;

pub const WAIT_FOR_CLOSE_TIMER: &str = "tklock.lid_wait_for_close";
pub const WAIT_FOR_DARK_TIMER: &str = "tklock.lid_wait_for_dark";
pub const WAIT_FOR_LIGHT_TIMER: &str = "tklock.lid_wait_for_light";

pub const WAIT_FOR_CLOSE_MS: u64 = 3_000;
pub const WAIT_FOR_DARK_MS: u64 = 1_200;
pub const WAIT_FOR_LIGHT_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlsLidState {
    Lo,
    Hi,
    Na,
}

impl AlsLidState {
    pub fn from_lux(lux: Option<u32>, threshold: u32) -> Self {
        match lux {
            None => AlsLidState::Na,
            Some(v) if v < threshold => AlsLidState::Lo,
            Some(_) => AlsLidState::Hi,
        }
    }
}

/// The persisted "has this lid ever been seen closed→open" flag.
pub struct LidSensorFlag {
    path: PathBuf,
    seen_closed_to_open: bool,
}

impl LidSensorFlag {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            seen_closed_to_open: path.exists(),
            path,
        }
    }

    pub fn has_been_seen(&self) -> bool {
        self.seen_closed_to_open
    }

    pub fn mark_seen(&mut self) {
        if !self.seen_closed_to_open {
            self.seen_closed_to_open = true;
            let _ = std::fs::File::create(&self.path);
        }
    }
}

pub struct LidPipeline {
    lid_state: CoverState,
    als_state: AlsLidState,
    wait_for_close_armed: bool,
    wait_for_dark_armed: bool,
    wait_for_light_armed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidAction {
    None,
    BlankNow,
    BlankAndTklock,
    Unblank,
    InvalidateLidData,
}

impl LidPipeline {
    pub fn new() -> Self {
        Self {
            lid_state: CoverState::Undefined,
            als_state: AlsLidState::Na,
            wait_for_close_armed: false,
            wait_for_dark_armed: false,
            wait_for_light_armed: false,
        }
    }

    pub fn lid_state(&self) -> CoverState {
        self.lid_state
    }

    /// ALS lux reading changed.
    pub fn on_als_changed(
        &mut self,
        lux: Option<u32>,
        threshold: u32,
        display: DisplayState,
        flag: &LidSensorFlag,
        heartbeat: &mut HeartbeatDispatcher,
        now_ms: u64,
    ) -> LidAction {
        let old = self.als_state;
        self.als_state = AlsLidState::from_lux(lux, threshold);

        if old != AlsLidState::Lo
            && self.als_state == AlsLidState::Lo
            && self.lid_state == CoverState::Open
            && display.is_on_or_dim()
        {
            heartbeat.create(WAIT_FOR_CLOSE_TIMER, WAIT_FOR_CLOSE_MS);
            heartbeat.start(WAIT_FOR_CLOSE_TIMER, now_ms);
            self.wait_for_close_armed = true;
        }

        if self.wait_for_dark_armed && self.als_state == AlsLidState::Lo {
            heartbeat.stop(WAIT_FOR_DARK_TIMER);
            self.wait_for_dark_armed = false;
            if flag.has_been_seen() {
                return LidAction::BlankAndTklock;
            }
        }

        if self.wait_for_light_armed && self.als_state == AlsLidState::Hi {
            heartbeat.stop(WAIT_FOR_LIGHT_TIMER);
            self.wait_for_light_armed = false;
            return LidAction::Unblank;
        }

        LidAction::None
    }

    /// The lid cover sensor reported a new state.
    pub fn on_lid_changed(
        &mut self,
        new_state: CoverState,
        flag: &mut LidSensorFlag,
        heartbeat: &mut HeartbeatDispatcher,
        now_ms: u64,
    ) -> LidAction {
        let old = self.lid_state;
        self.lid_state = new_state;

        if old == CoverState::Closed && new_state == CoverState::Open {
            flag.mark_seen();
        }

        match new_state {
            CoverState::Closed => {
                if self.wait_for_close_armed {
                    heartbeat.stop(WAIT_FOR_CLOSE_TIMER);
                    self.wait_for_close_armed = false;
                    return LidAction::BlankNow;
                }
                if !flag.has_been_seen() {
                    // §4.4.6: inhibited until a closed→open has ever been seen.
                    return LidAction::None;
                }
                if self.als_state != AlsLidState::Lo {
                    heartbeat.create(WAIT_FOR_DARK_TIMER, WAIT_FOR_DARK_MS);
                    heartbeat.start(WAIT_FOR_DARK_TIMER, now_ms);
                    self.wait_for_dark_armed = true;
                    LidAction::None
                } else {
                    LidAction::BlankAndTklock
                }
            }
            CoverState::Open => {
                heartbeat.create(WAIT_FOR_LIGHT_TIMER, WAIT_FOR_LIGHT_MS);
                heartbeat.start(WAIT_FOR_LIGHT_TIMER, now_ms);
                self.wait_for_light_armed = true;
                LidAction::None
            }
            CoverState::Undefined => LidAction::None,
        }
    }

    pub fn on_wait_for_close_timeout(&mut self) -> LidAction {
        self.wait_for_close_armed = false;
        LidAction::InvalidateLidData
    }

    pub fn on_wait_for_dark_timeout(&mut self) -> LidAction {
        self.wait_for_dark_armed = false;
        LidAction::None // lid close ignored; current display state kept
    }

    pub fn on_wait_for_light_timeout(&mut self) -> LidAction {
        self.wait_for_light_armed = false;
        LidAction::None // keep current display state
    }
}

impl Default for LidPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_flag_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mce-lid-flag-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn scenario_s4_als_becomes_low_before_wait_for_dark_fires() {
        let path = tmp_flag_path("s4a");
        std::fs::remove_file(&path).ok();
        let mut flag = LidSensorFlag::load(&path);
        flag.mark_seen();

        let mut lid = LidPipeline::new();
        let mut hb = HeartbeatDispatcher::new();
        lid.on_lid_changed(CoverState::Closed, &mut flag, &mut hb, 0);
        assert!(lid.wait_for_dark_armed);

        let action = lid.on_als_changed(Some(1), 3, DisplayState::Off, &flag, &mut hb, 800);
        assert_eq!(action, LidAction::BlankAndTklock);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn lid_close_inhibited_until_first_closed_to_open_seen() {
        let path = tmp_flag_path("inhibited");
        std::fs::remove_file(&path).ok();
        let mut flag = LidSensorFlag::load(&path);

        let mut lid = LidPipeline::new();
        let mut hb = HeartbeatDispatcher::new();
        let action = lid.on_lid_changed(CoverState::Closed, &mut flag, &mut hb, 0);
        assert_eq!(action, LidAction::None);
        assert!(!lid.wait_for_dark_armed);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn closed_to_open_marks_flag_seen() {
        let path = tmp_flag_path("marks-seen");
        std::fs::remove_file(&path).ok();
        let mut flag = LidSensorFlag::load(&path);
        assert!(!flag.has_been_seen());

        let mut lid = LidPipeline::new();
        let mut hb = HeartbeatDispatcher::new();
        lid.on_lid_changed(CoverState::Closed, &mut flag, &mut hb, 0);
        lid.on_lid_changed(CoverState::Open, &mut flag, &mut hb, 100);
        assert!(flag.has_been_seen());
        std::fs::remove_file(&path).ok();
    }
}
