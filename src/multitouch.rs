//! Multitouch decoder (C5, §4.9).
//!
//! Normalizes raw evdev events — protocol A (`SYN_MT_REPORT`), protocol B
//! (`ABS_MT_SLOT`), and a mouse fallback for the SDK — into finger-count
//! changes, a primary touch point, and single/double-tap events.
//!
//! Grounded on the teacher's lock-free ring buffer discipline in
//! `events.rs` (fixed-capacity queue, head/tail bookkeeping, no
//! allocation on the hot path) applied here to the tap-history ring
//! (§3.4-shaped: fixed size, oldest entries fall off) and the fixed
//! `MAX_SLOTS`-sized contact table.

use std::collections::VecDeque;

/// Raw evdev-shaped input, already decoded from `struct input_event` by
/// the (out-of-scope) evdev reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// `ABS_MT_SLOT`: protocol B slot selector.
    MtSlot(usize),
    /// `ABS_MT_TRACKING_ID`: -1 ends the currently selected slot.
    MtTrackingId(i32),
    /// `ABS_MT_POSITION_X` (protocol B, current slot) or the
    /// in-progress protocol-A contact.
    MtPositionX(i32),
    MtPositionY(i32),
    /// `SYN_MT_REPORT`: commit the in-progress protocol-A contact.
    SynMtReport,
    /// `SYN_REPORT`: commit the current frame.
    SynReport,
    BtnMouse(bool),
    RelX(i32),
    RelY(i32),
}

/// Decoded multitouch events the rest of the core subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultitouchEvent {
    FingerCountChanged(usize),
    PrimaryPoint { x: i32, y: i32 },
    SingleTap,
    DoubleTap,
}

pub const MAX_SLOTS: usize = 16;
const TAP_HISTORY_LEN: usize = 3;
const TAP_MAX_DISTANCE_PX: i64 = 100;
const TAP_MIN_DURATION_MS: u64 = 1;
const TAP_MAX_DURATION_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    active: bool,
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, Copy)]
struct TapRecord {
    press: (i32, i32, u64),
    release: (i32, i32, u64),
    consumed: bool,
}

fn distance_sq(a: (i32, i32), b: (i32, i32)) -> i64 {
    let dx = (a.0 - b.0) as i64;
    let dy = (a.1 - b.1) as i64;
    dx * dx + dy * dy
}

/// Decoder state. One instance per input device.
pub struct Decoder {
    slots: [Slot; MAX_SLOTS],
    current_slot: usize,
    protocol_a_accum: Vec<(i32, i32)>,
    protocol_a_pending_x: Option<i32>,
    protocol_a_pending_y: Option<i32>,
    mouse_down: bool,
    mouse_pos: (i32, i32),
    finger_count: usize,
    press_started_at: Option<(i32, i32, u64)>,
    tap_history: VecDeque<TapRecord>,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            slots: [Slot::default(); MAX_SLOTS],
            current_slot: 0,
            protocol_a_accum: Vec::new(),
            protocol_a_pending_x: None,
            protocol_a_pending_y: None,
            mouse_down: false,
            mouse_pos: (0, 0),
            finger_count: 0,
            press_started_at: None,
            tap_history: VecDeque::with_capacity(TAP_HISTORY_LEN),
        }
    }

    pub fn finger_count(&self) -> usize {
        self.finger_count
    }

    /// Feed one raw evdev event; returns any decoded multitouch events
    /// produced as a result (usually empty until the terminating
    /// `SYN_REPORT`).
    pub fn handle_event(&mut self, ev: InputEvent, now_ms: u64) -> Vec<MultitouchEvent> {
        match ev {
            InputEvent::MtSlot(n) => {
                self.current_slot = n.min(MAX_SLOTS - 1);
                Vec::new()
            }
            InputEvent::MtTrackingId(id) => {
                if id < 0 {
                    self.slots[self.current_slot] = Slot::default();
                } else {
                    self.slots[self.current_slot].active = true;
                }
                Vec::new()
            }
            InputEvent::MtPositionX(x) => {
                if self.slots[self.current_slot].active {
                    self.slots[self.current_slot].x = x;
                } else {
                    self.protocol_a_pending_x = Some(x);
                }
                Vec::new()
            }
            InputEvent::MtPositionY(y) => {
                if self.slots[self.current_slot].active {
                    self.slots[self.current_slot].y = y;
                } else {
                    self.protocol_a_pending_y = Some(y);
                }
                Vec::new()
            }
            InputEvent::SynMtReport => {
                if let (Some(x), Some(y)) =
                    (self.protocol_a_pending_x.take(), self.protocol_a_pending_y.take())
                {
                    self.protocol_a_accum.push((x, y));
                }
                Vec::new()
            }
            InputEvent::BtnMouse(down) => {
                self.mouse_down = down;
                Vec::new()
            }
            InputEvent::RelX(dx) => {
                self.mouse_pos.0 += dx;
                Vec::new()
            }
            InputEvent::RelY(dy) => {
                self.mouse_pos.1 += dy;
                Vec::new()
            }
            InputEvent::SynReport => self.commit_frame(now_ms),
        }
    }

    fn commit_frame(&mut self, now_ms: u64) -> Vec<MultitouchEvent> {
        let mut out = Vec::new();

        let (new_count, primary) = if !self.protocol_a_accum.is_empty() || self.uses_protocol_a() {
            let count = self.protocol_a_accum.len();
            let primary = self.protocol_a_accum.first().copied();
            self.protocol_a_accum.clear();
            (count, primary)
        } else if self.slots.iter().any(|s| s.active) {
            let count = self.slots.iter().filter(|s| s.active).count();
            let primary = self.slots.iter().find(|s| s.active).map(|s| (s.x, s.y));
            (count, primary)
        } else if self.mouse_down {
            (1, Some(self.mouse_pos))
        } else {
            (0, None)
        };

        if new_count != self.finger_count {
            out.push(MultitouchEvent::FingerCountChanged(new_count));
            self.track_tap_transition(self.finger_count, new_count, primary, now_ms, &mut out);
            self.finger_count = new_count;
        }

        if let Some((x, y)) = primary {
            out.push(MultitouchEvent::PrimaryPoint { x, y });
        }

        out
    }

    /// Protocol-A frames without active protocol-B slots and without
    /// any accumulated contacts this frame still count as "using
    /// protocol A" once any `ABS_MT_SLOT` event has ever been seen for
    /// protocol B — approximated here by "no slot is active".
    fn uses_protocol_a(&self) -> bool {
        self.slots.iter().all(|s| !s.active)
    }

    fn track_tap_transition(
        &mut self,
        old_count: usize,
        new_count: usize,
        primary: Option<(i32, i32)>,
        now_ms: u64,
        out: &mut Vec<MultitouchEvent>,
    ) {
        if old_count == 0 && new_count == 1 {
            if let Some((x, y)) = primary {
                self.press_started_at = Some((x, y, now_ms));
            }
        } else if old_count == 1 && new_count == 0 {
            if let Some((px, py, press_ms)) = self.press_started_at.take() {
                let (rx, ry) = primary.unwrap_or((px, py));
                let duration = now_ms.saturating_sub(press_ms);
                let moved_sq = distance_sq((px, py), (rx, ry));
                if duration >= TAP_MIN_DURATION_MS
                    && duration <= TAP_MAX_DURATION_MS
                    && moved_sq <= TAP_MAX_DISTANCE_PX * TAP_MAX_DISTANCE_PX
                {
                    out.push(MultitouchEvent::SingleTap);
                    self.record_tap_and_check_double(
                        TapRecord {
                            press: (px, py, press_ms),
                            release: (rx, ry, now_ms),
                            consumed: false,
                        },
                        out,
                    );
                }
            }
        } else {
            // Multi-finger transitions break any in-progress single tap.
            self.press_started_at = None;
        }
    }

    fn record_tap_and_check_double(&mut self, tap: TapRecord, out: &mut Vec<MultitouchEvent>) {
        let forms_double = if let Some(prev) = self.tap_history.back() {
            let gap = tap.press.2.saturating_sub(prev.release.2);
            let dist_sq = distance_sq(
                (prev.release.0, prev.release.1),
                (tap.press.0, tap.press.1),
            );
            !prev.consumed
                && gap >= TAP_MIN_DURATION_MS
                && gap <= TAP_MAX_DURATION_MS
                && dist_sq <= TAP_MAX_DISTANCE_PX * TAP_MAX_DISTANCE_PX
        } else {
            false
        };

        let mut tap = tap;
        if forms_double {
            if let Some(prev) = self.tap_history.back_mut() {
                prev.consumed = true;
            }
            tap.consumed = true;
            out.push(MultitouchEvent::DoubleTap);
        }

        if self.tap_history.len() == TAP_HISTORY_LEN {
            self.tap_history.pop_front();
        }
        self.tap_history.push_back(tap);
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap(d: &mut Decoder, x: i32, y: i32, press_ms: u64, release_ms: u64) -> Vec<MultitouchEvent> {
        let mut events = Vec::new();
        events.extend(d.handle_event(InputEvent::MtSlot(0), press_ms));
        events.extend(d.handle_event(InputEvent::MtTrackingId(1), press_ms));
        events.extend(d.handle_event(InputEvent::MtPositionX(x), press_ms));
        events.extend(d.handle_event(InputEvent::MtPositionY(y), press_ms));
        events.extend(d.handle_event(InputEvent::SynReport, press_ms));

        events.extend(d.handle_event(InputEvent::MtTrackingId(-1), release_ms));
        events.extend(d.handle_event(InputEvent::SynReport, release_ms));
        events
    }

    #[test]
    fn single_tap_detected_within_bounds() {
        let mut d = Decoder::new();
        let events = tap(&mut d, 100, 100, 0, 120);
        assert!(events.contains(&MultitouchEvent::SingleTap));
        assert!(!events.contains(&MultitouchEvent::DoubleTap));
    }

    #[test]
    fn scenario_s5_double_tap_then_no_chained_second_double() {
        let mut d = Decoder::new();
        let e1 = tap(&mut d, 100, 100, 0, 120);
        assert!(e1.contains(&MultitouchEvent::SingleTap));

        let e2 = tap(&mut d, 112, 102, 280, 400);
        assert!(e2.contains(&MultitouchEvent::SingleTap));
        assert!(e2.contains(&MultitouchEvent::DoubleTap));

        let e3 = tap(&mut d, 115, 105, 500, 600);
        assert!(e3.contains(&MultitouchEvent::SingleTap));
        assert!(!e3.contains(&MultitouchEvent::DoubleTap));
    }

    #[test]
    fn tap_too_long_is_not_a_tap() {
        let mut d = Decoder::new();
        let events = tap(&mut d, 100, 100, 0, 5_000);
        assert!(!events.contains(&MultitouchEvent::SingleTap));
    }

    #[test]
    fn tap_that_moved_too_far_is_not_a_tap() {
        let mut d = Decoder::new();
        let events = tap(&mut d, 100, 100, 0, 50);
        // release moved implicitly via second tap() call below
        let _ = events;
        let mut d2 = Decoder::new();
        d2.handle_event(InputEvent::MtSlot(0), 0);
        d2.handle_event(InputEvent::MtTrackingId(1), 0);
        d2.handle_event(InputEvent::MtPositionX(0), 0);
        d2.handle_event(InputEvent::MtPositionY(0), 0);
        d2.handle_event(InputEvent::SynReport, 0);
        d2.handle_event(InputEvent::MtPositionX(500), 50);
        d2.handle_event(InputEvent::MtPositionY(500), 50);
        // moving requires an active slot; simulate by marking active first
        d2.slots[0].active = true;
        d2.handle_event(InputEvent::MtPositionX(500), 50);
        d2.handle_event(InputEvent::MtPositionY(500), 50);
        let final_events = d2.handle_event(InputEvent::MtTrackingId(-1), 60);
        let synced = d2.handle_event(InputEvent::SynReport, 60);
        assert!(!final_events.contains(&MultitouchEvent::SingleTap));
        assert!(!synced.contains(&MultitouchEvent::SingleTap));
    }

    #[test]
    fn finger_count_change_is_reported() {
        let mut d = Decoder::new();
        let events = d.handle_event(InputEvent::MtSlot(0), 0);
        assert!(events.is_empty());
        d.handle_event(InputEvent::MtTrackingId(1), 0);
        d.handle_event(InputEvent::MtPositionX(10), 0);
        d.handle_event(InputEvent::MtPositionY(10), 0);
        let events = d.handle_event(InputEvent::SynReport, 0);
        assert!(events.contains(&MultitouchEvent::FingerCountChanged(1)));
    }

    #[test]
    fn mouse_fallback_produces_single_finger_tap() {
        let mut d = Decoder::new();
        d.handle_event(InputEvent::BtnMouse(true), 0);
        let events = d.handle_event(InputEvent::SynReport, 0);
        assert!(events.contains(&MultitouchEvent::FingerCountChanged(1)));
        d.handle_event(InputEvent::BtnMouse(false), 100);
        let events = d.handle_event(InputEvent::SynReport, 100);
        assert!(events.contains(&MultitouchEvent::SingleTap));
    }
}
