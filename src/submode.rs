//! Submode register (C6, §2/§4.4.1).
//!
//! A bitmask of orthogonal modifier modes (tklock, bootup, transition,
//! malf, …) with change logged only on an actual flip — grounded on the
//! teacher's fault-bitmask accumulation in `safety.rs`
//! (`eval_fault`/`clear_fault`: evaluate every tick, log only the bits
//! that actually changed between before/after snapshots).

use bitflags::bitflags;
use log::info;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Submode: u16 {
        const TKLOCK     = 0b0000_0001;
        const BOOTUP     = 0b0000_0010;
        const TRANSITION = 0b0000_0100;
        const MALF       = 0b0000_1000;
        const NOAUTOLOCK = 0b0001_0000;
        const NOSLEEP    = 0b0010_0000;
        const POWER_UP   = 0b0100_0000;
    }
}

/// Holds the current submode mask and logs deltas.
pub struct SubmodeRegister {
    mask: Submode,
}

impl SubmodeRegister {
    pub fn new() -> Self {
        Self {
            mask: Submode::empty(),
        }
    }

    pub fn get(&self) -> Submode {
        self.mask
    }

    pub fn is_set(&self, bit: Submode) -> bool {
        self.mask.contains(bit)
    }

    /// Replace the mask wholesale, logging only the bits that actually
    /// changed (set and cleared separately, matching `safety.rs`'s
    /// before/after diagnostic style).
    pub fn set_mask(&mut self, new_mask: Submode) {
        if new_mask == self.mask {
            return;
        }
        let set = new_mask & !self.mask;
        let cleared = self.mask & !new_mask;
        if !set.is_empty() {
            info!("submode: set {:?}", set);
        }
        if !cleared.is_empty() {
            info!("submode: cleared {:?}", cleared);
        }
        self.mask = new_mask;
    }

    pub fn set_bit(&mut self, bit: Submode) {
        self.set_mask(self.mask | bit);
    }

    pub fn clear_bit(&mut self, bit: Submode) {
        self.set_mask(self.mask & !bit);
    }
}

impl Default for SubmodeRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bit_then_clear_round_trips() {
        let mut reg = SubmodeRegister::new();
        reg.set_bit(Submode::TKLOCK);
        assert!(reg.is_set(Submode::TKLOCK));
        reg.clear_bit(Submode::TKLOCK);
        assert!(!reg.is_set(Submode::TKLOCK));
    }

    #[test]
    fn setting_same_mask_is_a_no_op() {
        let mut reg = SubmodeRegister::new();
        reg.set_mask(Submode::MALF);
        reg.set_mask(Submode::MALF);
        assert_eq!(reg.get(), Submode::MALF);
    }

    #[test]
    fn independent_bits_compose() {
        let mut reg = SubmodeRegister::new();
        reg.set_bit(Submode::TKLOCK);
        reg.set_bit(Submode::BOOTUP);
        assert!(reg.is_set(Submode::TKLOCK));
        assert!(reg.is_set(Submode::BOOTUP));
        reg.clear_bit(Submode::TKLOCK);
        assert!(!reg.is_set(Submode::TKLOCK));
        assert!(reg.is_set(Submode::BOOTUP));
    }
}
