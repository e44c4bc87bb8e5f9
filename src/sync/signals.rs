//! Small atomic state primitives used throughout the scheduler.
//!
//! Grounded on `foundation_core::synca::signals` (`OnSignal`/`ActivitySignal`):
//! rather than reaching for a mutex to flip a couple of booleans, these types
//! encode state transitions directly as compare-exchange ops on an AtomicU8.

use std::sync::atomic::{AtomicU8, Ordering};

const UNSET: u8 = 0;
const SET: u8 = 1;

/// A single sticky boolean flag, flippable from any thread.
///
/// Used for the `Topology::cancelled` flag and for one-shot "has this node
/// run before" markers needed by conditional re-entry.
#[derive(Debug, Default)]
pub struct OnSignal {
    state: AtomicU8,
}

impl OnSignal {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNSET),
        }
    }

    /// Flips UNSET -> SET, returning whether this call was the one that did it.
    #[inline]
    pub fn turn_on(&self) -> bool {
        self.state
            .compare_exchange(UNSET, SET, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// Flips SET -> UNSET, returning whether this call was the one that did it.
    #[inline]
    pub fn turn_off(&self) -> bool {
        self.state
            .compare_exchange(SET, UNSET, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn probe(&self) -> bool {
        self.state.load(Ordering::Acquire) == SET
    }
}

/// Bit flags tracked on a `Node` across a topology run.
///
/// Kept as raw bit constants over an `AtomicU8` rather than pulling in a
/// dedicated bitflags dependency for a handful of flags.
pub mod node_state {
    pub const CONDITIONED: u8 = 1 << 0;
    pub const DETACHED: u8 = 1 << 1;
    pub const ACQUIRED: u8 = 1 << 2;
    pub const READY: u8 = 1 << 3;
    pub const DEFERRED: u8 = 1 << 4;
}

/// An atomic bitset with set/clear/probe on individual bits, used for
/// `Node::state`.
#[derive(Debug, Default)]
pub struct StateBits {
    bits: AtomicU8,
}

impl StateBits {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    #[inline]
    pub fn set(&self, mask: u8) {
        self.bits.fetch_or(mask, Ordering::SeqCst);
    }

    #[inline]
    pub fn clear(&self, mask: u8) {
        self.bits.fetch_and(!mask, Ordering::SeqCst);
    }

    #[inline]
    pub fn has(&self, mask: u8) -> bool {
        self.bits.load(Ordering::Acquire) & mask == mask
    }

    #[inline]
    pub fn snapshot(&self) -> u8 {
        self.bits.load(Ordering::Acquire)
    }

    /// Resets all bits to zero, used when a node is reset for re-entry.
    #[inline]
    pub fn reset(&self) {
        self.bits.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_signal_round_trips() {
        let sig = OnSignal::new();
        assert!(!sig.probe());
        assert!(sig.turn_on());
        assert!(sig.probe());
        assert!(!sig.turn_on());
        assert!(sig.turn_off());
        assert!(!sig.probe());
    }

    #[test]
    fn state_bits_set_clear() {
        let bits = StateBits::new();
        bits.set(node_state::READY);
        assert!(bits.has(node_state::READY));
        assert!(!bits.has(node_state::ACQUIRED));
        bits.set(node_state::ACQUIRED);
        assert!(bits.has(node_state::READY | node_state::ACQUIRED));
        bits.clear(node_state::READY);
        assert!(!bits.has(node_state::READY));
        assert!(bits.has(node_state::ACQUIRED));
    }
}
