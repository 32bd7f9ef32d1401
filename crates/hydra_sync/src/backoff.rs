//! # Backoff Spinner
//!
//! Shared waiting strategy for every spin loop in the engine.
//!
//! Early iterations burn a short, doubling run of pause instructions; once
//! the loop has clearly lost the race it yields the core to the scheduler
//! instead. This keeps short contention cheap without starving other
//! threads under long contention.

/// Exponential backoff for spin-wait loops.
///
/// Each call to [`spin`](Backoff::spin) waits progressively more passively:
///
/// - calls `0..31`: a busy run of `1 << min(n, 7)` pause hints, so at most
///   128 pauses per call;
/// - every call from the 31st on: a scheduler yield, permanently.
///
/// State is per-instance. Construct a fresh `Backoff` for every independent
/// wait loop; never share one across loops.
///
/// ## Example
///
/// ```rust,ignore
/// let mut backoff = Backoff::new();
/// while !try_acquire() {
///     backoff.spin();
/// }
/// ```
#[derive(Debug, Default)]
pub struct Backoff {
    counter: u8,
}

impl Backoff {
    /// Spin count at which the spinner stops busy-waiting and starts
    /// yielding to the scheduler.
    pub const YIELD_THRESHOLD: u8 = 31;

    /// Cap on the doubling exponent: at most `1 << 7` pauses per call.
    pub const MAX_EXPONENT: u8 = 7;

    /// Creates a fresh spinner with zero accumulated backoff.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { counter: 0 }
    }

    /// Performs one unit of progressively more passive waiting.
    #[inline]
    pub fn spin(&mut self) {
        if self.counter >= Self::YIELD_THRESHOLD {
            std::thread::yield_now();
        } else {
            let exponent = self.counter.min(Self::MAX_EXPONENT);
            for _ in 0..(1u32 << exponent) {
                core::hint::spin_loop();
            }
            self.counter += 1;
        }
    }

    /// Returns whether the spinner has crossed into the yielding regime.
    #[inline]
    #[must_use]
    pub const fn is_yielding(&self) -> bool {
        self.counter >= Self::YIELD_THRESHOLD
    }

    /// Returns the busy-wait pause count the next [`spin`](Backoff::spin)
    /// call would issue, or 0 once the spinner only yields.
    #[inline]
    #[must_use]
    pub const fn pause_count(&self) -> u32 {
        if self.counter >= Self::YIELD_THRESHOLD {
            0
        } else {
            let exponent = if self.counter > Self::MAX_EXPONENT {
                Self::MAX_EXPONENT
            } else {
                self.counter
            };
            1 << exponent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_count_doubles_to_cap() {
        let mut backoff = Backoff::new();
        let mut previous = 0;

        while !backoff.is_yielding() {
            let count = backoff.pause_count();
            assert!(count >= previous, "pause count must never shrink");
            assert!(count <= 1 << Backoff::MAX_EXPONENT);
            previous = count;
            backoff.spin();
        }

        // Once yielding, it yields forever.
        assert_eq!(backoff.pause_count(), 0);
        backoff.spin();
        assert!(backoff.is_yielding());
        assert_eq!(backoff.pause_count(), 0);
    }

    #[test]
    fn test_yield_threshold_reached_after_31_spins() {
        let mut backoff = Backoff::new();
        for _ in 0..Backoff::YIELD_THRESHOLD {
            assert!(!backoff.is_yielding());
            backoff.spin();
        }
        assert!(backoff.is_yielding());
    }

    #[test]
    fn test_fresh_spinner_starts_at_one_pause() {
        let backoff = Backoff::new();
        assert_eq!(backoff.pause_count(), 1);
        assert!(!backoff.is_yielding());
    }
}
