//! Repeat suppression for identical consecutive readings.
//!
//! Many devices report the same value over and over while idle.  Forwarding
//! every copy wastes bandwidth, but forwarding none would make a healthy idle
//! device look dead.  The policy is a compromise:
//!
//! - A reading that differs from the last broadcast one is always forwarded
//!   and resets the repeat counter to zero.
//! - Identical consecutive readings are forwarded until [`MAX_REPEATED_READS`]
//!   copies (the first one included) have gone out.
//! - Further identical readings are dropped silently until the value changes.
//!
//! The counter is also reset when a new client connects (see
//! [`RepeatTracker::reset_repeats`]), so a freshly connected client sees the
//! idle value flowing again even if suppression had already kicked in.
//!
//! [`decide_repeat`] is the pure decision; [`RepeatTracker`] holds the state
//! it needs between readings.

use tracing::trace;

use crate::protocol::reading::Reading;

/// Maximum number of identical consecutive readings that are forwarded.
pub const MAX_REPEATED_READS: u32 = 100;

/// Outcome of [`decide_repeat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatDecision {
    /// The reading is new.  Forward it; the counter becomes 0.
    Forward,
    /// The reading repeats the last one but is still under the cap.
    /// Forward it; the counter becomes `repeats`.
    ForwardRepeat { repeats: u32 },
    /// The cap has been reached.  Drop the reading; the counter becomes `repeats`.
    Suppress { repeats: u32 },
}

impl RepeatDecision {
    /// Whether the reading should be broadcast.
    pub fn should_forward(self) -> bool {
        !matches!(self, Self::Suppress { .. })
    }

    /// The repeat counter value after applying this decision.
    pub fn repeats(self) -> u32 {
        match self {
            Self::Forward => 0,
            Self::ForwardRepeat { repeats } | Self::Suppress { repeats } => repeats,
        }
    }
}

/// Decides what to do with `current` given the last broadcast reading and the
/// current repeat counter.
///
/// The counter never exceeds [`MAX_REPEATED_READS`].
///
/// # Examples
///
/// ```rust
/// use serial_ws_core::{decide_repeat, Reading, RepeatDecision};
///
/// let a = Reading::from("A\r");
/// assert_eq!(decide_repeat(&a, None, 0), RepeatDecision::Forward);
/// assert_eq!(
///     decide_repeat(&a, Some(&a), 0),
///     RepeatDecision::ForwardRepeat { repeats: 1 }
/// );
/// ```
pub fn decide_repeat(current: &Reading, last: Option<&Reading>, repeats: u32) -> RepeatDecision {
    if last != Some(current) {
        return RepeatDecision::Forward;
    }
    let next = repeats.saturating_add(1);
    if next < MAX_REPEATED_READS {
        RepeatDecision::ForwardRepeat { repeats: next }
    } else {
        RepeatDecision::Suppress {
            repeats: MAX_REPEATED_READS,
        }
    }
}

/// Stateful wrapper around [`decide_repeat`].
///
/// Holds the last broadcast reading (which is also what gets replayed to a
/// newly connected client) and the repeat counter.
#[derive(Debug, Default, Clone)]
pub struct RepeatTracker {
    last: Option<Reading>,
    repeats: u32,
}

impl RepeatTracker {
    /// Creates a tracker that has seen no readings yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the policy to `reading` and updates the tracker state.
    pub fn observe(&mut self, reading: &Reading) -> RepeatDecision {
        let decision = decide_repeat(reading, self.last.as_ref(), self.repeats);
        self.repeats = decision.repeats();
        match decision {
            RepeatDecision::Forward => self.last = Some(reading.clone()),
            RepeatDecision::ForwardRepeat { .. } => {}
            RepeatDecision::Suppress { .. } => {
                trace!(?reading, "repeat cap reached; reading suppressed");
            }
        }
        decision
    }

    /// Resets the counter so the current value starts flowing again.
    pub fn reset_repeats(&mut self) {
        self.repeats = 0;
    }

    /// The last broadcast reading, if any.
    pub fn last(&self) -> Option<&Reading> {
        self.last.as_ref()
    }

    /// The current repeat counter.
    pub fn repeats(&self) -> u32 {
        self.repeats
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarded_count(tracker: &mut RepeatTracker, reading: &Reading, n: usize) -> usize {
        (0..n)
            .filter(|_| tracker.observe(reading).should_forward())
            .count()
    }

    #[test]
    fn test_first_reading_is_forwarded() {
        assert_eq!(
            decide_repeat(&Reading::from("1\r"), None, 0),
            RepeatDecision::Forward
        );
    }

    #[test]
    fn test_different_reading_resets_counter() {
        let a = Reading::from("A\r");
        let b = Reading::from("B\r");
        let decision = decide_repeat(&b, Some(&a), 57);
        assert_eq!(decision, RepeatDecision::Forward);
        assert_eq!(decision.repeats(), 0);
    }

    #[test]
    fn test_repeat_under_cap_is_forwarded() {
        let a = Reading::from("A\r");
        assert_eq!(
            decide_repeat(&a, Some(&a), 98),
            RepeatDecision::ForwardRepeat { repeats: 99 }
        );
    }

    #[test]
    fn test_repeat_at_cap_is_suppressed() {
        let a = Reading::from("A\r");
        assert_eq!(
            decide_repeat(&a, Some(&a), 99),
            RepeatDecision::Suppress {
                repeats: MAX_REPEATED_READS
            }
        );
    }

    #[test]
    fn test_counter_never_exceeds_cap() {
        let a = Reading::from("A\r");
        let decision = decide_repeat(&a, Some(&a), MAX_REPEATED_READS);
        assert_eq!(decision.repeats(), MAX_REPEATED_READS);
        let decision = decide_repeat(&a, Some(&a), u32::MAX);
        assert_eq!(decision.repeats(), MAX_REPEATED_READS);
    }

    #[test]
    fn test_sequences_up_to_cap_are_fully_forwarded() {
        let a = Reading::from("A\r");
        for n in [1usize, 2, 50, 99, 100] {
            let mut tracker = RepeatTracker::new();
            assert_eq!(forwarded_count(&mut tracker, &a, n), n, "length {n}");
        }
    }

    #[test]
    fn test_sequences_over_cap_forward_exactly_the_cap() {
        let a = Reading::from("A\r");
        for n in [101usize, 150, 1000] {
            let mut tracker = RepeatTracker::new();
            assert_eq!(
                forwarded_count(&mut tracker, &a, n),
                MAX_REPEATED_READS as usize,
                "length {n}"
            );
        }
    }

    #[test]
    fn test_new_value_after_suppression_is_forwarded_immediately() {
        let a = Reading::from("A\r");
        let b = Reading::from("B\r");
        let mut tracker = RepeatTracker::new();
        forwarded_count(&mut tracker, &a, 500);

        let decision = tracker.observe(&b);

        assert_eq!(decision, RepeatDecision::Forward);
        assert_eq!(tracker.repeats(), 0);
        assert_eq!(tracker.last(), Some(&b));
    }

    #[test]
    fn test_reset_repeats_lets_suppressed_value_flow_again() {
        let a = Reading::from("A\r");
        let mut tracker = RepeatTracker::new();
        forwarded_count(&mut tracker, &a, 200);
        assert!(!tracker.observe(&a).should_forward());

        tracker.reset_repeats();

        assert_eq!(
            tracker.observe(&a),
            RepeatDecision::ForwardRepeat { repeats: 1 }
        );
    }

    #[test]
    fn test_last_is_kept_across_suppression() {
        let a = Reading::from("A\r");
        let mut tracker = RepeatTracker::new();
        forwarded_count(&mut tracker, &a, 150);
        assert_eq!(tracker.last(), Some(&a));
    }

    #[test]
    fn test_new_tracker_has_no_last_reading() {
        let tracker = RepeatTracker::new();
        assert!(tracker.last().is_none());
        assert_eq!(tracker.repeats(), 0);
    }
}
