//! Domain module: pure policy with no I/O.

pub mod repeat;

pub use repeat::{decide_repeat, RepeatDecision, RepeatTracker, MAX_REPEATED_READS};
