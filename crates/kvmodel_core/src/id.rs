//! Pseudo-unique identifier generation.
//!
//! Identifiers are derived from the wall clock in 10µs units since a fixed
//! 2013 epoch, multiplied by 100, plus a random two-digit suffix. They trend
//! upward over time and collide only when two callers hit the same 10µs
//! tick and draw the same suffix.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds between the Unix epoch and the identifier epoch.
const EPOCH_OFFSET_SECS: f64 = 1_374_000_000.0;

/// Clock ticks per second.
const TICKS_PER_SEC: f64 = 100_000.0;

/// Returns a pseudo-unique decimal identifier.
///
/// # Example
///
/// ```rust
/// let a = kvmodel_core::int_id();
/// let b = kvmodel_core::int_id();
/// assert!(b / 100 >= a / 100);
/// ```
#[must_use]
pub fn int_id() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    // Clocks before the epoch saturate to zero.
    let ticks = ((now - EPOCH_OFFSET_SECS) * TICKS_PER_SEC).max(0.0) as u64;
    ticks * 100 + rand::thread_rng().gen_range(0..100)
}

/// Returns a pseudo-unique lowercase hexadecimal identifier.
#[must_use]
pub fn hex_id() -> String {
    format!("{:x}", int_id())
}
