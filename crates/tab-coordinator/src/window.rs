//! Rolling 24-hour window arithmetic.
//!
//! Pure helpers over timestamped entry lists; every function takes the
//! current time explicitly so window behavior is testable without a clock.

use std::collections::HashSet;

use crate::store::CounterEntry;

/// The rolling window, in milliseconds.
pub const WINDOW_MS: i64 = 24 * 60 * 60 * 1_000;

/// Drop entries older than the window. Runs before every read and before
/// every write of a collection.
pub fn prune(entries: &mut Vec<CounterEntry>, now_ms: i64) {
    entries.retain(|entry| now_ms - entry.timestamp_ms < WINDOW_MS);
}

/// Raw impression count within the window (repeats included).
pub fn raw_count(entries: &[CounterEntry], now_ms: i64) -> usize {
    entries
        .iter()
        .filter(|entry| now_ms - entry.timestamp_ms < WINDOW_MS)
        .count()
}

/// Distinct subjects with at least one in-window entry.
pub fn unique_count(entries: &[CounterEntry], now_ms: i64) -> usize {
    entries
        .iter()
        .filter(|entry| now_ms - entry.timestamp_ms < WINDOW_MS)
        .map(|entry| entry.subject_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Whether `subject_id` already has an entry within the trailing
/// `within_ms`.
pub fn counted_within(
    entries: &[CounterEntry],
    subject_id: &str,
    within_ms: i64,
    now_ms: i64,
) -> bool {
    entries
        .iter()
        .any(|entry| entry.subject_id == subject_id && now_ms - entry.timestamp_ms < within_ms)
}
