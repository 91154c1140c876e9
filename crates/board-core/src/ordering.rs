//! Sort-key arithmetic for the fractional allocator.
//!
//! Keys are plain integers. A new key is the floor midpoint between the
//! predecessor's key and the next key above it; when the two are adjacent
//! the whole active order is respaced at `SORT_STEP` intervals.

use crate::types::TaskId;

/// Base spacing unit between keys after creation and after a rebalance.
pub const SORT_STEP: i64 = 1000;

/// Key given to a task created without an explicit predecessor.
pub fn initial_key(id: TaskId) -> i64 {
    id * SORT_STEP
}

/// Synthetic upper bound used when nothing sits above `low`: the next
/// multiple of `SORT_STEP` at or above `low + 1`.
pub fn upper_bound_after(low: i64) -> i64 {
    (low + 1 + SORT_STEP - 1).div_euclid(SORT_STEP) * SORT_STEP
}

/// Floor midpoint of `low` and `high`, or `None` when no integer fits
/// strictly between them.
pub fn midpoint(low: i64, high: i64) -> Option<i64> {
    let mid = (low + high).div_euclid(2);
    (mid != low && mid != high).then_some(mid)
}

/// Key strictly between `low` and the successor key (or the synthetic
/// bound when there is no successor).
pub fn place_between(low: i64, successor: Option<i64>) -> Option<i64> {
    let high = successor.unwrap_or_else(|| upper_bound_after(low));
    midpoint(low, high)
}

/// Key at `position` (0-based) in a freshly respaced order.
pub fn spaced_key(position: usize) -> i64 {
    (position as i64 + 1) * SORT_STEP
}

/// Respacing plan for tasks given in ascending key order. Only tasks whose
/// key actually changes are returned, as `(id, new_key)`.
pub fn rebalance_plan(ordered: &[(TaskId, i64)]) -> Vec<(TaskId, i64)> {
    ordered
        .iter()
        .enumerate()
        .filter_map(|(position, &(id, key))| {
            let target = spaced_key(position);
            (key != target).then_some((id, target))
        })
        .collect()
}
