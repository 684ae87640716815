//! Core value types shared by dividers, verification and the discipline

use std::collections::HashMap;

/// Identifies a priority class and doubles as its relative weight
///
/// Higher values get a larger share under [`Rate`](crate::divider::Rate).
pub type Priority = u32;

/// Per-priority allocated quantity
pub type Distribution = HashMap<Priority, u64>;

/// Item dispatched to handlers together with the priority it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prioritized<T> {
    pub item: T,
    pub priority: Priority,
}

impl<T> Prioritized<T> {
    pub fn new(item: T, priority: Priority) -> Self {
        Self { item, priority }
    }
}

/// Sort priorities descending by weight and drop duplicates
pub fn normalize(priorities: &[Priority]) -> Vec<Priority> {
    let mut sorted = priorities.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    sorted
}
