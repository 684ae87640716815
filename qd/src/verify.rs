//! Capacity verification
//!
//! At runtime only a subset of priorities may have pending items, so a
//! divider has to behave for every non-empty subset of the configured set,
//! not just the full one. These functions evaluate a divider over the whole
//! powerset to certify a handlers quantity before it is used.

use tracing::debug;

use crate::divider::Divider;
use crate::safe;
use crate::types::{Distribution, Priority, normalize};

/// Dividend multiplier used to approximate the exact proportions
pub const REFERENCE_FACTOR: u64 = 1000;

/// Call `visit` for every non-empty subset of `priorities`, keeping their order
///
/// Stops early and returns `false` as soon as `visit` does.
pub fn for_each_subset<F>(priorities: &[Priority], mut visit: F) -> bool
where
    F: FnMut(&[Priority]) -> bool,
{
    let mut subset = Vec::with_capacity(priorities.len());
    walk(priorities, 0, &mut subset, &mut visit)
}

fn walk<F>(priorities: &[Priority], from: usize, subset: &mut Vec<Priority>, visit: &mut F) -> bool
where
    F: FnMut(&[Priority]) -> bool,
{
    for id in from..priorities.len() {
        subset.push(priorities[id]);

        let proceed = visit(subset) && walk(priorities, id + 1, subset, visit);

        subset.pop();

        if !proceed {
            return false;
        }
    }

    true
}

/// Every priority of every subset gets a non-zero share of `quantity`
pub fn is_non_fatal_config(priorities: &[Priority], divider: &dyn Divider, quantity: u64) -> bool {
    let priorities = normalize(priorities);

    for_each_subset(&priorities, |subset| {
        let mut distribution = Distribution::new();
        divider.divide(subset, quantity, &mut distribution);

        if safe::sum_of(&distribution, subset) != Ok(quantity) {
            return false;
        }

        subset
            .iter()
            .all(|priority| distribution.get(priority).copied().unwrap_or(0) != 0)
    })
}

/// Smallest quantity in `1..=limit` that is non-fatal
pub fn pick_up_min_non_fatal_quantity(priorities: &[Priority], divider: &dyn Divider, limit: u64) -> Option<u64> {
    let picked = (1..=limit).find(|&quantity| is_non_fatal_config(priorities, divider, quantity));
    debug!(?priorities, limit, ?picked, "pick_up_min_non_fatal_quantity: done");
    picked
}

/// Largest quantity in `1..=limit` that is non-fatal
pub fn pick_up_max_non_fatal_quantity(priorities: &[Priority], divider: &dyn Divider, limit: u64) -> Option<u64> {
    let picked = (1..=limit)
        .rev()
        .find(|&quantity| is_non_fatal_config(priorities, divider, quantity));
    debug!(?priorities, limit, ?picked, "pick_up_max_non_fatal_quantity: done");
    picked
}

/// Worst relative deviation, in percent, of the shares achieved at `quantity`
/// from the shares at `quantity * REFERENCE_FACTOR`, over every subset
///
/// Returns `None` if the reference dividend overflows or `quantity` is zero.
pub fn max_deviation(priorities: &[Priority], divider: &dyn Divider, quantity: u64) -> Option<f64> {
    if quantity == 0 {
        return None;
    }

    let reference_quantity = quantity.checked_mul(REFERENCE_FACTOR)?;
    let priorities = normalize(priorities);

    let mut worst = 0.0f64;

    for_each_subset(&priorities, |subset| {
        let mut achieved = Distribution::new();
        divider.divide(subset, quantity, &mut achieved);

        let mut reference = Distribution::new();
        divider.divide(subset, reference_quantity, &mut reference);

        for priority in subset {
            let expected = share(&reference, *priority, reference_quantity);
            let actual = share(&achieved, *priority, quantity);

            let deviation = if expected == 0.0 {
                if actual == 0.0 { 0.0 } else { f64::INFINITY }
            } else {
                (actual - expected).abs() / expected * 100.0
            };

            worst = worst.max(deviation);
        }

        true
    });

    Some(worst)
}

fn share(distribution: &Distribution, priority: Priority, total: u64) -> f64 {
    distribution.get(&priority).copied().unwrap_or(0) as f64 / total as f64
}

/// Non-fatal and no share deviates from the reference proportion by more
/// than `tolerance` percent
pub fn is_suitable_config(priorities: &[Priority], divider: &dyn Divider, quantity: u64, tolerance: f64) -> bool {
    if !is_non_fatal_config(priorities, divider, quantity) {
        return false;
    }

    max_deviation(priorities, divider, quantity).is_some_and(|deviation| deviation <= tolerance)
}

/// Smallest quantity in `1..=limit` that is suitable
pub fn pick_up_min_suitable_quantity(
    priorities: &[Priority],
    divider: &dyn Divider,
    limit: u64,
    tolerance: f64,
) -> Option<u64> {
    let picked = (1..=limit).find(|&quantity| is_suitable_config(priorities, divider, quantity, tolerance));
    debug!(?priorities, limit, tolerance, ?picked, "pick_up_min_suitable_quantity: done");
    picked
}

/// Largest quantity in `1..=limit` that is suitable
pub fn pick_up_max_suitable_quantity(
    priorities: &[Priority],
    divider: &dyn Divider,
    limit: u64,
    tolerance: f64,
) -> Option<u64> {
    let picked = (1..=limit)
        .rev()
        .find(|&quantity| is_suitable_config(priorities, divider, quantity, tolerance));
    debug!(?priorities, limit, tolerance, ?picked, "pick_up_max_suitable_quantity: done");
    picked
}
