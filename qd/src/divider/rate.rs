use crate::types::{Distribution, Priority};

use super::Divider;

/// Shares proportional to priority weight, rounded to nearest
///
/// Priorities are served in the given order. Once the undistributed rest is
/// smaller than the next share, that priority takes the rest and the ones
/// after it get nothing. Whatever rounding leaves over goes to the first
/// priority.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rate;

impl Divider for Rate {
    fn divide(&self, priorities: &[Priority], dividend: u64, distribution: &mut Distribution) {
        let Some(&first) = priorities.first() else {
            return;
        };

        let weights: u128 = priorities.iter().map(|&priority| u128::from(priority)).sum();
        if weights == 0 {
            for priority in priorities {
                distribution.entry(*priority).or_default();
            }
            *distribution.entry(first).or_default() += dividend;
            return;
        }

        let mut remainder = dividend;

        for (id, &priority) in priorities.iter().enumerate() {
            let share = rounded_share(dividend, priority, weights);

            if remainder < share {
                *distribution.entry(priority).or_default() += remainder;
                remainder = 0;

                for rest in &priorities[id + 1..] {
                    distribution.entry(*rest).or_default();
                }

                break;
            }

            *distribution.entry(priority).or_default() += share;
            remainder -= share;
        }

        *distribution.entry(first).or_default() += remainder;
    }
}

/// round(dividend * weight / weights), halves rounded up
fn rounded_share(dividend: u64, weight: Priority, weights: u128) -> u64 {
    let numerator = 2 * u128::from(dividend) * u128::from(weight) + weights;
    let share = numerator / (2 * weights);
    // weight <= weights, so the share never exceeds the dividend
    u64::try_from(share).unwrap_or(dividend)
}
