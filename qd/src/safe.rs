//! Overflow-checked accumulation
//!
//! Used wherever quantities produced by a [`Divider`](crate::divider::Divider)
//! are summed, so a misbehaving divider is reported instead of wrapping.

use thiserror::Error;

use crate::types::{Distribution, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Quantity overflow")]
pub struct Overflow;

/// Add two quantities
pub fn add(first: u64, second: u64) -> Result<u64, Overflow> {
    first.checked_add(second).ok_or(Overflow)
}

/// Sum every quantity in the distribution
pub fn sum(distribution: &Distribution) -> Result<u64, Overflow> {
    distribution.values().try_fold(0u64, |acc, &value| add(acc, value))
}

/// Sum the quantities of the given priorities only (missing entries count as zero)
pub fn sum_of(distribution: &Distribution, priorities: &[Priority]) -> Result<u64, Overflow> {
    priorities
        .iter()
        .try_fold(0u64, |acc, priority| add(acc, distribution.get(priority).copied().unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add() {
        assert_eq!(add(1, 2), Ok(3));
        assert_eq!(add(u64::MAX, 1), Err(Overflow));
    }

    #[test]
    fn test_sum() {
        let distribution = Distribution::from([(3, 4), (2, 5), (1, 0)]);
        assert_eq!(sum(&distribution), Ok(9));
        assert_eq!(sum(&Distribution::new()), Ok(0));

        let overflowing = Distribution::from([(2, u64::MAX), (1, 1)]);
        assert_eq!(sum(&overflowing), Err(Overflow));
    }

    #[test]
    fn test_sum_of_subset() {
        let distribution = Distribution::from([(3, 4), (2, 5), (1, 6)]);
        assert_eq!(sum_of(&distribution, &[3, 1]), Ok(10));
        assert_eq!(sum_of(&distribution, &[9]), Ok(0));
    }
}
