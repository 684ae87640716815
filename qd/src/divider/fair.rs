use crate::types::{Distribution, Priority};

use super::Divider;

/// Equal shares; the remainder goes one unit at a time to the first
/// (highest weight) priorities
#[derive(Debug, Clone, Copy, Default)]
pub struct Fair;

impl Divider for Fair {
    fn divide(&self, priorities: &[Priority], dividend: u64, distribution: &mut Distribution) {
        if priorities.is_empty() {
            return;
        }

        let parts = priorities.len() as u64;
        let quotient = dividend / parts;
        let mut remainder = dividend % parts;

        for priority in priorities {
            let share = distribution.entry(*priority).or_default();
            *share += quotient;

            if remainder != 0 {
                *share += 1;
                remainder -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fair_remainder_goes_to_highest_first() {
        let mut distribution = Distribution::new();
        Fair.divide(&[3, 2, 1], 1, &mut distribution);
        assert_eq!(distribution, Distribution::from([(3, 1), (2, 0), (1, 0)]));
    }

    #[test]
    fn test_fair_even_split() {
        let mut distribution = Distribution::new();
        Fair.divide(&[3, 2, 1], 6, &mut distribution);
        assert_eq!(distribution, Distribution::from([(3, 2), (2, 2), (1, 2)]));
    }

    #[test]
    fn test_fair_uneven_split() {
        let mut distribution = Distribution::new();
        Fair.divide(&[5, 4, 3, 2], 7, &mut distribution);
        assert_eq!(distribution, Distribution::from([(5, 2), (4, 2), (3, 2), (2, 1)]));
    }

    #[test]
    fn test_fair_accumulates() {
        let mut distribution = Distribution::from([(3, 10)]);
        Fair.divide(&[3, 2], 4, &mut distribution);
        assert_eq!(distribution, Distribution::from([(3, 12), (2, 2)]));
    }

    #[test]
    fn test_fair_empty_priorities_is_noop() {
        let mut distribution = Distribution::from([(1, 1)]);
        Fair.divide(&[], 10, &mut distribution);
        assert_eq!(distribution, Distribution::from([(1, 1)]));
    }
}
