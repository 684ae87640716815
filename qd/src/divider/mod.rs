//! Dividers split an integer capacity across weighted priority classes
//!
//! A divider **adds** each priority's share to the distribution it is given,
//! it never overwrites. Callers rely on this to build an allocation from
//! several calls over the same map. For any single call the quantities added
//! sum to exactly the dividend; an empty priority list is a no-op.
//!
//! Priorities are expected sorted descending by weight.

mod fair;
mod rate;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Distribution, Priority};

pub use fair::Fair;
pub use rate::Rate;

/// Policy that splits a dividend across priorities
pub trait Divider: Send + Sync {
    /// Add each priority's share of `dividend` to `distribution`
    fn divide(&self, priorities: &[Priority], dividend: u64, distribution: &mut Distribution);
}

impl<F> Divider for F
where
    F: Fn(&[Priority], u64, &mut Distribution) + Send + Sync,
{
    fn divide(&self, priorities: &[Priority], dividend: u64, distribution: &mut Distribution) {
        self(priorities, dividend, distribution)
    }
}

/// Built-in divider selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DividerKind {
    Fair,
    #[default]
    Rate,
}

impl DividerKind {
    pub fn divider(self) -> Arc<dyn Divider> {
        match self {
            Self::Fair => Arc::new(Fair),
            Self::Rate => Arc::new(Rate),
        }
    }
}

impl std::fmt::Display for DividerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fair => write!(f, "fair"),
            Self::Rate => write!(f, "rate"),
        }
    }
}

impl std::str::FromStr for DividerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fair" => Ok(Self::Fair),
            "rate" => Ok(Self::Rate),
            _ => Err(format!("Unknown divider: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safe;
    use proptest::prelude::*;

    fn priorities_strategy() -> impl Strategy<Value = Vec<Priority>> {
        proptest::collection::btree_set(1u32..=200, 1..8).prop_map(|set| set.into_iter().rev().collect::<Vec<_>>())
    }

    #[test]
    fn test_closure_divider() {
        let everything_to_first = |priorities: &[Priority], dividend: u64, distribution: &mut Distribution| {
            if let Some(first) = priorities.first() {
                *distribution.entry(*first).or_default() += dividend;
            }
        };

        let mut distribution = Distribution::new();
        everything_to_first.divide(&[3, 2], 5, &mut distribution);
        assert_eq!(distribution, Distribution::from([(3, 5)]));
    }

    #[test]
    fn test_divider_kind_parse_and_display() {
        assert_eq!("fair".parse::<DividerKind>().unwrap(), DividerKind::Fair);
        assert_eq!("RATE".parse::<DividerKind>().unwrap(), DividerKind::Rate);
        assert!("weighted".parse::<DividerKind>().is_err());
        assert_eq!(DividerKind::Fair.to_string(), "fair");
    }

    #[test]
    fn test_divider_kind_serde() {
        let json = serde_json::to_string(&DividerKind::Fair).unwrap();
        assert_eq!(json, "\"fair\"");

        let kind: DividerKind = serde_json::from_str("\"rate\"").unwrap();
        assert_eq!(kind, DividerKind::Rate);
    }

    #[test]
    fn test_divider_kind_builds_divider() {
        let mut distribution = Distribution::new();
        DividerKind::Fair.divider().divide(&[2, 1], 4, &mut distribution);
        assert_eq!(distribution, Distribution::from([(2, 2), (1, 2)]));
    }

    proptest! {
        #[test]
        fn prop_fair_conserves_dividend(priorities in priorities_strategy(), dividend in 0u64..10_000) {
            let mut distribution = Distribution::new();
            Fair.divide(&priorities, dividend, &mut distribution);
            prop_assert_eq!(safe::sum(&distribution).unwrap(), dividend);
        }

        #[test]
        fn prop_rate_conserves_dividend(priorities in priorities_strategy(), dividend in 0u64..10_000) {
            let mut distribution = Distribution::new();
            Rate.divide(&priorities, dividend, &mut distribution);
            prop_assert_eq!(safe::sum(&distribution).unwrap(), dividend);
        }

        #[test]
        fn prop_accumulation_conserves_both_calls(
            priorities in priorities_strategy(),
            first in 0u64..5_000,
            second in 0u64..5_000,
        ) {
            for kind in [DividerKind::Fair, DividerKind::Rate] {
                let divider = kind.divider();

                let mut twice = Distribution::new();
                divider.divide(&priorities, first, &mut twice);
                divider.divide(&priorities, second, &mut twice);

                let mut once = Distribution::new();
                divider.divide(&priorities, first + second, &mut once);

                prop_assert_eq!(safe::sum(&twice).unwrap(), safe::sum(&once).unwrap());
                prop_assert_eq!(twice.len(), once.len());
            }
        }

        #[test]
        fn prop_fair_accumulation_differs_only_by_tie_break(
            priorities in priorities_strategy(),
            first in 0u64..5_000,
            second in 0u64..5_000,
        ) {
            let mut twice = Distribution::new();
            Fair.divide(&priorities, first, &mut twice);
            Fair.divide(&priorities, second, &mut twice);

            let mut once = Distribution::new();
            Fair.divide(&priorities, first + second, &mut once);

            for priority in &priorities {
                prop_assert!(twice[priority].abs_diff(once[priority]) <= 1);
            }
        }

        #[test]
        fn prop_rate_accumulation_differs_only_by_rounding(
            priorities in priorities_strategy(),
            first in 0u64..5_000,
            second in 0u64..5_000,
        ) {
            let mut twice = Distribution::new();
            Rate.divide(&priorities, first, &mut twice);
            Rate.divide(&priorities, second, &mut twice);

            let mut once = Distribution::new();
            Rate.divide(&priorities, first + second, &mut once);

            // one call is at most (n + 1) / 2 off the exact share, whatever the dividend
            let parts = priorities.len() as u64;
            for priority in &priorities {
                let diff = twice[priority].abs_diff(once[priority]);
                prop_assert!(2 * diff <= 3 * (parts + 1), "priority {} differs by {}", priority, diff);
            }
        }
    }
}
