//! Quality-of-service disciplines
//!
//! Controls the order and rate at which queued items reach a pool of
//! concurrent handlers.
//!
//! # Modules
//!
//! - [`divider`] - Policies splitting handlers across weighted priorities
//! - [`verify`] - Offline checks that a divider and handlers quantity never starve a priority
//! - [`priority`] - The priority discipline, a proportional dispatch loop over tokio channels
//! - [`safe`] - Overflow-checked accumulation of quantities
//! - [`types`] - Priorities, distributions and prioritized items

pub mod divider;
pub mod priority;
pub mod safe;
pub mod types;
pub mod verify;

// Re-export commonly used types
pub use divider::{Divider, DividerKind, Fair, Rate};
pub use priority::{Discipline, DisciplineConfig, DisciplineError, DisciplineMetrics, Opts, Output};
pub use types::{Distribution, Prioritized, Priority};
pub use verify::{
    is_non_fatal_config, is_suitable_config, max_deviation, pick_up_max_non_fatal_quantity,
    pick_up_max_suitable_quantity, pick_up_min_non_fatal_quantity, pick_up_min_suitable_quantity,
};
