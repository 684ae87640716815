//! Priority discipline
//!
//! Hands items from per-priority inputs to a pool of handlers through one
//! output, sharing the handlers between priorities in the proportions set
//! by a [`Divider`](crate::divider::Divider):
//! - **Strategic** allocation: the long-run share of each priority
//! - **Tactic**: what each priority may dispatch in the current cycle
//! - **Actual**: items dispatched and not yet released

mod config;
mod core;
mod error;
mod handle;
mod messages;

pub use config::DisciplineConfig;
pub use error::DisciplineError;
pub use handle::{Discipline, Opts, Output};
pub use messages::DisciplineMetrics;
