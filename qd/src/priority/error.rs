//! Discipline error types

use thiserror::Error;

use crate::safe::Overflow;
use crate::types::Priority;

/// Errors reported by the priority discipline
///
/// Construction problems come back from [`Discipline::new`](super::Discipline::new);
/// everything else is delivered once through [`Discipline::err`](super::Discipline::err).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisciplineError {
    #[error("Handlers quantity must be greater than zero")]
    ZeroHandlersQuantity,

    #[error("No inputs were provided")]
    NoInputs,

    #[error("Handlers quantity {quantity} leaves some combination of priorities without a share")]
    QuantityNotEnough { quantity: u64 },

    #[error("Divider distributed {distributed} instead of {dividend}")]
    DividerNotConserving { dividend: u64, distributed: u64 },

    #[error("Quantity exceeded: {required} required, {available} available")]
    QuantityExceeded { required: u64, available: u64 },

    #[error("Quantity overflow")]
    Overflow,

    #[error("Release for priority {0} without a dispatched item")]
    UnexpectedRelease(Priority),

    #[error("Output channel closed")]
    OutputClosed,

    #[error("Discipline terminated")]
    Terminated,

    #[error("Every discipline handle was dropped")]
    Abandoned,
}

impl From<Overflow> for DisciplineError {
    fn from(_: Overflow) -> Self {
        Self::Overflow
    }
}

impl DisciplineError {
    /// Check if this error was returned while validating options
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ZeroHandlersQuantity
                | Self::NoInputs
                | Self::QuantityNotEnough { .. }
                | Self::DividerNotConserving { .. }
        )
    }

    /// Check if this error means the in-flight ceiling would be broken
    pub fn is_quantity_exceeded(&self) -> bool {
        matches!(self, Self::QuantityExceeded { .. } | Self::Overflow)
    }
}
