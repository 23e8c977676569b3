//! Domain errors raised by the reconciliation engine.
//!
//! Every variant is returned to the caller as-is. The maps carried by the two
//! conflict variants are keyed by dish id and always list every offending dish
//! of the rejected batch.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

pub type LunchResult<T> = Result<T, LunchError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LunchError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// dish id -> committed count
    #[error("Menu change conflicts with placed orders for {} dish(es)", .0.len())]
    CapacityConflict(BTreeMap<Uuid, i64>),

    /// dish id -> available count
    #[error("Insufficient availability for {} dish(es)", .0.len())]
    InsufficientAvailability(BTreeMap<Uuid, i64>),

    #[error("Deadline of this menu is already in past")]
    DeadlinePassed,
}

impl LunchError {
    pub fn kind(&self) -> &'static str {
        match self {
            LunchError::Validation(_) => "validation_error",
            LunchError::NotFound(_) => "not_found",
            LunchError::CapacityConflict(_) => "capacity_conflict",
            LunchError::InsufficientAvailability(_) => "insufficient_availability",
            LunchError::DeadlinePassed => "deadline_passed",
        }
    }

    pub fn offending_dishes(&self) -> Option<&BTreeMap<Uuid, i64>> {
        match self {
            LunchError::CapacityConflict(map) | LunchError::InsufficientAvailability(map) => {
                Some(map)
            }
            _ => None,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        LunchError::NotFound(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        LunchError::Validation(what.into())
    }
}
