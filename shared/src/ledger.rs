//! Quantity ledger primitives.
//!
//! A menu item carries two counters: `initial_count`, the quantity the provider
//! authorized, and `available_count`, what is left for new orders. Their
//! difference is the committed count and must always equal the sum of the
//! item's orders. Every mutation of either counter goes through [`reserve`] or
//! [`resize`]; stores realize the same guards as conditional writes.

use crate::MenuItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// A reservation would push `available_count` outside `[0, initial_count]`.
    Insufficient { available: i64 },
    /// A resize would drop `initial_count` below the committed count.
    BelowCommitted { committed: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub initial: i64,
    pub available: i64,
}

impl From<&MenuItem> for Counts {
    fn from(item: &MenuItem) -> Self {
        Counts {
            initial: item.initial_count,
            available: item.available_count,
        }
    }
}

/// Takes `delta` units out of the available pool (a negative `delta` returns
/// units to it).
pub fn reserve(counts: Counts, delta: i64) -> Result<Counts, Rejected> {
    let available = counts
        .available
        .checked_sub(delta)
        .filter(|left| (0..=counts.initial).contains(left))
        .ok_or(Rejected::Insufficient {
            available: counts.available,
        })?;

    Ok(Counts {
        initial: counts.initial,
        available,
    })
}

/// Changes the authorized quantity while keeping the committed count intact.
pub fn resize(counts: Counts, new_initial: i64) -> Result<Counts, Rejected> {
    let committed = counts.initial - counts.available;
    if new_initial < committed || new_initial < 0 {
        return Err(Rejected::BelowCommitted { committed });
    }

    Ok(Counts {
        initial: new_initial,
        available: new_initial - committed,
    })
}

pub fn apply(item: &mut MenuItem, counts: Counts) {
    item.initial_count = counts.initial;
    item.available_count = counts.available;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(initial: i64, available: i64) -> Counts {
        Counts { initial, available }
    }

    #[test]
    fn reserve_takes_and_returns_units() {
        assert_eq!(reserve(counts(10, 10), 4), Ok(counts(10, 6)));
        assert_eq!(reserve(counts(10, 6), -2), Ok(counts(10, 8)));
        assert_eq!(reserve(counts(10, 8), 0), Ok(counts(10, 8)));
    }

    #[test]
    fn reserve_never_goes_negative() {
        assert_eq!(
            reserve(counts(10, 3), 5),
            Err(Rejected::Insufficient { available: 3 })
        );
        assert_eq!(reserve(counts(10, 3), 3), Ok(counts(10, 0)));
    }

    #[test]
    fn reserve_never_exceeds_initial() {
        assert_eq!(
            reserve(counts(10, 9), -2),
            Err(Rejected::Insufficient { available: 9 })
        );
    }

    #[test]
    fn reserve_rejects_overflow() {
        assert_eq!(
            reserve(counts(10, 5), i64::MIN),
            Err(Rejected::Insufficient { available: 5 })
        );
    }

    #[test]
    fn resize_preserves_committed() {
        // 5 committed
        assert_eq!(resize(counts(10, 5), 12), Ok(counts(12, 7)));
        assert_eq!(resize(counts(10, 5), 5), Ok(counts(5, 0)));
        assert_eq!(
            resize(counts(10, 5), 2),
            Err(Rejected::BelowCommitted { committed: 5 })
        );
    }

    #[test]
    fn resize_to_zero_without_orders() {
        assert_eq!(resize(counts(4, 4), 0), Ok(counts(0, 0)));
        assert_eq!(
            resize(counts(4, 4), -1),
            Err(Rejected::BelowCommitted { committed: 0 })
        );
    }
}
