//! Deadline gate for order-mutating operations.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{LunchError, LunchResult, Menu, Provider};

/// Resolves a provider-local deadline to an instant. Local times skipped by a
/// DST jump have no instant; folded ones resolve to the earlier of the two.
pub fn deadline_instant(deadline_at: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&deadline_at) {
        LocalResult::Single(at) => Some(at.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Returns true while orders against `menu` may still change. Fails closed.
pub fn admit(menu: &Menu, provider: &Provider, now: DateTime<Utc>) -> bool {
    if provider.is_shop {
        return true;
    }

    let Ok(tz) = provider.tz() else {
        return false;
    };

    match deadline_instant(menu.deadline_at, tz) {
        Some(deadline) => now < deadline,
        None => false,
    }
}

pub fn ensure_open(menu: &Menu, provider: &Provider, now: DateTime<Utc>) -> LunchResult<()> {
    if admit(menu, provider, now) {
        Ok(())
    } else {
        tracing::warn!(menu_id = %menu.id, deadline = %menu.deadline_at, "menu deadline passed");
        Err(LunchError::DeadlinePassed)
    }
}
