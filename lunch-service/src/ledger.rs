//! Counter writes on `menu_items`.
//!
//! Each statement carries the ledger guard in its WHERE clause, so it either
//! moves the counters as planned or touches no row. Callers treat `false` as a
//! lost race and roll the transaction back.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::compiler::Resize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::schema::menu_items;

/// Moves `delta` units from available to committed, keeping
/// `0 <= available_count <= initial_count`.
pub async fn reserve(conn: &mut AsyncPgConnection, item_id: Uuid, delta: i64) -> AppResult<bool> {
    let updated = diesel::update(
        menu_items::table
            .filter(menu_items::id.eq(item_id))
            .filter(menu_items::available_count.ge(delta))
            .filter(menu_items::available_count.le(menu_items::initial_count + delta)),
    )
    .set((
        menu_items::available_count.eq(menu_items::available_count - delta),
        menu_items::updated_at.eq(Some(Utc::now())),
    ))
    .execute(conn)
    .await?;

    Ok(updated == 1)
}

/// Sets a new `initial_count`, shifting `available_count` by the same amount.
/// Applies only if `initial_count` still holds the planned value.
pub async fn resize(conn: &mut AsyncPgConnection, resize: &Resize) -> AppResult<bool> {
    let shift = resize.to.initial - resize.from.initial;

    let updated = diesel::update(
        menu_items::table
            .filter(menu_items::id.eq(resize.item_id))
            .filter(menu_items::initial_count.eq(resize.from.initial))
            .filter(menu_items::available_count.ge(-shift)),
    )
    .set((
        menu_items::initial_count.eq(resize.to.initial),
        menu_items::available_count.eq(menu_items::available_count + shift),
        menu_items::updated_at.eq(Some(Utc::now())),
    ))
    .execute(conn)
    .await?;

    Ok(updated == 1)
}

/// Deletes an item only while nothing is committed against it.
pub async fn remove_unclaimed(conn: &mut AsyncPgConnection, item_id: Uuid) -> AppResult<bool> {
    let deleted = diesel::delete(
        menu_items::table
            .filter(menu_items::id.eq(item_id))
            .filter(menu_items::initial_count.eq(menu_items::available_count)),
    )
    .execute(conn)
    .await?;

    Ok(deleted == 1)
}
