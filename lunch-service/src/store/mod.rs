//! Persistence seam of the service.
//!
//! Reads are plain lookups. The two commit operations are the only writers of
//! menu items and orders: each runs as one transaction that reads a locked
//! snapshot, plans with [`shared::compiler`] or [`shared::applier`], and
//! applies the plan through conditional writes.

mod memory;
mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use shared::schedule::Schedule;
use shared::*;
use uuid::Uuid;

use crate::error::AppResult;

pub use memory::{MemoryStore, Seed};
pub use postgres::PgStore;

/// Which menu a compilation writes to.
#[derive(Debug, Clone, Copy)]
pub enum MenuTarget {
    /// The provider's menu for `schedule.date`, created if missing.
    Dated(Schedule),
    /// A shop's standing menu. `opened_at` seeds date and times on first use.
    Standing { opened_at: NaiveDateTime },
}

#[derive(Debug, Clone)]
pub struct MenuDraft {
    pub provider_id: Uuid,
    pub target: MenuTarget,
    pub requested: BTreeMap<Uuid, i64>,
    /// Every requested dish that exists for the provider.
    pub dishes: Vec<Dish>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub provider_id: Option<Uuid>,
    pub menu_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl OrderQuery {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |user_id| order.user_id == user_id)
            && self
                .created_from
                .map_or(true, |from| order.created_at.is_some_and(|at| at >= from))
            && self
                .created_to
                .map_or(true, |to| order.created_at.is_some_and(|at| at < to))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn provider(&self, id: Uuid) -> AppResult<Option<Provider>>;

    async fn dishes(&self, ids: &[Uuid]) -> AppResult<Vec<Dish>>;

    /// Inserts or updates a dish. With `standing` set the provider is a shop:
    /// its standing menu is opened at that local time if missing, and the
    /// dish's item there is created empty or repriced to the dish.
    async fn save_dish(&self, dish: &Dish, standing: Option<NaiveDateTime>) -> AppResult<Dish>;

    /// Flips `is_removed` of one of the provider's dishes. `None` when the
    /// provider has no such dish.
    async fn toggle_dish(&self, provider_id: Uuid, dish_id: Uuid) -> AppResult<Option<Dish>>;

    /// `None` selects the provider's earliest menu, which for a shop is its
    /// standing menu.
    async fn menu(&self, provider_id: Uuid, date: Option<NaiveDate>) -> AppResult<Option<Menu>>;

    async fn menus(&self, provider_id: Uuid) -> AppResult<Vec<Menu>>;

    async fn items(&self, ids: &[Uuid]) -> AppResult<Vec<MenuItem>>;

    async fn orders(&self, query: &OrderQuery) -> AppResult<Vec<Order>>;

    /// Resolves or creates the target menu and reconciles its items with
    /// `draft.requested` atomically.
    async fn commit_menu(&self, draft: &MenuDraft) -> AppResult<Menu>;

    /// Deletes a menu that has no committed units.
    async fn remove_menu(&self, menu_id: Uuid) -> AppResult<()>;

    /// Applies one user's requested counts to a menu atomically and returns
    /// the user's orders on that menu afterwards. Written orders are stamped
    /// with `now`.
    async fn commit_order(
        &self,
        user_id: Uuid,
        menu_id: Uuid,
        requested: &[ItemCount],
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Order>>;
}

/// The menu's items that still hold committed units, keyed by dish.
pub(crate) fn committed_by_dish(items: &[MenuItem]) -> BTreeMap<Uuid, i64> {
    items
        .iter()
        .filter(|item| item.committed_count() > 0)
        .map(|item| (item.dish_id, item.committed_count()))
        .collect()
}
