use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::applier::{self, OrderChange, PlannedChange};
use shared::compiler::{self, MenuPlan};
use shared::*;
use tracing::{info, warn};
use uuid::Uuid;

use super::{committed_by_dish, MenuDraft, MenuTarget, OrderQuery, Store};
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn find_menu(
    conn: &mut AsyncPgConnection,
    provider_id: Uuid,
    date: Option<NaiveDate>,
) -> AppResult<Option<DbMenu>> {
    let mut query = menus::table
        .filter(menus::provider_id.eq(provider_id))
        .into_boxed();
    if let Some(date) = date {
        query = query.filter(menus::date.eq(date));
    }

    Ok(query
        .order_by(menus::date.asc())
        .select(DbMenu::as_select())
        .first(conn)
        .await
        .optional()?)
}

async fn items_of(conn: &mut AsyncPgConnection, menu_ids: &[Uuid]) -> AppResult<Vec<MenuItem>> {
    let rows = menu_items::table
        .filter(menu_items::menu_id.eq_any(menu_ids))
        .order_by((menu_items::created_at.asc(), menu_items::id.asc()))
        .select(DbMenuItem::as_select())
        .load(conn)
        .await?;

    Ok(rows.into_iter().map(MenuItem::from).collect())
}

/// Loads a menu's items with row locks held until the transaction ends.
async fn locked_items(conn: &mut AsyncPgConnection, menu_id: Uuid) -> AppResult<Vec<MenuItem>> {
    let rows = menu_items::table
        .filter(menu_items::menu_id.eq(menu_id))
        .order_by(menu_items::id.asc())
        .select(DbMenuItem::as_select())
        .for_update()
        .load(conn)
        .await?;

    Ok(rows.into_iter().map(MenuItem::from).collect())
}

async fn user_orders(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    item_ids: &[Uuid],
) -> AppResult<Vec<Order>> {
    let rows = orders::table
        .filter(orders::user_id.eq(user_id))
        .filter(orders::item_id.eq_any(item_ids))
        .select(DbOrder::as_select())
        .load(conn)
        .await?;

    Ok(rows.into_iter().map(Order::from).collect())
}

/// Finds or creates the target menu and locks its row. A dated target also
/// takes the new schedule.
async fn resolve_menu(
    conn: &mut AsyncPgConnection,
    provider_id: Uuid,
    target: MenuTarget,
) -> AppResult<DbMenu> {
    match target {
        MenuTarget::Dated(schedule) => {
            let new_menu = NewMenu {
                id: Uuid::new_v4(),
                provider_id,
                date: schedule.date,
                delivery_time: schedule.delivery_time,
                deadline_at: schedule.deadline_at,
            };

            Ok(diesel::insert_into(menus::table)
                .values(&new_menu)
                .on_conflict((menus::provider_id, menus::date))
                .do_update()
                .set((
                    menus::delivery_time.eq(schedule.delivery_time),
                    menus::deadline_at.eq(schedule.deadline_at),
                    menus::updated_at.eq(Some(Utc::now())),
                ))
                .returning(DbMenu::as_returning())
                .get_result(conn)
                .await?)
        }
        MenuTarget::Standing { opened_at } => {
            if find_menu(conn, provider_id, None).await?.is_none() {
                let new_menu = NewMenu {
                    id: Uuid::new_v4(),
                    provider_id,
                    date: opened_at.date(),
                    delivery_time: opened_at.time(),
                    deadline_at: opened_at,
                };
                diesel::insert_into(menus::table)
                    .values(&new_menu)
                    .on_conflict_do_nothing()
                    .execute(conn)
                    .await?;
            }

            Ok(menus::table
                .filter(menus::provider_id.eq(provider_id))
                .order_by(menus::date.asc())
                .select(DbMenu::as_select())
                .for_update()
                .first(conn)
                .await?)
        }
    }
}

async fn apply_menu_plan(
    conn: &mut AsyncPgConnection,
    menu_id: Uuid,
    plan: &MenuPlan,
) -> AppResult<()> {
    for item in &plan.remove {
        if !ledger::remove_unclaimed(conn, item.id).await? {
            return Err(AppError::Conflict(format!(
                "dish {} received orders while being removed",
                item.dish_id
            )));
        }
    }

    for resize in &plan.resize {
        if !ledger::resize(conn, resize).await? {
            return Err(AppError::Conflict(format!(
                "counts of dish {} changed",
                resize.dish_id
            )));
        }
    }

    if !plan.create.is_empty() {
        let rows: Vec<NewMenuItem> = plan
            .create
            .iter()
            .map(|item| NewMenuItem::planned(menu_id, item))
            .collect();

        diesel::insert_into(menu_items::table)
            .values(&rows)
            .execute(conn)
            .await?;
    }

    Ok(())
}

async fn apply_order_change(
    conn: &mut AsyncPgConnection,
    user_id: Uuid,
    planned: &PlannedChange,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let written = match &planned.change {
        OrderChange::Create {
            item_id,
            count,
            price,
        } => {
            let order = Order::new(user_id, *item_id, *count, price.clone(), now);
            diesel::insert_into(orders::table)
                .values(&NewOrder::from(&order))
                .on_conflict((orders::user_id, orders::item_id))
                .do_nothing()
                .execute(conn)
                .await?
        }
        OrderChange::Update {
            order_id, from, to, ..
        } => {
            diesel::update(
                orders::table
                    .filter(orders::id.eq(*order_id))
                    .filter(orders::ordered_count.eq(*from)),
            )
            .set((
                orders::ordered_count.eq(*to),
                orders::updated_at.eq(Some(now)),
            ))
            .execute(conn)
            .await?
        }
        OrderChange::Delete { order_id, from, .. } => {
            diesel::delete(
                orders::table
                    .filter(orders::id.eq(*order_id))
                    .filter(orders::ordered_count.eq(*from)),
            )
            .execute(conn)
            .await?
        }
    };

    if written != 1 {
        return Err(AppError::Conflict(format!(
            "order for dish {} changed",
            planned.dish_id
        )));
    }

    if !ledger::reserve(conn, planned.change.item_id(), planned.change.delta()).await? {
        warn!("Reservation for dish {} lost a race", planned.dish_id);
        return Err(LunchError::InsufficientAvailability(
            [(planned.dish_id, planned.before.available)].into(),
        )
        .into());
    }

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn provider(&self, id: Uuid) -> AppResult<Option<Provider>> {
        let mut conn = self.pool.get().await?;

        let row = providers::table
            .find(id)
            .select(DbProvider::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(row.map(Provider::from))
    }

    async fn dishes(&self, ids: &[Uuid]) -> AppResult<Vec<Dish>> {
        let mut conn = self.pool.get().await?;

        let rows = dishes::table
            .filter(dishes::id.eq_any(ids))
            .select(DbDish::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(Dish::from).collect())
    }

    async fn save_dish(&self, dish: &Dish, standing: Option<NaiveDateTime>) -> AppResult<Dish> {
        let mut conn = self.pool.get().await?;

        let saved = conn
            .transaction::<_, AppError, _>(|conn| {
                async move {
                    let row = diesel::insert_into(dishes::table)
                        .values(&NewDish::from(dish))
                        .on_conflict(dishes::id)
                        .do_update()
                        .set((
                            dishes::price.eq(dish.price.clone()),
                            dishes::weight.eq(dish.weight),
                            dishes::calories.eq(dish.calories),
                        ))
                        .returning(DbDish::as_returning())
                        .get_result(conn)
                        .await?;

                    if let Some(opened_at) = standing {
                        let menu =
                            resolve_menu(conn, dish.provider_id, MenuTarget::Standing { opened_at })
                                .await?;
                        let empty = compiler::NewItem {
                            dish_id: dish.id,
                            count: 0,
                            price: dish.price.clone(),
                        };
                        diesel::insert_into(menu_items::table)
                            .values(&NewMenuItem::planned(menu.id, &empty))
                            .on_conflict((menu_items::menu_id, menu_items::dish_id))
                            .do_update()
                            .set((
                                menu_items::price.eq(dish.price.clone()),
                                menu_items::updated_at.eq(Some(Utc::now())),
                            ))
                            .execute(conn)
                            .await?;
                    }

                    Ok(Dish::from(row))
                }
                .scope_boxed()
            })
            .await?;

        Ok(saved)
    }

    async fn toggle_dish(&self, provider_id: Uuid, dish_id: Uuid) -> AppResult<Option<Dish>> {
        let mut conn = self.pool.get().await?;

        let row = diesel::update(
            dishes::table
                .filter(dishes::id.eq(dish_id))
                .filter(dishes::provider_id.eq(provider_id)),
        )
        .set(dishes::is_removed.eq(diesel::dsl::not(dishes::is_removed)))
        .returning(DbDish::as_returning())
        .get_result(&mut conn)
        .await
        .optional()?;

        Ok(row.map(Dish::from))
    }

    async fn menu(&self, provider_id: Uuid, date: Option<NaiveDate>) -> AppResult<Option<Menu>> {
        let mut conn = self.pool.get().await?;

        match find_menu(&mut conn, provider_id, date).await? {
            Some(row) => {
                let items = items_of(&mut conn, &[row.id]).await?;
                Ok(Some(row.hydrate(items)))
            }
            None => Ok(None),
        }
    }

    async fn menus(&self, provider_id: Uuid) -> AppResult<Vec<Menu>> {
        let mut conn = self.pool.get().await?;

        let rows = menus::table
            .filter(menus::provider_id.eq(provider_id))
            .order_by(menus::date.asc())
            .select(DbMenu::as_select())
            .load(&mut conn)
            .await?;

        let menu_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut items_by_menu: HashMap<Uuid, Vec<MenuItem>> = HashMap::new();
        for item in items_of(&mut conn, &menu_ids).await? {
            items_by_menu.entry(item.menu_id).or_default().push(item);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = items_by_menu.remove(&row.id).unwrap_or_default();
                row.hydrate(items)
            })
            .collect())
    }

    async fn items(&self, ids: &[Uuid]) -> AppResult<Vec<MenuItem>> {
        let mut conn = self.pool.get().await?;

        let rows = menu_items::table
            .filter(menu_items::id.eq_any(ids))
            .select(DbMenuItem::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(MenuItem::from).collect())
    }

    async fn orders(&self, query: &OrderQuery) -> AppResult<Vec<Order>> {
        let mut conn = self.pool.get().await?;

        let mut orders_query = orders::table.into_boxed();

        if query.provider_id.is_some() || query.menu_id.is_some() {
            let mut items_query = menu_items::table
                .inner_join(menus::table)
                .select(menu_items::id)
                .into_boxed();
            if let Some(provider_id) = query.provider_id {
                items_query = items_query.filter(menus::provider_id.eq(provider_id));
            }
            if let Some(menu_id) = query.menu_id {
                items_query = items_query.filter(menu_items::menu_id.eq(menu_id));
            }
            let item_ids: Vec<Uuid> = items_query.load(&mut conn).await?;
            orders_query = orders_query.filter(orders::item_id.eq_any(item_ids));
        }

        if let Some(user_id) = query.user_id {
            orders_query = orders_query.filter(orders::user_id.eq(user_id));
        }
        if let Some(from) = query.created_from {
            orders_query = orders_query.filter(orders::created_at.ge(from));
        }
        if let Some(to) = query.created_to {
            orders_query = orders_query.filter(orders::created_at.lt(to));
        }

        let rows = orders_query
            .order_by(orders::created_at.asc())
            .select(DbOrder::as_select())
            .load(&mut conn)
            .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn commit_menu(&self, draft: &MenuDraft) -> AppResult<Menu> {
        let mut conn = self.pool.get().await?;

        let (menu, plan) = conn
            .transaction::<_, AppError, _>(|conn| {
                async move {
                    let row = resolve_menu(conn, draft.provider_id, draft.target).await?;
                    let current = locked_items(conn, row.id).await?;

                    let dishes = draft.dishes.iter().map(|d| (d.id, d.clone())).collect();
                    let plan =
                        compiler::plan_menu(draft.provider_id, &current, &draft.requested, &dishes)?;
                    apply_menu_plan(conn, row.id, &plan).await?;

                    let items = items_of(conn, &[row.id]).await?;
                    Ok((row.hydrate(items), plan))
                }
                .scope_boxed()
            })
            .await?;

        info!(
            "Menu {} saved: {} removed, {} resized, {} created",
            menu.id,
            plan.remove.len(),
            plan.resize.len(),
            plan.create.len()
        );
        Ok(menu)
    }

    async fn remove_menu(&self, menu_id: Uuid) -> AppResult<()> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, AppError, _>(|conn| {
            async move {
                menus::table
                    .find(menu_id)
                    .select(DbMenu::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| LunchError::not_found("Unable to find menu"))?;

                let committed = committed_by_dish(&locked_items(conn, menu_id).await?);
                if !committed.is_empty() {
                    return Err(LunchError::CapacityConflict(committed).into());
                }

                diesel::delete(menu_items::table.filter(menu_items::menu_id.eq(menu_id)))
                    .execute(conn)
                    .await?;
                diesel::delete(menus::table.find(menu_id))
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        info!("Menu {} removed", menu_id);
        Ok(())
    }

    async fn commit_order(
        &self,
        user_id: Uuid,
        menu_id: Uuid,
        requested: &[ItemCount],
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Order>> {
        let mut conn = self.pool.get().await?;

        let (orders, applied) = conn
            .transaction::<_, AppError, _>(|conn| {
                async move {
                    let items = locked_items(conn, menu_id).await?;
                    let item_ids: Vec<Uuid> = items.iter().map(|item| item.id).collect();
                    let existing = user_orders(conn, user_id, &item_ids).await?;

                    let plan = applier::plan_order(user_id, &items, &existing, requested)?;
                    for planned in &plan.changes {
                        apply_order_change(conn, user_id, planned, now).await?;
                    }

                    let orders = user_orders(conn, user_id, &item_ids).await?;
                    Ok((orders, plan.changes.len()))
                }
                .scope_boxed()
            })
            .await?;

        info!(
            "Applied {} order change(s) for user {} on menu {}",
            applied, user_id, menu_id
        );
        Ok(orders)
    }
}
