use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use shared::applier::{self, OrderChange, PlannedChange};
use shared::compiler::{self, MenuPlan};
use shared::ledger::{self, Counts};
use shared::*;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{committed_by_dish, MenuDraft, MenuTarget, OrderQuery, Store};
use crate::error::{AppError, AppResult};

/// Providers and dishes to start a memory store with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub dishes: Vec<Dish>,
}

impl Seed {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    providers: HashMap<Uuid, Provider>,
    dishes: HashMap<Uuid, Dish>,
    /// rows only, `items` stays empty
    menus: Vec<Menu>,
    items: Vec<MenuItem>,
    orders: Vec<Order>,
}

/// Single-process store. One mutex serializes every commit; each commit works
/// on a copy of the tables and replaces them only when all writes succeeded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn seeded(seed: Seed) -> Self {
        let tables = Tables {
            providers: seed.providers.into_iter().map(|p| (p.id, p)).collect(),
            dishes: seed.dishes.into_iter().map(|d| (d.id, d)).collect(),
            ..Tables::default()
        };
        Self {
            tables: Mutex::new(tables),
        }
    }
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_provider(&self, provider: Provider) {
        self.tables.lock().await.providers.insert(provider.id, provider);
    }

    pub async fn insert_dish(&self, dish: Dish) {
        self.tables.lock().await.dishes.insert(dish.id, dish);
    }
}

impl Tables {
    fn items_of(&self, menu_id: Uuid) -> Vec<MenuItem> {
        self.items
            .iter()
            .filter(|item| item.menu_id == menu_id)
            .cloned()
            .collect()
    }

    fn hydrate(&self, menu: &Menu) -> Menu {
        Menu {
            items: self.items_of(menu.id),
            ..menu.clone()
        }
    }

    fn menu_row(&self, menu_id: Uuid) -> AppResult<&Menu> {
        self.menus
            .iter()
            .find(|menu| menu.id == menu_id)
            .ok_or_else(|| LunchError::not_found("Unable to find menu").into())
    }

    fn resolve_menu(&mut self, provider_id: Uuid, target: MenuTarget) -> Uuid {
        let existing = self.menus.iter_mut().find(|menu| {
            menu.provider_id == provider_id
                && match target {
                    MenuTarget::Dated(schedule) => menu.date == schedule.date,
                    MenuTarget::Standing { .. } => true,
                }
        });

        match (existing, target) {
            (Some(menu), MenuTarget::Dated(schedule)) => {
                menu.delivery_time = schedule.delivery_time;
                menu.deadline_at = schedule.deadline_at;
                menu.id
            }
            (Some(menu), MenuTarget::Standing { .. }) => menu.id,
            (None, target) => {
                let (date, delivery_time, deadline_at) = match target {
                    MenuTarget::Dated(s) => (s.date, s.delivery_time, s.deadline_at),
                    MenuTarget::Standing { opened_at } => {
                        (opened_at.date(), opened_at.time(), opened_at)
                    }
                };
                let menu = Menu {
                    id: Uuid::new_v4(),
                    provider_id,
                    date,
                    delivery_time,
                    deadline_at,
                    items: Vec::new(),
                };
                let id = menu.id;
                self.menus.push(menu);
                id
            }
        }
    }

    fn item_mut(&mut self, item_id: Uuid) -> AppResult<&mut MenuItem> {
        self.items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| AppError::Conflict(format!("menu item {} disappeared", item_id)))
    }

    fn apply_menu_plan(&mut self, menu_id: Uuid, plan: &MenuPlan) -> AppResult<()> {
        for removed in &plan.remove {
            let item = self.item_mut(removed.id)?;
            if item.committed_count() != 0 {
                return Err(LunchError::CapacityConflict(
                    [(item.dish_id, item.committed_count())].into(),
                )
                .into());
            }
            self.items.retain(|item| item.id != removed.id);
        }

        for resize in &plan.resize {
            let item = self.item_mut(resize.item_id)?;
            if Counts::from(&*item) != resize.from {
                return Err(AppError::Conflict(format!(
                    "counts of dish {} changed",
                    resize.dish_id
                )));
            }
            let counts = ledger::resize(resize.from, resize.to.initial).map_err(|_| {
                LunchError::CapacityConflict([(resize.dish_id, item.committed_count())].into())
            })?;
            ledger::apply(item, counts);
        }

        for new_item in &plan.create {
            self.items.push(MenuItem::new(
                menu_id,
                new_item.dish_id,
                new_item.price.clone(),
                new_item.count,
            ));
        }

        Ok(())
    }

    fn apply_order_change(
        &mut self,
        user_id: Uuid,
        planned: &PlannedChange,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        match &planned.change {
            OrderChange::Create {
                item_id,
                count,
                price,
            } => {
                if self
                    .orders
                    .iter()
                    .any(|order| order.user_id == user_id && order.item_id == *item_id)
                {
                    return Err(AppError::Conflict(format!(
                        "order for dish {} already exists",
                        planned.dish_id
                    )));
                }
                self.orders
                    .push(Order::new(user_id, *item_id, *count, price.clone(), now));
            }
            OrderChange::Update {
                order_id, from, to, ..
            } => {
                let order = self
                    .orders
                    .iter_mut()
                    .find(|order| order.id == *order_id && order.ordered_count == *from)
                    .ok_or_else(|| {
                        AppError::Conflict(format!("order for dish {} changed", planned.dish_id))
                    })?;
                order.ordered_count = *to;
                order.updated_at = Some(now);
            }
            OrderChange::Delete { order_id, from, .. } => {
                let before = self.orders.len();
                self.orders
                    .retain(|order| !(order.id == *order_id && order.ordered_count == *from));
                if self.orders.len() == before {
                    return Err(AppError::Conflict(format!(
                        "order for dish {} changed",
                        planned.dish_id
                    )));
                }
            }
        }

        let item = self.item_mut(planned.change.item_id())?;
        let counts = ledger::reserve(Counts::from(&*item), planned.change.delta()).map_err(|_| {
            LunchError::InsufficientAvailability([(planned.dish_id, item.available_count)].into())
        })?;
        ledger::apply(item, counts);
        Ok(())
    }

    fn user_orders(&self, user_id: Uuid, menu_id: Uuid) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|order| order.user_id == user_id)
            .filter(|order| {
                self.items
                    .iter()
                    .any(|item| item.id == order.item_id && item.menu_id == menu_id)
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn provider(&self, id: Uuid) -> AppResult<Option<Provider>> {
        Ok(self.tables.lock().await.providers.get(&id).cloned())
    }

    async fn dishes(&self, ids: &[Uuid]) -> AppResult<Vec<Dish>> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.dishes.get(id).cloned())
            .collect())
    }

    async fn save_dish(&self, dish: &Dish, standing: Option<NaiveDateTime>) -> AppResult<Dish> {
        let mut tables = self.tables.lock().await;
        tables.dishes.insert(dish.id, dish.clone());

        if let Some(opened_at) = standing {
            let menu_id = tables.resolve_menu(dish.provider_id, MenuTarget::Standing { opened_at });
            let existing = tables
                .items
                .iter()
                .position(|item| item.menu_id == menu_id && item.dish_id == dish.id);
            match existing {
                Some(index) => tables.items[index].price = dish.price.clone(),
                None => tables
                    .items
                    .push(MenuItem::new(menu_id, dish.id, dish.price.clone(), 0)),
            }
        }

        Ok(dish.clone())
    }

    async fn toggle_dish(&self, provider_id: Uuid, dish_id: Uuid) -> AppResult<Option<Dish>> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .dishes
            .get_mut(&dish_id)
            .filter(|dish| dish.provider_id == provider_id)
            .map(|dish| {
                dish.is_removed = !dish.is_removed;
                dish.clone()
            }))
    }

    async fn menu(&self, provider_id: Uuid, date: Option<NaiveDate>) -> AppResult<Option<Menu>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .menus
            .iter()
            .find(|menu| menu.provider_id == provider_id && date.map_or(true, |d| menu.date == d))
            .map(|menu| tables.hydrate(menu)))
    }

    async fn menus(&self, provider_id: Uuid) -> AppResult<Vec<Menu>> {
        let tables = self.tables.lock().await;
        let mut menus: Vec<Menu> = tables
            .menus
            .iter()
            .filter(|menu| menu.provider_id == provider_id)
            .map(|menu| tables.hydrate(menu))
            .collect();
        menus.sort_by_key(|menu| menu.date);
        Ok(menus)
    }

    async fn items(&self, ids: &[Uuid]) -> AppResult<Vec<MenuItem>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .items
            .iter()
            .filter(|item| ids.contains(&item.id))
            .cloned()
            .collect())
    }

    async fn orders(&self, query: &OrderQuery) -> AppResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        let menu_ids: Vec<Uuid> = tables
            .menus
            .iter()
            .filter(|menu| query.provider_id.map_or(true, |p| menu.provider_id == p))
            .filter(|menu| query.menu_id.map_or(true, |m| menu.id == m))
            .map(|menu| menu.id)
            .collect();

        Ok(tables
            .orders
            .iter()
            .filter(|order| query.matches(order))
            .filter(|order| {
                tables
                    .items
                    .iter()
                    .any(|item| item.id == order.item_id && menu_ids.contains(&item.menu_id))
            })
            .cloned()
            .collect())
    }

    async fn commit_menu(&self, draft: &MenuDraft) -> AppResult<Menu> {
        let mut tables = self.tables.lock().await;
        let mut tx = tables.clone();

        let menu_id = tx.resolve_menu(draft.provider_id, draft.target);
        let current = tx.items_of(menu_id);
        let dishes = draft.dishes.iter().map(|d| (d.id, d.clone())).collect();
        let plan = compiler::plan_menu(draft.provider_id, &current, &draft.requested, &dishes)?;
        tx.apply_menu_plan(menu_id, &plan)?;

        let menu = tx.hydrate(tx.menu_row(menu_id)?);
        *tables = tx;

        info!(
            "Menu {} saved: {} removed, {} resized, {} created",
            menu_id,
            plan.remove.len(),
            plan.resize.len(),
            plan.create.len()
        );
        Ok(menu)
    }

    async fn remove_menu(&self, menu_id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.menu_row(menu_id)?;

        let committed = committed_by_dish(&tables.items_of(menu_id));
        if !committed.is_empty() {
            return Err(LunchError::CapacityConflict(committed).into());
        }

        tables.items.retain(|item| item.menu_id != menu_id);
        tables.menus.retain(|menu| menu.id != menu_id);
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
        let mut tables = self.tables.lock().await;
        let mut tx = tables.clone();

        let items = tx.items_of(menu_id);
        let orders = tx.user_orders(user_id, menu_id);
        let plan = applier::plan_order(user_id, &items, &orders, requested)?;

        for planned in &plan.changes {
            tx.apply_order_change(user_id, planned, now)?;
        }

        let result = tx.user_orders(user_id, menu_id);
        *tables = tx;

        info!(
            "Applied {} order change(s) for user {} on menu {}",
            plan.changes.len(),
            user_id,
            menu_id
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDateTime;
    use std::collections::BTreeMap;

    fn opened_at() -> NaiveDateTime {
        shared::schedule::parse_datetime("2024-05-01 09:00").unwrap()
    }

    #[test]
    fn seed_parses_camel_case_json() {
        let provider_id = Uuid::new_v4();
        let raw = serde_json::json!({
            "providers": [{ "id": provider_id, "isShop": true, "timezone": "Europe/Kyiv" }],
            "dishes": [{ "id": Uuid::new_v4(), "providerId": provider_id, "price": "12.50" }],
        });

        let seed: Seed = serde_json::from_value(raw).unwrap();

        assert!(seed.providers[0].is_shop);
        assert_eq!(seed.dishes[0].price, "12.50".parse::<BigDecimal>().unwrap());
        assert!(!seed.dishes[0].is_removed);
    }

    #[tokio::test]
    async fn failed_commit_leaves_tables_untouched() {
        let provider_id = Uuid::new_v4();
        let dish = Dish {
            id: Uuid::new_v4(),
            provider_id,
            price: BigDecimal::from(5),
            weight: 0.0,
            calories: 0.0,
            is_removed: false,
        };
        let store = MemoryStore::seeded(Seed {
            providers: Vec::new(),
            dishes: vec![dish.clone()],
        });

        let unknown = Uuid::new_v4();
        let draft = MenuDraft {
            provider_id,
            target: MenuTarget::Standing {
                opened_at: opened_at(),
            },
            requested: BTreeMap::from([(dish.id, 3), (unknown, 1)]),
            dishes: vec![dish.clone()],
        };
        assert!(store.commit_menu(&draft).await.is_err());
        assert!(store.menu(provider_id, None).await.unwrap().is_none());

        let draft = MenuDraft {
            requested: BTreeMap::from([(dish.id, 3)]),
            ..draft
        };
        let menu = store.commit_menu(&draft).await.unwrap();
        assert_eq!(menu.date, opened_at().date());

        let user = Uuid::new_v4();
        let result = store
            .commit_order(user, menu.id, &[ItemCount::new(dish.id, 4)], Utc::now())
            .await;
        assert!(matches!(
            result,
            Err(AppError::Domain(LunchError::InsufficientAvailability(_)))
        ));
        assert!(store
            .orders(&OrderQuery::default())
            .await
            .unwrap()
            .is_empty());

        store
            .commit_order(user, menu.id, &[ItemCount::new(dish.id, 3)], Utc::now())
            .await
            .unwrap();
        let err = store.remove_menu(menu.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(LunchError::CapacityConflict(ref dishes)) if dishes[&dish.id] == 3
        ));
    }
}
