//! Shared fixtures for service and API tests.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, TimeZone, Utc};
use shared::clock::FixedClock;
use shared::*;
use uuid::Uuid;

use crate::dishes::DishCatalog;
use crate::menus::MenuCompiler;
use crate::orders::OrderApplier;
use crate::store::{MemoryStore, Store};

pub const TIMEZONE: &str = "Europe/Kyiv";
pub const MENU_DATE: &str = "2024-05-10";

/// 2024-05-01 10:00 in Kyiv.
pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap()
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub catalog: DishCatalog,
    pub compiler: MenuCompiler,
    pub applier: OrderApplier,
    pub provider: Provider,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::at(morning(), false).await
    }

    pub async fn shop() -> Self {
        Self::at(morning(), true).await
    }

    pub async fn at(now: DateTime<Utc>, is_shop: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Provider {
            id: Uuid::new_v4(),
            is_shop,
            timezone: TIMEZONE.to_string(),
        };
        store.insert_provider(provider.clone()).await;

        let clock = Arc::new(FixedClock(now));
        let dyn_store: Arc<dyn Store> = store.clone();
        Self {
            catalog: DishCatalog::new(dyn_store.clone(), clock.clone()),
            compiler: MenuCompiler::new(dyn_store.clone(), clock.clone()),
            applier: OrderApplier::new(dyn_store, clock),
            store,
            provider,
        }
    }

    /// Same store and provider, clock moved to `now`.
    pub fn later(&self, now: DateTime<Utc>) -> Self {
        let clock = Arc::new(FixedClock(now));
        let dyn_store: Arc<dyn Store> = self.store.clone();
        Self {
            catalog: DishCatalog::new(dyn_store.clone(), clock.clone()),
            compiler: MenuCompiler::new(dyn_store.clone(), clock.clone()),
            applier: OrderApplier::new(dyn_store, clock),
            store: self.store.clone(),
            provider: self.provider.clone(),
        }
    }

    pub async fn dish(&self, price: i64) -> Uuid {
        self.dish_with(price, 0.0, 0.0).await
    }

    pub async fn dish_with(&self, price: i64, weight: f64, calories: f64) -> Uuid {
        let dish = Dish {
            id: Uuid::new_v4(),
            provider_id: self.provider.id,
            price: BigDecimal::from(price),
            weight,
            calories,
            is_removed: false,
        };
        let id = dish.id;
        self.store.insert_dish(dish).await;
        id
    }

    pub fn owner(&self) -> Identity {
        identity(self.provider.id, Role::Provider)
    }

    pub fn save_request(&self, items: &[(Uuid, i64)]) -> SaveMenuRequest {
        SaveMenuRequest {
            delivery_time: "13:00".to_string(),
            deadline: format!("{} 10:30", MENU_DATE),
            items: counts(items),
        }
    }

    pub async fn save(&self, items: &[(Uuid, i64)]) -> Menu {
        self.compiler
            .save_menu(&self.owner(), self.provider.id, MENU_DATE, &self.save_request(items))
            .await
            .expect("save menu")
    }

    pub async fn order(&self, master: &Identity, items: &[(Uuid, i64)]) -> crate::error::AppResult<Vec<Order>> {
        self.applier
            .place_order(master, self.provider.id, MENU_DATE, &counts(items))
            .await
    }

    pub async fn menu(&self) -> Menu {
        self.compiler
            .get_menu(self.provider.id, MENU_DATE)
            .await
            .expect("read menu")
    }
}

pub fn identity(user_id: Uuid, role: Role) -> Identity {
    Identity {
        user_id,
        role,
        timezone: TIMEZONE.to_string(),
    }
}

pub fn master() -> Identity {
    identity(Uuid::new_v4(), Role::Master)
}

pub fn counts(items: &[(Uuid, i64)]) -> Vec<ItemCount> {
    items
        .iter()
        .map(|&(dish_id, count)| ItemCount::new(dish_id, count))
        .collect()
}

pub fn item(menu: &Menu, dish_id: Uuid) -> &MenuItem {
    menu.item_for_dish(dish_id).expect("dish on menu")
}
