use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::providers)]
pub struct DbProvider {
    pub id: Uuid,
    pub is_shop: bool,
    pub timezone: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::dishes)]
pub struct DbDish {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub price: BigDecimal,
    pub weight: f64,
    pub calories: f64,
    pub is_removed: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::dishes)]
pub struct NewDish {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub price: BigDecimal,
    pub weight: f64,
    pub calories: f64,
    pub is_removed: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::menus)]
pub struct DbMenu {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub delivery_time: NaiveTime,
    pub deadline_at: NaiveDateTime,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::menus)]
pub struct NewMenu {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub delivery_time: NaiveTime,
    pub deadline_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::menu_items)]
pub struct DbMenuItem {
    pub id: Uuid,
    pub menu_id: Uuid,
    pub dish_id: Uuid,
    pub initial_count: i64,
    pub available_count: i64,
    pub price: BigDecimal,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::menu_items)]
pub struct NewMenuItem {
    pub id: Uuid,
    pub menu_id: Uuid,
    pub dish_id: Uuid,
    pub initial_count: i64,
    pub available_count: i64,
    pub price: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::orders)]
pub struct DbOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub ordered_count: i64,
    pub price: BigDecimal,
    pub paid: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub ordered_count: i64,
    pub price: BigDecimal,
    pub paid: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<DbProvider> for Provider {
    fn from(row: DbProvider) -> Self {
        Self {
            id: row.id,
            is_shop: row.is_shop,
            timezone: row.timezone,
        }
    }
}

impl From<DbDish> for Dish {
    fn from(row: DbDish) -> Self {
        Self {
            id: row.id,
            provider_id: row.provider_id,
            price: row.price,
            weight: row.weight,
            calories: row.calories,
            is_removed: row.is_removed,
        }
    }
}

impl From<&Dish> for NewDish {
    fn from(dish: &Dish) -> Self {
        Self {
            id: dish.id,
            provider_id: dish.provider_id,
            price: dish.price.clone(),
            weight: dish.weight,
            calories: dish.calories,
            is_removed: dish.is_removed,
        }
    }
}

impl From<DbMenuItem> for MenuItem {
    fn from(row: DbMenuItem) -> Self {
        Self {
            id: row.id,
            menu_id: row.menu_id,
            dish_id: row.dish_id,
            price: row.price,
            initial_count: row.initial_count,
            available_count: row.available_count,
        }
    }
}

impl From<DbOrder> for Order {
    fn from(row: DbOrder) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            item_id: row.item_id,
            ordered_count: row.ordered_count,
            price: row.price,
            paid: row.paid,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl DbMenu {
    pub fn hydrate(self, items: Vec<MenuItem>) -> Menu {
        Menu {
            id: self.id,
            provider_id: self.provider_id,
            date: self.date,
            delivery_time: self.delivery_time,
            deadline_at: self.deadline_at,
            items,
        }
    }
}

impl NewMenuItem {
    pub fn planned(menu_id: Uuid, item: &compiler::NewItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            menu_id,
            dish_id: item.dish_id,
            initial_count: item.count,
            available_count: item.count,
            price: item.price.clone(),
        }
    }
}

impl From<&Order> for NewOrder {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            item_id: order.item_id,
            ordered_count: order.ordered_count,
            price: order.price.clone(),
            paid: order.paid,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}
