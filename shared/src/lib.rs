use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod applier;
pub mod clock;
pub mod compiler;
pub mod deadline;
pub mod error;
pub mod ledger;
pub mod schedule;

pub use error::{LunchError, LunchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Provider,
    Master,
}

impl std::str::FromStr for Role {
    type Err = LunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "provider" => Ok(Role::Provider),
            "master" => Ok(Role::Master),
            other => Err(LunchError::Validation(format!("unknown role: {}", other))),
        }
    }
}

/// A caller already resolved by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub timezone: String,
}

impl Identity {
    pub fn tz(&self) -> LunchResult<Tz> {
        parse_timezone(&self.timezone)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: Uuid,
    pub is_shop: bool,
    pub timezone: String,
}

impl Provider {
    pub fn tz(&self) -> LunchResult<Tz> {
        parse_timezone(&self.timezone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub price: BigDecimal,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub is_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: Uuid,
    pub menu_id: Uuid,
    pub dish_id: Uuid,
    pub price: BigDecimal,
    pub initial_count: i64,
    pub available_count: i64,
}

impl MenuItem {
    pub fn new(menu_id: Uuid, dish_id: Uuid, price: BigDecimal, count: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            menu_id,
            dish_id,
            price,
            initial_count: count,
            available_count: count,
        }
    }

    /// Units already claimed by placed orders.
    pub fn committed_count(&self) -> i64 {
        self.initial_count - self.available_count
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub delivery_time: NaiveTime,
    pub deadline_at: NaiveDateTime,
    pub items: Vec<MenuItem>,
}

impl Menu {
    pub fn item_for_dish(&self, dish_id: Uuid) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.dish_id == dish_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub ordered_count: i64,
    pub price: BigDecimal,
    pub paid: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        user_id: Uuid,
        item_id: Uuid,
        ordered_count: i64,
        price: BigDecimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            item_id,
            ordered_count,
            price,
            paid: false,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCount {
    pub dish_id: Uuid,
    pub count: i64,
}

impl ItemCount {
    pub fn new(dish_id: Uuid, count: i64) -> Self {
        Self { dish_id, count }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMenuRequest {
    #[serde(default)]
    pub delivery_time: String,
    #[serde(default)]
    pub deadline: String,
    pub items: Vec<ItemCount>,
}

/// A provider's dish as submitted for saving. Without `id` a new dish is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDishRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub price: BigDecimal,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub calories: f64,
}

impl SaveDishRequest {
    pub fn validate(&self) -> LunchResult<()> {
        if self.price < BigDecimal::from(0) {
            return Err(LunchError::validation("Dish price cannot be negative"));
        }
        for (name, value) in [("weight", self.weight), ("calories", self.calories)] {
            if !value.is_finite() || value < 0.0 {
                return Err(LunchError::validation(format!("Invalid dish {}", name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub items: Vec<ItemCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub weight: f64,
    pub calories: f64,
    pub price: BigDecimal,
}

pub fn parse_timezone(name: &str) -> LunchResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| LunchError::Validation(format!("unknown timezone: {}", name)))
}
