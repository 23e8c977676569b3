//! Order application planning.
//!
//! A request carries the absolute count a user wants of each dish. Against a
//! snapshot of the menu's items and the user's existing orders, every dish is
//! turned into an [`OrderChange`] and its delta is checked with the ledger. The
//! batch is rejected as a whole when any dish does not fit.

use std::collections::{BTreeMap, HashMap};

use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::compiler::requested_counts;
use crate::ledger::{self, Counts};
use crate::{ItemCount, LunchError, LunchResult, MenuItem, Order};

#[derive(Debug, Clone, PartialEq)]
pub enum OrderChange {
    Create {
        item_id: Uuid,
        count: i64,
        price: BigDecimal,
    },
    Update {
        order_id: Uuid,
        item_id: Uuid,
        from: i64,
        to: i64,
    },
    Delete {
        order_id: Uuid,
        item_id: Uuid,
        from: i64,
    },
}

impl OrderChange {
    pub fn item_id(&self) -> Uuid {
        match self {
            OrderChange::Create { item_id, .. }
            | OrderChange::Update { item_id, .. }
            | OrderChange::Delete { item_id, .. } => *item_id,
        }
    }

    /// Units taken from the item's available pool; negative when returned.
    pub fn delta(&self) -> i64 {
        match self {
            OrderChange::Create { count, .. } => *count,
            OrderChange::Update { from, to, .. } => to - from,
            OrderChange::Delete { from, .. } => -from,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    pub dish_id: Uuid,
    pub change: OrderChange,
    /// Item counters the change was validated against.
    pub before: Counts,
    pub after: Counts,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPlan {
    pub changes: Vec<PlannedChange>,
}

impl OrderPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// What a single dish request means for the user's order on `item`.
fn change_for(
    item: &MenuItem,
    existing: Option<&Order>,
    new_count: i64,
) -> Option<OrderChange> {
    let old_count = existing.map(|order| order.ordered_count).unwrap_or(0);

    match (existing, new_count) {
        (None, 0) => None,
        (None, count) => Some(OrderChange::Create {
            item_id: item.id,
            count,
            price: item.price.clone(),
        }),
        (Some(order), 0) => Some(OrderChange::Delete {
            order_id: order.id,
            item_id: item.id,
            from: old_count,
        }),
        (Some(_), count) if count == old_count => None,
        (Some(order), count) => Some(OrderChange::Update {
            order_id: order.id,
            item_id: item.id,
            from: old_count,
            to: count,
        }),
    }
}

/// Plans `requested` for `user_id`. `items` are the menu's items and `orders`
/// the user's orders on them, both read in the same snapshot.
pub fn plan_order(
    user_id: Uuid,
    items: &[MenuItem],
    orders: &[Order],
    requested: &[ItemCount],
) -> LunchResult<OrderPlan> {
    let requested = requested_counts(requested)?;

    let by_dish: HashMap<Uuid, &MenuItem> = items.iter().map(|item| (item.dish_id, item)).collect();
    let by_item: HashMap<Uuid, &Order> = orders
        .iter()
        .filter(|order| order.user_id == user_id)
        .map(|order| (order.item_id, order))
        .collect();

    let mut shortages = BTreeMap::new();
    let mut plan = OrderPlan::default();

    for (dish_id, new_count) in requested {
        let item = by_dish.get(&dish_id).ok_or_else(|| {
            LunchError::not_found(format!("Dish {} is not on this menu", dish_id))
        })?;

        let Some(change) = change_for(item, by_item.get(&item.id).copied(), new_count)
        else {
            continue;
        };

        let before = Counts::from(*item);
        match ledger::reserve(before, change.delta()) {
            Ok(after) => plan.changes.push(PlannedChange {
                dish_id,
                change,
                before,
                after,
            }),
            Err(_) => {
                shortages.insert(dish_id, item.available_count);
            }
        }
    }

    if !shortages.is_empty() {
        return Err(LunchError::InsufficientAvailability(shortages));
    }

    Ok(plan)
}
