//! Order placement and order reads.

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_traits::Zero;
use shared::clock::Clock;
use shared::deadline;
use shared::schedule;
use shared::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::menus::{find_menu, find_provider};
use crate::store::{OrderQuery, Store};

pub struct OrderApplier {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl OrderApplier {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn require_master(identity: &Identity) -> AppResult<()> {
        if identity.role == Role::Master {
            Ok(())
        } else {
            Err(AppError::forbidden("Only masters can place orders"))
        }
    }

    /// Sets the caller's ordered count of each listed dish. Dishes left out of
    /// `items` keep their current orders.
    pub async fn place_order(
        &self,
        identity: &Identity,
        provider_id: Uuid,
        date: &str,
        items: &[ItemCount],
    ) -> AppResult<Vec<Order>> {
        Self::require_master(identity)?;
        let provider = find_provider(self.store.as_ref(), provider_id).await?;
        let menu = find_menu(self.store.as_ref(), &provider, date).await?;
        let now = self.clock.now();
        deadline::ensure_open(&menu, &provider, now)?;

        self.store
            .commit_order(identity.user_id, menu.id, items, now)
            .await
            .inspect_err(|err| {
                if let AppError::Domain(LunchError::InsufficientAvailability(dishes)) = err {
                    warn!(
                        "Order of user {} on menu {} exceeds availability of {} dish(es)",
                        identity.user_id,
                        menu.id,
                        dishes.len()
                    );
                }
            })
    }

    /// The caller's orders on one menu.
    pub async fn menu_orders(
        &self,
        identity: &Identity,
        provider_id: Uuid,
        date: &str,
    ) -> AppResult<Vec<Order>> {
        let provider = find_provider(self.store.as_ref(), provider_id).await?;
        let menu = find_menu(self.store.as_ref(), &provider, date).await?;

        self.store
            .orders(&OrderQuery {
                menu_id: Some(menu.id),
                user_id: Some(identity.user_id),
                ..OrderQuery::default()
            })
            .await
    }

    /// Orders placed with one provider over the caller's local days `from..=to`.
    /// Masters only see their own orders.
    pub async fn provider_history(
        &self,
        identity: &Identity,
        provider_id: Uuid,
        from: &str,
        to: &str,
    ) -> AppResult<Vec<Order>> {
        let user_id = match identity.role {
            Role::Provider if identity.user_id != provider_id => {
                return Err(AppError::forbidden(
                    "Providers can only read their own history",
                ));
            }
            Role::Master => Some(identity.user_id),
            _ => None,
        };
        find_provider(self.store.as_ref(), provider_id).await?;

        let (created_from, created_to) = schedule::day_range(from, to, identity.tz()?)?;
        self.store
            .orders(&OrderQuery {
                provider_id: Some(provider_id),
                user_id,
                created_from: Some(created_from),
                created_to: Some(created_to),
                ..OrderQuery::default()
            })
            .await
    }

    /// The calling master's orders over their local days `from..=to`.
    pub async fn master_history(
        &self,
        identity: &Identity,
        from: &str,
        to: &str,
    ) -> AppResult<Vec<Order>> {
        Self::require_master(identity)?;

        let (created_from, created_to) = schedule::day_range(from, to, identity.tz()?)?;
        self.store
            .orders(&OrderQuery {
                user_id: Some(identity.user_id),
                created_from: Some(created_from),
                created_to: Some(created_to),
                ..OrderQuery::default()
            })
            .await
    }

    /// Weight, calories and price of the master's orders, each multiplied by
    /// the ordered count.
    pub async fn stats(&self, identity: &Identity, from: &str, to: &str) -> AppResult<OrderStats> {
        let orders = self.master_history(identity, from, to).await?;

        let item_ids: Vec<Uuid> = orders.iter().map(|order| order.item_id).collect();
        let items: HashMap<Uuid, MenuItem> = self
            .store
            .items(&item_ids)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        let dish_ids: Vec<Uuid> = items.values().map(|item| item.dish_id).collect();
        let dishes: HashMap<Uuid, Dish> = self
            .store
            .dishes(&dish_ids)
            .await?
            .into_iter()
            .map(|dish| (dish.id, dish))
            .collect();

        let mut stats = OrderStats {
            weight: 0.0,
            calories: 0.0,
            price: BigDecimal::zero(),
        };
        for order in &orders {
            stats.price += &order.price * BigDecimal::from(order.ordered_count);

            let dish = items
                .get(&order.item_id)
                .and_then(|item| dishes.get(&item.dish_id));
            if let Some(dish) = dish {
                stats.weight += dish.weight * order.ordered_count as f64;
                stats.calories += dish.calories * order.ordered_count as f64;
            }
        }

        info!(
            "Computed stats over {} order(s) for user {}",
            orders.len(),
            identity.user_id
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use chrono::{TimeZone, Utc};
    use futures::future::join_all;
    use std::collections::BTreeMap;

    fn count_of(orders: &[Order], item: &MenuItem) -> Option<i64> {
        orders
            .iter()
            .find(|order| order.item_id == item.id)
            .map(|order| order.ordered_count)
    }

    #[tokio::test]
    async fn absolute_counts_create_update_delete() {
        let fx = Fixture::new().await;
        let a = fx.dish(10).await;
        let menu = fx.save(&[(a, 10)]).await;
        let item_a = item(&menu, a).clone();
        let buyer = master();

        let orders = fx.order(&buyer, &[(a, 4)]).await.unwrap();
        assert_eq!(count_of(&orders, &item_a), Some(4));
        assert_eq!(orders[0].created_at, Some(morning()));
        assert_eq!(item(&fx.menu().await, a).available_count, 6);

        let later = fx.later(morning() + chrono::Duration::hours(1));
        let orders = later.order(&buyer, &[(a, 2)]).await.unwrap();
        assert_eq!(count_of(&orders, &item_a), Some(2));
        assert_eq!(orders[0].created_at, Some(morning()));
        assert_eq!(orders[0].updated_at, Some(morning() + chrono::Duration::hours(1)));
        assert_eq!(item(&fx.menu().await, a).available_count, 8);

        let orders = fx.order(&buyer, &[(a, 0)]).await.unwrap();
        assert!(orders.is_empty());
        assert_eq!(item(&fx.menu().await, a).available_count, 10);
    }

    #[tokio::test]
    async fn repeating_an_order_changes_nothing() {
        let fx = Fixture::new().await;
        let a = fx.dish(10).await;
        fx.save(&[(a, 10)]).await;
        let buyer = master();

        let first = fx.order(&buyer, &[(a, 3)]).await.unwrap();
        let second = fx.order(&buyer, &[(a, 3)]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(item(&fx.menu().await, a).available_count, 7);
    }

    #[tokio::test]
    async fn shortage_rejects_whole_batch() {
        let fx = Fixture::new().await;
        let (a, b) = (fx.dish(10).await, fx.dish(20).await);
        fx.save(&[(a, 10), (b, 10)]).await;
        fx.order(&master(), &[(a, 7)]).await.unwrap();
        let buyer = master();

        let err = fx.order(&buyer, &[(a, 5), (b, 1)]).await.unwrap_err();

        match err {
            AppError::Domain(LunchError::InsufficientAvailability(dishes)) => {
                assert_eq!(dishes, BTreeMap::from([(a, 3)]));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let menu = fx.menu().await;
        assert_eq!(item(&menu, a).available_count, 3);
        assert_eq!(item(&menu, b).available_count, 10);
        assert!(fx
            .applier
            .menu_orders(&buyer, fx.provider.id, MENU_DATE)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rejects_unknown_dish_and_bad_counts() {
        let fx = Fixture::new().await;
        let a = fx.dish(10).await;
        fx.save(&[(a, 10)]).await;
        let buyer = master();

        let err = fx.order(&buyer, &[(Uuid::new_v4(), 1)]).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(LunchError::NotFound(_))));

        let err = fx.order(&buyer, &[(a, -1)]).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(LunchError::Validation(_))));

        let err = fx.order(&buyer, &[(a, 1), (a, 2)]).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(LunchError::Validation(_))));
    }

    #[tokio::test]
    async fn only_masters_place_orders() {
        let fx = Fixture::new().await;
        let a = fx.dish(10).await;
        fx.save(&[(a, 10)]).await;

        let err = fx.order(&fx.owner(), &[(a, 1)]).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn deadline_closes_orders_but_not_reads() {
        let fx = Fixture::new().await;
        let a = fx.dish(10).await;
        fx.save(&[(a, 10)]).await;
        let buyer = master();
        fx.order(&buyer, &[(a, 2)]).await.unwrap();

        // 11:00 in Kyiv, deadline was 10:30
        let late = fx.later(Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap());
        let err = late.order(&buyer, &[(a, 1)]).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(LunchError::DeadlinePassed)));

        let menu = late.menu().await;
        assert_eq!(item(&menu, a).available_count, 8);
        let orders = late
            .applier
            .menu_orders(&buyer, fx.provider.id, MENU_DATE)
            .await
            .unwrap();
        assert_eq!(orders.len(), 1);
    }

    #[tokio::test]
    async fn shop_orders_ignore_deadline() {
        let fx = Fixture::shop().await;
        let a = fx.dish(10).await;
        let request = SaveMenuRequest {
            items: counts(&[(a, 5)]),
            ..SaveMenuRequest::default()
        };
        fx.compiler
            .save_menu(&fx.owner(), fx.provider.id, "", &request)
            .await
            .unwrap();

        let later = fx.later(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
        let orders = later
            .applier
            .place_order(&master(), fx.provider.id, "", &counts(&[(a, 5)]))
            .await
            .unwrap();
        assert_eq!(orders[0].ordered_count, 5);
    }

    #[tokio::test]
    async fn concurrent_orders_never_oversell() {
        let fx = Fixture::new().await;
        let a = fx.dish(10).await;
        fx.save(&[(a, 10)]).await;
        let fx = &fx;

        let results = join_all((0..25).map(|_| async move {
            fx.order(&master(), &[(a, 1)]).await
        }))
        .await;

        let placed = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(placed, 10);
        assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|err| matches!(
            err,
            AppError::Domain(LunchError::InsufficientAvailability(_))
        )));

        let menu = fx.menu().await;
        let item = item(&menu, a);
        assert_eq!(item.available_count, 0);
        let orders = fx
            .store
            .orders(&OrderQuery {
                menu_id: Some(menu.id),
                ..OrderQuery::default()
            })
            .await
            .unwrap();
        let committed: i64 = orders.iter().map(|order| order.ordered_count).sum();
        assert_eq!(committed, item.committed_count());
    }

    #[tokio::test]
    async fn history_is_scoped_by_role() {
        let fx = Fixture::new().await;
        let a = fx.dish(10).await;
        fx.save(&[(a, 10)]).await;
        let (alice, bob) = (master(), master());
        fx.order(&alice, &[(a, 2)]).await.unwrap();
        fx.order(&bob, &[(a, 3)]).await.unwrap();

        let (from, to) = ("2024-05-01".to_string(), "2024-05-01".to_string());
        let history = |who: Identity| {
            let (from, to) = (from.clone(), to.clone());
            let applier = &fx.applier;
            let provider_id = fx.provider.id;
            async move { applier.provider_history(&who, provider_id, &from, &to).await }
        };

        assert_eq!(history(fx.owner()).await.unwrap().len(), 2);
        assert_eq!(history(identity(Uuid::new_v4(), Role::Admin)).await.unwrap().len(), 2);
        let own = history(alice.clone()).await.unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].user_id, alice.user_id);

        let err = history(identity(Uuid::new_v4(), Role::Provider))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let next_day = fx
            .applier
            .provider_history(&fx.owner(), fx.provider.id, "2024-05-02", "2024-05-31")
            .await
            .unwrap();
        assert!(next_day.is_empty());
    }

    #[tokio::test]
    async fn master_stats_weight_by_count() {
        let fx = Fixture::new().await;
        let soup = fx.dish_with(30, 0.25, 120.0).await;
        let salad = fx.dish_with(45, 0.2, 80.0).await;
        fx.save(&[(soup, 10), (salad, 10)]).await;
        let buyer = master();
        fx.order(&buyer, &[(soup, 2), (salad, 1)]).await.unwrap();
        fx.order(&master(), &[(soup, 5)]).await.unwrap();

        let (from, to) = ("2024-05-01", "2024-05-01");
        let stats = fx.applier.stats(&buyer, from, to).await.unwrap();

        assert_eq!(stats.price, BigDecimal::from(105));
        assert!((stats.weight - 0.7).abs() < 1e-9);
        assert!((stats.calories - 320.0).abs() < 1e-9);
        assert_eq!(
            fx.applier.master_history(&buyer, from, to).await.unwrap().len(),
            2
        );
    }
}
