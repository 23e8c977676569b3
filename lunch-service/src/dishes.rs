//! Provider dish catalog.

use std::sync::Arc;

use shared::clock::Clock;
use shared::*;
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;
use crate::menus::{authorize, find_provider};
use crate::store::Store;

pub struct DishCatalog {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl DishCatalog {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn owned_dish(&self, provider_id: Uuid, dish_id: Uuid) -> AppResult<Dish> {
        self.store
            .dishes(&[dish_id])
            .await?
            .into_iter()
            .find(|dish| dish.provider_id == provider_id)
            .ok_or_else(|| LunchError::not_found("Unable to find dish").into())
    }

    /// Creates a dish, or updates the one named by `request.id`. A shop also
    /// gets the dish listed on its standing menu, priced like the dish.
    pub async fn save_dish(
        &self,
        identity: &Identity,
        provider_id: Uuid,
        request: &SaveDishRequest,
    ) -> AppResult<Dish> {
        authorize(identity, provider_id)?;
        request.validate()?;
        let provider = find_provider(self.store.as_ref(), provider_id).await?;

        let (id, is_removed) = match request.id {
            Some(id) => (id, self.owned_dish(provider_id, id).await?.is_removed),
            None => (Uuid::new_v4(), false),
        };
        let dish = Dish {
            id,
            provider_id,
            price: request.price.clone(),
            weight: request.weight,
            calories: request.calories,
            is_removed,
        };

        let standing = if provider.is_shop {
            Some(self.clock.local_now(provider.tz()?))
        } else {
            None
        };

        let saved = self.store.save_dish(&dish, standing).await?;
        info!("Dish {} of provider {} saved", saved.id, provider_id);
        Ok(saved)
    }

    /// Removes a dish from future menus, or restores a removed one.
    pub async fn toggle_dish(
        &self,
        identity: &Identity,
        provider_id: Uuid,
        dish_id: Uuid,
    ) -> AppResult<Dish> {
        authorize(identity, provider_id)?;
        find_provider(self.store.as_ref(), provider_id).await?;

        let dish = self
            .store
            .toggle_dish(provider_id, dish_id)
            .await?
            .ok_or_else(|| LunchError::not_found("Unable to find dish"))?;

        info!(
            "Dish {} of provider {} {}",
            dish.id,
            provider_id,
            if dish.is_removed { "removed" } else { "restored" }
        );
        Ok(dish)
    }
}
