//! Menu compilation service.
//!
//! Validates who may change a provider's menus and what schedule a dated menu
//! gets, then hands the requested dish counts to the store, which reconciles
//! them with the persisted items in one transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use shared::clock::Clock;
use shared::compiler;
use shared::schedule::{self, Schedule};
use shared::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{MenuDraft, MenuTarget, Store};

pub(crate) async fn find_provider(store: &dyn Store, provider_id: Uuid) -> AppResult<Provider> {
    store
        .provider(provider_id)
        .await?
        .ok_or_else(|| LunchError::not_found("Unable to find provider").into())
}

/// A shop has a single standing menu, so `date` only matters for other providers.
pub(crate) async fn find_menu(store: &dyn Store, provider: &Provider, date: &str) -> AppResult<Menu> {
    let date = if provider.is_shop {
        None
    } else {
        Some(schedule::parse_date(date)?)
    };

    store
        .menu(provider.id, date)
        .await?
        .ok_or_else(|| LunchError::not_found("Unable to find menu").into())
}

/// Menus and dishes change only by their provider or an admin.
pub(crate) fn authorize(identity: &Identity, provider_id: Uuid) -> AppResult<()> {
    let owns = identity.role == Role::Provider && identity.user_id == provider_id;
    if identity.is_admin() || owns {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "Only the provider or an admin can change its menus and dishes",
        ))
    }
}

pub struct MenuCompiler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl MenuCompiler {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn save_menu(
        &self,
        identity: &Identity,
        provider_id: Uuid,
        date: &str,
        request: &SaveMenuRequest,
    ) -> AppResult<Menu> {
        authorize(identity, provider_id)?;
        let provider = find_provider(self.store.as_ref(), provider_id).await?;
        let requested = compiler::requested_counts(&request.items)?;

        let target = if provider.is_shop {
            MenuTarget::Standing {
                opened_at: self.clock.local_now(provider.tz()?),
            }
        } else {
            let schedule = Schedule::parse(date, &request.delivery_time, &request.deadline)?;
            schedule.validate(self.clock.local_now(provider.tz()?))?;
            MenuTarget::Dated(schedule)
        };

        self.compile(provider_id, target, requested).await
    }

    /// Copies the initial counts of the menu on `date` onto `new_date`.
    pub async fn clone_menu(
        &self,
        identity: &Identity,
        provider_id: Uuid,
        date: &str,
        new_date: &str,
    ) -> AppResult<Menu> {
        authorize(identity, provider_id)?;
        let provider = find_provider(self.store.as_ref(), provider_id).await?;
        if provider.is_shop {
            return Err(LunchError::validation("Shop menus cannot be cloned").into());
        }

        let source = find_menu(self.store.as_ref(), &provider, date).await?;
        let schedule = Schedule {
            date: source.date,
            delivery_time: source.delivery_time,
            deadline_at: source.deadline_at,
        }
        .moved_to(schedule::parse_date(new_date)?)?;
        schedule.validate(self.clock.local_now(provider.tz()?))?;

        let dish_ids: Vec<Uuid> = source.items.iter().map(|item| item.dish_id).collect();
        let dishes: HashMap<Uuid, Dish> = self
            .store
            .dishes(&dish_ids)
            .await?
            .into_iter()
            .map(|dish| (dish.id, dish))
            .collect();
        let counts = compiler::clone_counts(&source.items, &dishes);
        let requested = compiler::requested_counts(&counts)?;

        info!(
            "Cloning menu {} of provider {} to {}",
            source.id, provider_id, schedule.date
        );
        self.compile(provider_id, MenuTarget::Dated(schedule), requested)
            .await
    }

    async fn compile(
        &self,
        provider_id: Uuid,
        target: MenuTarget,
        requested: BTreeMap<Uuid, i64>,
    ) -> AppResult<Menu> {
        let dish_ids: Vec<Uuid> = requested.keys().copied().collect();
        let dishes = self.store.dishes(&dish_ids).await?;

        let draft = MenuDraft {
            provider_id,
            target,
            requested,
            dishes,
        };

        self.store.commit_menu(&draft).await.inspect_err(|err| {
            if let AppError::Domain(LunchError::CapacityConflict(dishes)) = err {
                warn!(
                    "Menu change for provider {} conflicts with orders on {} dish(es)",
                    provider_id,
                    dishes.len()
                );
            }
        })
    }

    pub async fn get_menu(&self, provider_id: Uuid, date: &str) -> AppResult<Menu> {
        let provider = find_provider(self.store.as_ref(), provider_id).await?;
        find_menu(self.store.as_ref(), &provider, date).await
    }

    pub async fn list_menus(&self, provider_id: Uuid) -> AppResult<Vec<Menu>> {
        find_provider(self.store.as_ref(), provider_id).await?;
        self.store.menus(provider_id).await
    }

    pub async fn delete_menu(&self, identity: &Identity, provider_id: Uuid, date: &str) -> AppResult<()> {
        authorize(identity, provider_id)?;
        let provider = find_provider(self.store.as_ref(), provider_id).await?;
        let menu = find_menu(self.store.as_ref(), &provider, date).await?;
        self.store.remove_menu(menu.id).await
    }
}
