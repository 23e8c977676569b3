use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::de::DeserializeOwned;
use shared::clock::Clock;
use shared::*;
use uuid::Uuid;

use crate::dishes::DishCatalog;
use crate::error::{AppError, AppResult};
use crate::menus::MenuCompiler;
use crate::orders::OrderApplier;
use crate::store::Store;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_TIMEZONE_HEADER: &str = "x-user-timezone";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<DishCatalog>,
    pub compiler: Arc<MenuCompiler>,
    pub applier: Arc<OrderApplier>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog: Arc::new(DishCatalog::new(store.clone(), clock.clone())),
            compiler: Arc::new(MenuCompiler::new(store.clone(), clock.clone())),
            applier: Arc::new(OrderApplier::new(store, clock)),
        }
    }
}

/// Caller identity as resolved by the gateway in front of this service.
pub struct Caller(pub Identity);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| parts.headers.get(name).and_then(|h| h.to_str().ok());

        let user_id = header(USER_ID_HEADER)
            .and_then(|value| value.parse::<Uuid>().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing or invalid {}", USER_ID_HEADER)))?;
        let role = header(USER_ROLE_HEADER)
            .and_then(|value| value.parse::<Role>().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(format!("missing or invalid {}", USER_ROLE_HEADER))
            })?;
        let timezone = header(USER_TIMEZONE_HEADER).unwrap_or("UTC").to_string();
        parse_timezone(&timezone)?;

        Ok(Caller(Identity {
            user_id,
            role,
            timezone,
        }))
    }
}

/// JSON request body. Malformed bodies are rejected as validation errors.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/providers/:provider_id/dishes", post(save_dish))
        .route(
            "/providers/:provider_id/dishes/:dish_id",
            delete(toggle_dish),
        )
        .route("/providers/:provider_id/menus", get(list_menus))
        .route(
            "/providers/:provider_id/menus/:date",
            get(get_menu).post(save_menu).delete(delete_menu),
        )
        .route(
            "/providers/:provider_id/menus/:date/clone/:new_date",
            post(clone_menu),
        )
        .route(
            "/providers/:provider_id/menus/:date/orders",
            get(menu_orders).post(place_order),
        )
        .route(
            "/providers/:provider_id/history/:from/:to",
            get(provider_history),
        )
        .route("/masters/history/:from/:to", get(master_history))
        .route("/masters/stats/:from/:to", get(master_stats))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn save_dish(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(provider_id): Path<Uuid>,
    JsonBody(request): JsonBody<SaveDishRequest>,
) -> AppResult<Json<Dish>> {
    let dish = state
        .catalog
        .save_dish(&identity, provider_id, &request)
        .await?;
    Ok(Json(dish))
}

pub async fn toggle_dish(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((provider_id, dish_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Dish>> {
    let dish = state
        .catalog
        .toggle_dish(&identity, provider_id, dish_id)
        .await?;
    Ok(Json(dish))
}

pub async fn list_menus(
    State(state): State<AppState>,
    Path(provider_id): Path<Uuid>,
) -> AppResult<Json<Vec<Menu>>> {
    Ok(Json(state.compiler.list_menus(provider_id).await?))
}

pub async fn get_menu(
    State(state): State<AppState>,
    Path((provider_id, date)): Path<(Uuid, String)>,
) -> AppResult<Json<Menu>> {
    Ok(Json(state.compiler.get_menu(provider_id, &date).await?))
}

pub async fn save_menu(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((provider_id, date)): Path<(Uuid, String)>,
    JsonBody(request): JsonBody<SaveMenuRequest>,
) -> AppResult<Json<Menu>> {
    let menu = state
        .compiler
        .save_menu(&identity, provider_id, &date, &request)
        .await?;
    Ok(Json(menu))
}

pub async fn delete_menu(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((provider_id, date)): Path<(Uuid, String)>,
) -> AppResult<StatusCode> {
    state
        .compiler
        .delete_menu(&identity, provider_id, &date)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clone_menu(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((provider_id, date, new_date)): Path<(Uuid, String, String)>,
) -> AppResult<Json<Menu>> {
    let menu = state
        .compiler
        .clone_menu(&identity, provider_id, &date, &new_date)
        .await?;
    Ok(Json(menu))
}

pub async fn menu_orders(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((provider_id, date)): Path<(Uuid, String)>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state
        .applier
        .menu_orders(&identity, provider_id, &date)
        .await?;
    Ok(Json(orders))
}

pub async fn place_order(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((provider_id, date)): Path<(Uuid, String)>,
    JsonBody(request): JsonBody<PlaceOrderRequest>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state
        .applier
        .place_order(&identity, provider_id, &date, &request.items)
        .await?;
    Ok(Json(orders))
}

pub async fn provider_history(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((provider_id, from, to)): Path<(Uuid, String, String)>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state
        .applier
        .provider_history(&identity, provider_id, &from, &to)
        .await?;
    Ok(Json(orders))
}

pub async fn master_history(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((from, to)): Path<(String, String)>,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(state.applier.master_history(&identity, &from, &to).await?))
}

pub async fn master_stats(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path((from, to)): Path<(String, String)>,
) -> AppResult<Json<OrderStats>> {
    Ok(Json(state.applier.stats(&identity, &from, &to).await?))
}

pub async fn health_check() -> &'static str {
    "OK"
}
