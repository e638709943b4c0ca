//! Order endpoints: create, read, cancel.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use bus::MemoryBus;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use inventory::StockStore;
use orders::{CartClient, Order, OrderService, OrderStore};
use payment::PaymentStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<O, C, I, P>
where
    O: OrderStore,
    C: CartClient,
    I: StockStore,
    P: PaymentStore,
{
    pub orders: OrderService<O, C, MemoryBus>,
    pub cart: Arc<C>,
    pub stock: Arc<I>,
    pub payments: Arc<P>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub book_id: i64,
    pub title: String,
    pub qty: i64,
    pub unit_cents: i64,
    pub line_cents: i64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: String,
    pub total_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.to_string(),
            status: order.status.as_str().to_string(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    book_id: item.book_id.as_i64(),
                    title: item.title.clone(),
                    qty: item.qty,
                    unit_cents: item.unit_price.cents(),
                    line_cents: item.line_total.cents(),
                })
                .collect(),
            total_cents: order.total.cents(),
        }
    }
}

// -- Handlers --

/// POST /orders — snapshot the user's cart into a new order.
#[tracing::instrument(skip(state, req))]
pub async fn create<O, C, I, P>(
    State(state): State<Arc<AppState<O, C, I, P>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderResponse>), ApiError>
where
    O: OrderStore,
    C: CartClient,
    I: StockStore,
    P: PaymentStore,
{
    let uuid = Uuid::parse_str(&req.user_id)
        .map_err(|e| ApiError::BadRequest(format!("invalid user_id: {e}")))?;
    let order = state.orders.create_order(UserId::from_uuid(uuid)).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(OrderResponse::from(&order)),
    ))
}

/// GET /orders/{id} — current status of an order.
pub async fn get<O, C, I, P>(
    State(state): State<Arc<AppState<O, C, I, P>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderStatusResponse>, ApiError>
where
    O: OrderStore,
    C: CartClient,
    I: StockStore,
    P: PaymentStore,
{
    let order = state.orders.get_order(OrderId::from_uuid(id)).await?;
    Ok(Json(OrderStatusResponse {
        order_id: order.id.to_string(),
        status: order.status.as_str().to_string(),
        total_cents: order.total.cents(),
        updated_at: order.updated_at,
    }))
}

/// POST /orders/{id}/cancel — reject a not-yet-settled order.
#[tracing::instrument(skip(state))]
pub async fn cancel<O, C, I, P>(
    State(state): State<Arc<AppState<O, C, I, P>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderStatusResponse>, ApiError>
where
    O: OrderStore,
    C: CartClient,
    I: StockStore,
    P: PaymentStore,
{
    let order = state.orders.cancel_order(OrderId::from_uuid(id)).await?;
    Ok(Json(OrderStatusResponse {
        order_id: order.id.to_string(),
        status: order.status.as_str().to_string(),
        total_cents: order.total.cents(),
        updated_at: order.updated_at,
    }))
}
