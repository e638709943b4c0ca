//! Payment record endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use common::OrderId;
use inventory::StockStore;
use orders::{CartClient, OrderStore};
use payment::PaymentStore;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct PaymentResponse {
    pub order_id: String,
    /// `unspecified` when no charge was ever attempted for the order.
    pub state: String,
    pub provider_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// GET /payments/{order_id} — the recorded charge attempt, if any.
pub async fn get<O, C, I, P>(
    State(state): State<Arc<AppState<O, C, I, P>>>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, ApiError>
where
    O: OrderStore,
    C: CartClient,
    I: StockStore,
    P: PaymentStore,
{
    let record = state
        .payments
        .get(OrderId::from_uuid(order_id))
        .await
        .map_err(ApiError::from)?;
    let response = match record {
        Some(record) => PaymentResponse {
            order_id: record.order_id.to_string(),
            state: record.state.as_str().to_string(),
            provider_ref: record.provider_ref,
            updated_at: Some(record.updated_at),
        },
        None => PaymentResponse {
            order_id: order_id.to_string(),
            state: "unspecified".to_string(),
            provider_ref: String::new(),
            updated_at: None,
        },
    };
    Ok(Json(response))
}
