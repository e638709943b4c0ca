//! Stock availability endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use common::BookId;
use inventory::StockStore;
use orders::{CartClient, OrderStore};
use payment::PaymentStore;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    /// Comma-separated book ids; absent means the whole ledger.
    pub book_ids: Option<String>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub availability: BTreeMap<i64, i64>,
}

/// GET /inventory/availability — sellable quantity per book.
pub async fn availability<O, C, I, P>(
    State(state): State<Arc<AppState<O, C, I, P>>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError>
where
    O: OrderStore,
    C: CartClient,
    I: StockStore,
    P: PaymentStore,
{
    let mut book_ids = Vec::new();
    if let Some(raw) = query.book_ids.as_deref() {
        for part in raw.split(',').filter(|p| !p.is_empty()) {
            let id: i64 = part
                .trim()
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid book id: {part:?}")))?;
            book_ids.push(BookId::new(id));
        }
    }

    let levels = state.stock.availability(&book_ids).await?;
    Ok(Json(AvailabilityResponse {
        availability: levels
            .into_iter()
            .map(|(id, qty)| (id.as_i64(), qty))
            .collect(),
    }))
}
