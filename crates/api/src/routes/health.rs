//! Liveness probe.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
}

/// GET /health — answers as long as the process serves requests.
pub async fn check() -> Json<Health> {
    Json(Health {
        status: "ok",
        service: "bookstore-api",
    })
}
