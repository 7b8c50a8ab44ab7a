// handlers/public/mod.rs - Public handlers (no session required)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::api::AppState;
use crate::database::DatabaseManager;

/// GET / - service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": "Bridge Server",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Study management API: accounts, upload schemas, consents and templates",
        "type": "ServiceInfo",
    }))
}

/// GET /health - liveness, plus a database ping when running on PostgreSQL
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    let Some(pool) = state.pool.as_ref() else {
        return (
            StatusCode::OK,
            Json(json!({ "status": "ok", "timestamp": now, "database": "memory", "type": "HealthStatus" })),
        );
    };

    match DatabaseManager::health_check(pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "timestamp": now, "database": "ok", "type": "HealthStatus" })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "timestamp": now, "database": "unavailable", "type": "HealthStatus" })),
            )
        }
    }
}
