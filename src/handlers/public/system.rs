// handlers/public/system.rs - service descriptor and health

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::manager::DatabaseManager;

/// GET / - Service descriptor
pub async fn root_get() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Demo Hub API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Product demos, share links, leads and feedback for sales teams",
            "endpoints": {
                "health": "/health (public)",
                "public_auth": "/auth/login, /auth/register, /auth/refresh (public - token acquisition)",
                "share": "/share/:token[/leads|/feedback] (public - prospects)",
                "uploads": "/uploads/* (public - media files)",
                "auth": "/api/auth/* (protected)",
                "users": "/api/users[/:id] (protected)",
                "products": "/api/products[/:id] (protected)",
                "demos": "/api/demos[/:id][/status|/media|/assignments|/share-links|/feedback] (protected)",
                "leads": "/api/leads[/:id][/feedback] (protected)",
                "feedback": "/api/feedback[/:id] (protected)",
                "storage": "/api/storage[/:user_id][/limit] (protected)",
                "dashboard": "/api/dashboard (protected)"
            }
        }
    }))
}

/// GET /health - 200 when the database answers, 503 otherwise
pub async fn health_get() -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "Database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable"
                    }
                })),
            )
        }
    }
}
