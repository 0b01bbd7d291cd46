use axum::{extract::State, response::Json};
use mongodb::bson::doc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    let database = match &state.db {
        Some(db) => match db.run_command(doc! { "ping": 1 }).await {
            Ok(_) => "connected",
            Err(e) => {
                tracing::warn!(error = %e, "database ping failed");
                "disconnected"
            }
        },
        None => "memory",
    };

    Json(json!({
        "status": "healthy",
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
