pub mod orders;
pub mod payments;
pub mod products;

use axum::{routing::get, Router};

use crate::handlers::health;
use crate::state::AppState;

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/health", get(health::api_health_check))
        .nest("/api/payments", payments::payment_routes(state.clone()))
        .nest("/api/orders", orders::order_routes(state.clone()))
        .nest("/api/products", products::product_routes(state.clone()))
        .nest("/api/activity", products::activity_routes(state.clone()))
        .with_state(state)
}
