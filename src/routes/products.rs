use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::{
    handlers::feed::*,
    middleware::auth::{optional_auth, require_auth},
    state::AppState,
};

pub fn product_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/feed", get(product_feed))
        .route_layer(from_fn_with_state(state, optional_auth))
}

pub fn activity_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(record_activity))
        .route_layer(from_fn_with_state(state, require_auth))
}
