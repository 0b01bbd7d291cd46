use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};

use crate::{handlers::orders::*, middleware::auth::require_auth, state::AppState};

pub fn order_routes(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/track/:reference", get(track_order));

    let protected = Router::new()
        .route("/", post(create_order))
        .route("/mine", get(my_orders))
        .route("/seller", get(seller_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(update_order_status))
        .route("/:id/cancel", patch(cancel_order))
        .route_layer(from_fn_with_state(state, require_auth));

    public.merge(protected)
}
