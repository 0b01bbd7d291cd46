use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::{
    handlers::payments::*,
    middleware::auth::require_auth,
    state::AppState,
};

pub fn payment_routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/callback", post(mpesa_callback))
        .route("/status/:checkout_request_id", get(payment_status));

    let protected = Router::new()
        .route("/stk-push", post(initiate_stk_push))
        .route("/entitlements/:checkout_request_id/retry", post(retry_entitlement))
        .route_layer(from_fn_with_state(state, require_auth));

    public.merge(protected)
}
