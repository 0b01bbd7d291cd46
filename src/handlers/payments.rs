use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use validator::Validate;

use crate::{
    dtos::payment_dtos::{StkPushRequest, StkPushResponse, TransactionResponse},
    errors::Result,
    extractors::ApiJson,
    models::{mpesa_transactions::CallbackData, user::AuthUser},
    services::payment_service::{CallbackOutcome, InitiatePayment},
    state::AppState,
};

pub async fn initiate_stk_push(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<StkPushRequest>,
) -> Result<Json<Value>> {
    payload.validate()?;
    let user_id = user.id;

    let (transaction, accepted) = state
        .payments
        .initiate(
            user_id,
            InitiatePayment {
                phone_number: payload.phone_number,
                amount: payload.amount,
                metadata: payload.metadata,
            },
        )
        .await?;

    info!(
        checkout_request_id = %transaction.checkout_request_id,
        user = %user_id.to_hex(),
        "STK push sent"
    );
    Ok(Json(json!({
        "success": true,
        "message": "STK push sent. Check your phone to complete payment.",
        "data": StkPushResponse::from(accepted),
    })))
}

pub async fn payment_status(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<Json<Value>> {
    let transaction = state.payments.status(checkout_request_id.trim()).await?;
    Ok(Json(json!({
        "success": true,
        "data": TransactionResponse::from(transaction),
    })))
}

/// Provider callback. Always acknowledged with 200; the outcome lives only in
/// the stored transaction.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<CallbackData>(&body) {
        Ok(payload) => {
            let callback = payload.body.stk_callback;
            let checkout_request_id = callback.checkout_request_id.clone();
            info!(
                checkout_request_id = %checkout_request_id,
                code = %callback.result_code,
                "M-Pesa callback received"
            );

            match state.payments.handle_callback(callback).await {
                Ok(CallbackOutcome::Applied(tx)) => {
                    info!(checkout_request_id = %checkout_request_id, status = tx.status.as_str(), "callback applied")
                }
                Ok(CallbackOutcome::AlreadyFinal(tx)) => {
                    info!(checkout_request_id = %checkout_request_id, status = tx.status.as_str(), "callback was a no-op")
                }
                Ok(CallbackOutcome::UnknownTransaction) => {}
                Err(e) => error!(checkout_request_id = %checkout_request_id, error = %e, "callback processing failed"),
            }
        }
        Err(e) => warn!(error = %e, body = %String::from_utf8_lossy(&body), "unreadable M-Pesa callback"),
    }

    Json(json!({
        "ResultCode": 0,
        "ResultDesc": "Success"
    }))
}

pub async fn retry_entitlement(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(checkout_request_id): Path<String>,
) -> Result<Json<Value>> {
    let transaction = state
        .payments
        .retry_entitlement(checkout_request_id.trim(), &user.id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Entitlement applied",
        "data": TransactionResponse::from(transaction),
    })))
}
