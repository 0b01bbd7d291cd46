use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::mpesa_transactions::{MpesaTransaction, ResultCode, TransactionStatus};
use crate::services::mpesa_service::PushAccepted;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StkPushRequest {
    #[serde(alias = "phone_number")]
    #[validate(length(min = 9, max = 20, message = "Phone number is required"))]
    pub phone_number: String,

    #[validate(range(exclusive_min = 0.0, message = "Amount must be greater than 0"))]
    pub amount: f64,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct StkPushResponse {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
    pub status: TransactionStatus,
}

impl From<PushAccepted> for StkPushResponse {
    fn from(accepted: PushAccepted) -> Self {
        StkPushResponse {
            merchant_request_id: accepted.merchant_request_id,
            checkout_request_id: accepted.checkout_request_id,
            customer_message: accepted.customer_message,
            status: TransactionStatus::Pending,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub amount: f64,
    pub phone_number: String,
    pub status: TransactionStatus,
    pub result_code: Option<ResultCode>,
    pub result_desc: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub entitlement_applied: bool,
    pub created_at: DateTime<Utc>,
}

impl From<MpesaTransaction> for TransactionResponse {
    fn from(tx: MpesaTransaction) -> Self {
        TransactionResponse {
            checkout_request_id: tx.checkout_request_id,
            merchant_request_id: tx.merchant_request_id,
            amount: tx.amount,
            phone_number: tx.phone_number,
            status: tx.status,
            result_code: tx.result_code,
            result_desc: tx.result_desc,
            mpesa_receipt_number: tx.mpesa_receipt_number,
            transaction_date: tx.transaction_date,
            entitlement_applied: tx.entitlement_applied_at.is_some(),
            created_at: tx.created_at,
        }
    }
}
