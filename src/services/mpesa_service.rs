// services/mpesa_service.rs
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::MpesaConfig;
use crate::errors::{AppError, Result};
use crate::models::mpesa_transactions::ResultCode;

/// The mobile-money provider as seen by the payment flows.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_stk_push(&self, phone_number: &str, amount: u64) -> Result<PushAccepted>;

    /// Asks the provider what became of a push. Transport failures are errors;
    /// answers that do not settle the payment come back as `QueryOutcome::Pending`.
    async fn query_stk_status(&self, checkout_request_id: &str) -> Result<QueryOutcome>;
}

#[derive(Debug, Clone)]
pub struct PushAccepted {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub phone_number: String,
    pub customer_message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Resolved { result_code: ResultCode, result_desc: String },
    Pending { reason: String },
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: u64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: ResultCode,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

#[derive(Debug, Serialize)]
pub struct StkQueryRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode", default)]
    pub response_code: Option<ResultCode>,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<ResultCode>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
}

/// Error body the provider returns with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

impl ProviderError {
    fn describe(body: &str) -> String {
        match serde_json::from_str::<ProviderError>(body) {
            Ok(ProviderError { error_code, error_message: Some(message) }) => match error_code {
                Some(code) => format!("{} ({})", message, code),
                None => message,
            },
            _ => body.chars().take(200).collect(),
        }
    }
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct MpesaService {
    config: MpesaConfig,
    client: Client,
    cached_token: RwLock<Option<CachedToken>>,
}

impl MpesaService {
    pub fn new(config: MpesaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MpesaService {
            config,
            client,
            cached_token: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    fn generate_password(&self, timestamp: &str) -> String {
        generate_password(&self.config.short_code, &self.config.passkey, timestamp)
    }

    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.expires_at > Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(cached.token.clone());
                }
            }
        }

        info!("Requesting new M-Pesa access token");
        let auth_string = format!("{}:{}", self.config.consumer_key, self.config.consumer_secret);
        let encoded_auth = base64.encode(auth_string);

        let response = self
            .client
            .get(self.config.auth_url())
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "Failed to get M-Pesa access token");
            return Err(AppError::external_api(format!(
                "Failed to generate M-Pesa access token: {}",
                status
            )));
        }

        let auth_response: AuthResponse = response.json().await?;
        let lifetime = auth_response
            .expires_in
            .as_deref()
            .and_then(|secs| secs.trim().parse::<i64>().ok())
            .unwrap_or(3599);

        *self.cached_token.write().await = Some(CachedToken {
            token: auth_response.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        });

        Ok(auth_response.access_token)
    }
}

#[async_trait]
impl PaymentGateway for MpesaService {
    async fn initiate_stk_push(&self, phone_number: &str, amount: u64) -> Result<PushAccepted> {
        let formatted_phone = normalize_phone(phone_number)?;
        info!(phone = %formatted_phone, amount, "C2B: initiating STK push");

        let access_token = self.get_access_token().await?;
        let timestamp = mpesa_timestamp(Utc::now());

        let stk_request = StkPushRequest {
            business_short_code: self.config.short_code.clone(),
            password: self.generate_password(&timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount,
            party_a: formatted_phone.clone(),
            party_b: self.config.short_code.clone(),
            phone_number: formatted_phone.clone(),
            callback_url: self.config.callback_url(),
            account_reference: self.config.account_reference.clone(),
            transaction_desc: self.config.transaction_desc.clone(),
        };

        let response = self
            .client
            .post(self.config.stk_push_url())
            .bearer_auth(&access_token)
            .json(&stk_request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "C2B: STK push failed");
            let reason = ProviderError::describe(&body);
            return Err(if status.is_client_error() {
                AppError::PaymentRejected(reason)
            } else {
                AppError::external_api(format!("STK push failed: {} {}", status, reason))
            });
        }

        let stk_response: StkPushResponse = response.json().await?;
        if !stk_response.response_code.is_success() {
            warn!(
                code = %stk_response.response_code,
                description = %stk_response.response_description,
                "C2B: provider declined STK push"
            );
            let reason = if stk_response.response_description.is_empty() {
                "Failed to initiate STK Push".to_string()
            } else {
                stk_response.response_description
            };
            return Err(AppError::PaymentRejected(reason));
        }
        if stk_response.checkout_request_id.is_empty() {
            return Err(AppError::external_api("STK push accepted without a CheckoutRequestID"));
        }

        info!(
            checkout_request_id = %stk_response.checkout_request_id,
            merchant_request_id = %stk_response.merchant_request_id,
            "C2B: STK push accepted"
        );
        Ok(PushAccepted {
            merchant_request_id: stk_response.merchant_request_id,
            checkout_request_id: stk_response.checkout_request_id,
            phone_number: formatted_phone,
            customer_message: stk_response.customer_message,
        })
    }

    async fn query_stk_status(&self, checkout_request_id: &str) -> Result<QueryOutcome> {
        let access_token = self.get_access_token().await?;
        let timestamp = mpesa_timestamp(Utc::now());

        let query = StkQueryRequest {
            business_short_code: self.config.short_code.clone(),
            password: self.generate_password(&timestamp),
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };

        let response = self
            .client
            .post(self.config.stk_query_url())
            .bearer_auth(&access_token)
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // The provider answers 500 while the customer has not yet acted on the prompt.
            let reason = ProviderError::describe(&body);
            if status == StatusCode::INTERNAL_SERVER_ERROR || status.is_client_error() {
                return Ok(QueryOutcome::Pending { reason });
            }
            return Err(AppError::external_api(format!("STK query failed: {} {}", status, reason)));
        }

        let parsed: StkQueryResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::external_api(format!("Malformed STK query response: {}", e)))?;
        Ok(interpret_query(parsed))
    }
}

fn interpret_query(response: StkQueryResponse) -> QueryOutcome {
    match (response.response_code, response.result_code) {
        (Some(code), Some(result_code)) if code.is_success() => QueryOutcome::Resolved {
            result_code,
            result_desc: response.result_desc.unwrap_or_default(),
        },
        _ => QueryOutcome::Pending {
            reason: response
                .response_description
                .or(response.result_desc)
                .unwrap_or_else(|| "No result yet".to_string()),
        },
    }
}

/// `YYYYMMDDHHmmss`, the format the provider signs passwords with.
pub fn mpesa_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

pub fn generate_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    base64.encode(format!("{}{}{}", short_code, passkey, timestamp))
}

/// Canonicalises a Kenyan mobile number to `254XXXXXXXXX`.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    let local = if let Some(rest) = compact.strip_prefix("+254") {
        format!("254{}", rest)
    } else if let Some(rest) = compact.strip_prefix('0') {
        format!("254{}", rest)
    } else {
        compact
    };
    let phone = if local.starts_with("254") { local } else { format!("254{}", local) };

    if phone.len() != 12 || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::invalid_data(format!("Invalid phone number: {}", raw)));
    }
    Ok(phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use chrono::TimeZone;

    #[test]
    fn phone_numbers_are_canonicalised() {
        for raw in ["0712345678", "712345678", "+254712345678", "254712345678", "0712 345 678"] {
            assert_eq!(normalize_phone(raw).unwrap(), "254712345678", "input {}", raw);
        }
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("07123abc78").is_err());
    }

    #[test]
    fn timestamp_and_password_match_provider_format() {
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap();
        let timestamp = mpesa_timestamp(now);
        assert_eq!(timestamp, "20260307090502");

        let password = generate_password("174379", "passkey", &timestamp);
        let decoded = base64.decode(password).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "174379passkey20260307090502");
    }

    #[test]
    fn query_with_string_result_code_resolves() {
        let response: StkQueryResponse = serde_json::from_value(serde_json::json!({
            "ResponseCode": "0",
            "ResponseDescription": "The service request has been accepted successsfully",
            "MerchantRequestID": "22205-34066-1",
            "CheckoutRequestID": "ws_CO_13012021093521236557",
            "ResultCode": "1032",
            "ResultDesc": "Request cancelled by user"
        }))
        .unwrap();
        assert_eq!(
            interpret_query(response),
            QueryOutcome::Resolved {
                result_code: ResultCode(1032),
                result_desc: "Request cancelled by user".into()
            }
        );
    }

    #[test]
    fn query_without_result_code_stays_pending() {
        let response: StkQueryResponse =
            serde_json::from_value(serde_json::json!({ "ResponseCode": "0" })).unwrap();
        assert!(matches!(interpret_query(response), QueryOutcome::Pending { .. }));
    }
}
