use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use soko_api::config::MpesaConfig;
use soko_api::errors::AppError;
use soko_api::models::mpesa_transactions::ResultCode;
use soko_api::services::mpesa_service::{MpesaService, PaymentGateway, QueryOutcome};

const AUTH_PATH: &str = "/oauth/v1/generate";
const PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

fn config(server: &MockServer, tunnel: Option<&str>) -> MpesaConfig {
    MpesaConfig {
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        short_code: "174379".to_string(),
        passkey: "passkey".to_string(),
        environment: "sandbox".to_string(),
        base_url: Some(server.uri()),
        callback_url: "https://api.soko.app/api/payments/callback".to_string(),
        tunnel_url: tunnel.map(str::to_string),
        account_reference: ".Soko Ecommerce".to_string(),
        transaction_desc: "Premium Upgrade".to_string(),
        timeout: Duration::from_secs(5),
    }
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(AUTH_PATH))
        // base64("key:secret")
        .and(header("authorization", "Basic a2V5OnNlY3JldA=="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-123",
            "expires_in": "3599"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn accepted_push_returns_provider_ids_and_prefers_tunnel_callback() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .and(header("authorization", "Bearer tok-123"))
        .and(body_partial_json(json!({
            "BusinessShortCode": "174379",
            "TransactionType": "CustomerPayBillOnline",
            "Amount": 150,
            "PartyA": "254712345678",
            "PhoneNumber": "254712345678",
            "CallBackURL": "https://abc.ngrok.app/api/payments/callback"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let service = MpesaService::new(config(&server, Some("https://abc.ngrok.app/"))).unwrap();
    let accepted = service.initiate_stk_push("0712 345 678", 150).await.unwrap();
    assert_eq!(accepted.checkout_request_id, "ws_CO_191220191020363925");
    assert_eq!(accepted.merchant_request_id, "29115-34620561-1");
    assert_eq!(accepted.phone_number, "254712345678");

    // Second push reuses the cached token.
    service.initiate_stk_push("+254712345678", 150).await.unwrap();
}

#[tokio::test]
async fn declined_push_is_rejected() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ResponseCode": "1",
            "ResponseDescription": "Unable to lock subscriber"
        })))
        .mount(&server)
        .await;

    let service = MpesaService::new(config(&server, None)).unwrap();
    let err = service.initiate_stk_push("0712345678", 10).await.unwrap_err();
    assert!(matches!(err, AppError::PaymentRejected(ref reason) if reason == "Unable to lock subscriber"));
}

#[tokio::test]
async fn provider_outage_on_push_is_retryable() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let service = MpesaService::new(config(&server, None)).unwrap();
    let err = service.initiate_stk_push("0712345678", 10).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn token_failure_stops_before_the_push() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(AUTH_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errorCode": "400.008.01",
            "errorMessage": "Invalid Authentication passed"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let service = MpesaService::new(config(&server, None)).unwrap();
    let err = service.initiate_stk_push("0712345678", 10).await.unwrap_err();
    assert!(matches!(err, AppError::ExternalApi(_)));
}

#[tokio::test]
async fn invalid_phone_never_calls_the_provider() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;

    let service = MpesaService::new(config(&server, None)).unwrap();
    let err = service.initiate_stk_push("12345", 10).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn query_normalizes_string_result_code() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({ "CheckoutRequestID": "ws_CO_1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ResponseCode": "0",
            "ResponseDescription": "The service request has been accepted successsfully",
            "MerchantRequestID": "22205-34066-1",
            "CheckoutRequestID": "ws_CO_1",
            "ResultCode": "0",
            "ResultDesc": "The service request is processed successfully."
        })))
        .mount(&server)
        .await;

    let service = MpesaService::new(config(&server, None)).unwrap();
    let outcome = service.query_stk_status("ws_CO_1").await.unwrap();
    assert_eq!(
        outcome,
        QueryOutcome::Resolved {
            result_code: ResultCode::SUCCESS,
            result_desc: "The service request is processed successfully.".to_string(),
        }
    );
}

#[tokio::test]
async fn query_still_processing_is_pending() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "requestId": "ws_CO_1",
            "errorCode": "500.001.1001",
            "errorMessage": "The transaction is being processed"
        })))
        .mount(&server)
        .await;

    let service = MpesaService::new(config(&server, None)).unwrap();
    let outcome = service.query_stk_status("ws_CO_1").await.unwrap();
    assert_eq!(
        outcome,
        QueryOutcome::Pending {
            reason: "The transaction is being processed (500.001.1001)".to_string()
        }
    );
}
