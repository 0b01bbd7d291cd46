use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// One STK push attempt, keyed by the provider's checkout-request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpesaTransaction {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub amount: f64,
    pub phone_number: String,
    pub user_id: Option<ObjectId>,
    pub metadata: Option<serde_json::Value>,
    pub status: TransactionStatus,
    pub result_code: Option<ResultCode>,
    pub result_desc: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    #[serde(default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub transaction_date: Option<DateTime<Utc>>,
    #[serde(default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub entitlement_applied_at: Option<DateTime<Utc>>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl MpesaTransaction {
    pub fn pending(
        merchant_request_id: String,
        checkout_request_id: String,
        amount: f64,
        phone_number: String,
        user_id: ObjectId,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        MpesaTransaction {
            id: None,
            merchant_request_id,
            checkout_request_id,
            amount,
            phone_number,
            user_id: Some(user_id),
            metadata,
            status: TransactionStatus::Pending,
            result_code: None,
            result_desc: None,
            mpesa_receipt_number: None,
            transaction_date: None,
            entitlement_applied_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The purchase this payment was for, if it unlocks an entitlement.
    pub fn purpose(&self) -> Option<PaymentPurpose> {
        self.metadata.as_ref().and_then(PaymentPurpose::from_metadata)
    }
}

/// Provider result code. Callbacks send it as a number and the status query
/// as a string; both land here as the same integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultCode(pub i64);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl<'de> Deserialize<'de> for ResultCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(code) => Ok(ResultCode(code)),
            Raw::Float(code) if code.fract() == 0.0 => Ok(ResultCode(code as i64)),
            Raw::Float(code) => Err(serde::de::Error::custom(format!("non-integer result code {}", code))),
            Raw::Text(text) => text
                .trim()
                .parse()
                .map(ResultCode)
                .map_err(|_| serde::de::Error::custom(format!("invalid result code {:?}", text))),
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentPurpose {
    PremiumUpgrade { plan_name: String, is_annual: bool },
}

impl PaymentPurpose {
    pub fn from_metadata(metadata: &serde_json::Value) -> Option<Self> {
        if metadata.get("type").and_then(|t| t.as_str()) != Some("premium_upgrade") {
            return None;
        }
        let plan_name = metadata
            .get("planName")
            .and_then(|p| p.as_str())
            .unwrap_or("premium")
            .to_string();
        let is_annual = match metadata.get("isAnnual") {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
            _ => false,
        };
        Some(PaymentPurpose::PremiumUpgrade { plan_name, is_annual })
    }
}

/// Terminal outcome written by whichever of callback or poll resolves first.
#[derive(Debug, Clone)]
pub struct Finalization {
    pub status: TransactionStatus,
    pub result_code: ResultCode,
    pub result_desc: String,
    pub mpesa_receipt_number: Option<String>,
    pub settled_at: DateTime<Utc>,
}

impl Finalization {
    pub fn from_result(result_code: ResultCode, result_desc: String, receipt: Option<String>) -> Self {
        let status = if result_code.is_success() {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        Finalization {
            status,
            result_code,
            result_desc,
            mpesa_receipt_number: if result_code.is_success() { receipt } else { None },
            settled_at: Utc::now(),
        }
    }
}

// Callback payload
#[derive(Debug, Deserialize)]
pub struct CallbackData {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: ResultCode,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    pub fn receipt_number(&self) -> Option<String> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == "MpesaReceiptNumber")
            .and_then(|item| match &item.value {
                Some(serde_json::Value::String(receipt)) => Some(receipt.clone()),
                Some(other) if !other.is_null() => Some(other.to_string()),
                _ => None,
            })
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_code_accepts_number_and_string() {
        let from_number: ResultCode = serde_json::from_value(json!(0)).unwrap();
        let from_string: ResultCode = serde_json::from_value(json!("0")).unwrap();
        assert_eq!(from_number, from_string);
        assert!(from_string.is_success());

        let cancelled: ResultCode = serde_json::from_value(json!("1032")).unwrap();
        assert_eq!(cancelled, ResultCode(1032));
        assert!(serde_json::from_value::<ResultCode>(json!("abc")).is_err());
    }

    #[test]
    fn callback_extracts_receipt() {
        let payload = json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            { "Name": "Amount", "Value": 1.00 },
                            { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                            { "Name": "Balance" },
                            { "Name": "PhoneNumber", "Value": 254708374149u64 }
                        ]
                    }
                }
            }
        });
        let data: CallbackData = serde_json::from_value(payload).unwrap();
        assert_eq!(data.body.stk_callback.receipt_number().as_deref(), Some("NLJ7RT61SV"));
    }

    #[test]
    fn premium_purpose_is_parsed_from_metadata() {
        let metadata = json!({ "type": "premium_upgrade", "planName": "Gold", "isAnnual": true });
        assert_eq!(
            PaymentPurpose::from_metadata(&metadata),
            Some(PaymentPurpose::PremiumUpgrade { plan_name: "Gold".into(), is_annual: true })
        );
        assert_eq!(PaymentPurpose::from_metadata(&json!({ "type": "tip" })), None);
    }

    #[test]
    fn failed_finalization_drops_receipt() {
        let outcome = Finalization::from_result(ResultCode(1032), "Cancelled".into(), Some("X".into()));
        assert_eq!(outcome.status, TransactionStatus::Failed);
        assert!(outcome.mpesa_receipt_number.is_none());
    }

    #[test]
    fn settlement_dates_are_stored_as_bson_dates() {
        let mut tx = MpesaTransaction::pending(
            "29115-1".into(),
            "ws_CO_1".into(),
            500.0,
            "254712345678".into(),
            ObjectId::new(),
            None,
        );
        tx.transaction_date = Some(Utc::now());

        let document = bson::to_document(&tx).unwrap();
        assert!(matches!(document.get("transaction_date"), Some(bson::Bson::DateTime(_))));
        assert_eq!(document.get("entitlement_applied_at"), Some(&bson::Bson::Null));

        let mut legacy = document.clone();
        legacy.remove("entitlement_applied_at");
        let restored: MpesaTransaction = bson::from_document(legacy).unwrap();
        assert!(restored.entitlement_applied_at.is_none());
        assert_eq!(
            restored.transaction_date.map(|d| d.timestamp_millis()),
            tx.transaction_date.map(|d| d.timestamp_millis())
        );
    }
}
