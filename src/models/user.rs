use chrono::{DateTime, Months, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Buyer,
    Seller,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub is_premium: bool,
    pub premium_plan: Option<String>,
    #[serde(default, with = "bson::serde_helpers::chrono_datetime_as_bson_datetime_optional")]
    pub premium_until: Option<DateTime<Utc>>,
    /// Checkout-request ids whose premium grant has already been applied.
    #[serde(default)]
    pub premium_activations: Vec<String>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, account_type: AccountType) -> Self {
        let now = Utc::now();
        User {
            id: None,
            name: name.into(),
            email: email.into(),
            account_type,
            is_premium: false,
            premium_plan: None,
            premium_until: None,
            premium_activations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A premium entitlement, keyed so the same payment never grants twice.
#[derive(Debug, Clone)]
pub struct PremiumGrant {
    pub plan_name: String,
    pub premium_until: DateTime<Utc>,
    pub activation_key: String,
}

impl PremiumGrant {
    /// Expiry runs from activation time: one year for annual plans, one month otherwise.
    pub fn starting_at(
        now: DateTime<Utc>,
        plan_name: impl Into<String>,
        is_annual: bool,
        activation_key: impl Into<String>,
    ) -> Self {
        let months = if is_annual { Months::new(12) } else { Months::new(1) };
        PremiumGrant {
            plan_name: plan_name.into(),
            premium_until: now.checked_add_months(months).unwrap_or(DateTime::<Utc>::MAX_UTC),
            activation_key: activation_key.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: String,
    pub exp: usize,
}

/// The authenticated caller, attached to requests by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: ObjectId,
    pub email: String,
}

impl TryFrom<Claims> for AuthUser {
    type Error = bson::oid::Error;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(AuthUser {
            id: ObjectId::parse_str(&claims.sub)?,
            email: claims.email,
        })
    }
}
