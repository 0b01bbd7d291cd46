use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shop {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub owner: ObjectId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_premium: bool,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Shop {
    pub fn new(owner: ObjectId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Shop {
            id: None,
            owner,
            name: name.into(),
            email: email.into(),
            is_verified: false,
            is_premium: false,
            created_at: Utc::now(),
        }
    }
}
