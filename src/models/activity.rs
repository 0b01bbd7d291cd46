use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    View,
    Click,
    Search,
    Wishlist,
    Cart,
    Purchase,
}

impl ActivityType {
    pub fn weight(&self) -> u32 {
        match self {
            ActivityType::View => 1,
            ActivityType::Click => 2,
            ActivityType::Search => 3,
            ActivityType::Wishlist => 5,
            ActivityType::Cart => 7,
            ActivityType::Purchase => 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub product_id: Option<ObjectId>,
    pub category: Option<String>,
    pub search_query: Option<String>,
    pub weight: u32,

    /// Backed by a TTL index, so expired signals disappear on their own.
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        user_id: ObjectId,
        kind: ActivityType,
        product_id: Option<ObjectId>,
        category: Option<String>,
        search_query: Option<String>,
    ) -> Self {
        Activity {
            id: None,
            user_id,
            kind,
            product_id,
            category,
            search_query,
            weight: kind.weight(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_fixed_per_type() {
        let weights: Vec<u32> = [
            ActivityType::View,
            ActivityType::Click,
            ActivityType::Search,
            ActivityType::Wishlist,
            ActivityType::Cart,
            ActivityType::Purchase,
        ]
        .iter()
        .map(ActivityType::weight)
        .collect();
        assert_eq!(weights, vec![1, 2, 3, 5, 7, 10]);

        let activity = Activity::new(ObjectId::new(), ActivityType::Cart, None, None, None);
        assert_eq!(activity.weight, 7);
    }
}
