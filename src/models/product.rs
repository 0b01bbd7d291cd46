use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub shop: ObjectId,
    pub name: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub reviews_count: i64,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(shop: ObjectId, name: impl Into<String>, price: f64, category: impl Into<String>) -> Self {
        Product {
            id: None,
            shop,
            name: name.into(),
            price,
            category: category.into(),
            stock: 1,
            image: String::new(),
            rating: 0.0,
            reviews_count: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub shop: String,
    pub name: String,
    pub price: f64,
    pub category: String,
    pub stock: i64,
    pub image: String,
    pub rating: f64,
    pub reviews_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        ProductResponse {
            id: product.id.map(|id| id.to_hex()).unwrap_or_default(),
            shop: product.shop.to_hex(),
            name: product.name,
            price: product.price,
            category: product.category,
            stock: product.stock,
            image: product.image,
            rating: product.rating,
            reviews_count: product.reviews_count,
            created_at: product.created_at,
        }
    }
}
