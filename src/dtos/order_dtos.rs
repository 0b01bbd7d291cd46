use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::Result;
use crate::models::{
    activity::ActivityType,
    order::ShippingAddress,
    product::ProductResponse,
};
use crate::services::{
    order_service::NewOrderLine,
    recommendation::{NewActivity, ScoredProduct},
};

pub const DEFAULT_FEED_LIMIT: usize = 20;
pub const MAX_FEED_LIMIT: usize = 100;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddressInput {
    #[validate(length(min = 1, message = "Recipient name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
}

impl From<ShippingAddressInput> for ShippingAddress {
    fn from(input: ShippingAddressInput) -> Self {
        ShippingAddress {
            name: input.name.trim().to_string(),
            phone: input.phone.trim().to_string(),
            city: input.city.trim().to_string(),
            street: input.street.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderLineInput {
    pub product: String,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl OrderLineInput {
    pub fn into_line(self) -> Result<NewOrderLine> {
        Ok(NewOrderLine {
            product: ObjectId::parse_str(self.product.trim())?,
            quantity: self.quantity,
            size: self.size,
            color: self.color,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(alias = "shipping_address")]
    #[validate(nested)]
    pub shipping_address: ShippingAddressInput,
    #[serde(default)]
    pub items: Vec<OrderLineInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
}

impl FeedQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, MAX_FEED_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordActivityRequest {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    #[serde(default, alias = "product_id")]
    pub product_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub search_query: Option<String>,
}

impl RecordActivityRequest {
    pub fn into_activity(self) -> Result<NewActivity> {
        let product_id = self
            .product_id
            .as_deref()
            .map(|id| ObjectId::parse_str(id.trim()))
            .transpose()?;
        Ok(NewActivity {
            kind: self.kind,
            product_id,
            category: self.category,
            search_query: self.search_query,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub product: ProductResponse,
    pub score: f64,
}

impl From<ScoredProduct> for FeedItem {
    fn from(scored: ScoredProduct) -> Self {
        FeedItem {
            product: ProductResponse::from(scored.product),
            score: scored.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feed_limit_defaults_and_clamps() {
        assert_eq!(FeedQuery { limit: None }.limit(), 20);
        assert_eq!(FeedQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(FeedQuery { limit: Some(500) }.limit(), 100);
    }

    #[test]
    fn create_order_request_reads_camel_case() {
        let product = ObjectId::new().to_hex();
        let request: CreateOrderRequest = serde_json::from_value(json!({
            "shippingAddress": { "name": "Amina", "phone": "0712345678", "city": "Nairobi", "street": "Moi Ave" },
            "items": [{ "product": product, "quantity": 2, "size": "M" }]
        }))
        .unwrap();

        assert!(request.validate().is_ok());
        let line = request.items.into_iter().next().unwrap().into_line().unwrap();
        assert_eq!(line.product.to_hex(), product);
        assert_eq!(line.quantity, 2);
        assert_eq!(line.color, None);
    }

    #[test]
    fn blank_address_fields_fail_validation() {
        let request: CreateOrderRequest = serde_json::from_value(json!({
            "shippingAddress": { "name": "", "phone": "0712345678", "city": "Nairobi", "street": "Moi Ave" },
            "items": []
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
