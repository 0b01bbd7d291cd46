use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(AppError::invalid_data(format!("Unknown order status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

pub const CASH_ON_DELIVERY: &str = "Cash on Delivery";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub city: String,
    pub street: String,
}

/// Line item captured at order time; later catalog edits never reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product: ObjectId,
    pub shop: ObjectId,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    pub image: String,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user: ObjectId,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total_amount: f64,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn contains_shop(&self, shop: &ObjectId) -> bool {
        self.items.iter().any(|item| &item.shop == shop)
    }

    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product: String,
    pub shop: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    pub image: String,
    pub size: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user: String,
    pub items: Vec<OrderItemResponse>,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total_amount: f64,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        OrderResponse {
            id: order.id_hex(),
            user: order.user.to_hex(),
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product: item.product.to_hex(),
                    shop: item.shop.to_hex(),
                    name: item.name,
                    price: item.price,
                    quantity: item.quantity,
                    image: item.image,
                    size: item.size,
                    color: item.color,
                })
                .collect(),
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// What anonymous tracking reveals: progress and totals, never the address or items.
#[derive(Debug, Serialize)]
pub struct OrderTrackingResponse {
    pub id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub item_count: usize,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderTrackingResponse {
    fn from(order: Order) -> Self {
        OrderTrackingResponse {
            id: order.id_hex(),
            status: order.status,
            payment_status: order.payment_status,
            item_count: order.items.len(),
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            total_amount: order.total_amount,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}
