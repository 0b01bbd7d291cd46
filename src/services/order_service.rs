use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::stores::{CatalogStore, IdentityStore, OrderStore};
use crate::database::Stores;
use crate::errors::{AppError, Result};
use crate::models::order::{
    Order, OrderItem, OrderStatus, PaymentStatus, ShippingAddress, CASH_ON_DELIVERY,
};
use crate::models::shop::Shop;
use crate::services::notifier::{Email, Outbox};
use crate::services::shipping::shipping_fee;

pub const MIN_TRACKING_SUFFIX: usize = 4;
pub const MAX_TRACKING_SUFFIX: usize = 12;

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product: ObjectId,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
}

pub struct OrderService {
    catalog: Arc<dyn CatalogStore>,
    orders: Arc<dyn OrderStore>,
    identity: Arc<dyn IdentityStore>,
    outbox: Outbox,
}

impl OrderService {
    pub fn new(stores: &Stores, outbox: Outbox) -> Self {
        OrderService {
            catalog: stores.catalog.clone(),
            orders: stores.orders.clone(),
            identity: stores.identity.clone(),
            outbox,
        }
    }

    /// Prices every line from the catalog, adds shipping, stores the order and
    /// clears the buyer's cart, then queues buyer and per-seller confirmations.
    pub async fn create_order(
        &self,
        user_id: ObjectId,
        shipping_address: ShippingAddress,
        lines: Vec<NewOrderLine>,
    ) -> Result<Order> {
        if lines.is_empty() {
            return Err(AppError::invalid_data("No items in order"));
        }
        if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
            return Err(AppError::invalid_data(format!(
                "Quantity for product {} must be at least 1",
                line.product.to_hex()
            )));
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .catalog
                .find_product(&line.product)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Product {}", line.product.to_hex())))?;

            items.push(OrderItem {
                product: line.product,
                shop: product.shop,
                name: product.name,
                price: product.price,
                quantity: line.quantity,
                image: product.image,
                size: line.size,
                color: line.color,
            });
        }

        let subtotal: f64 = items.iter().map(OrderItem::line_total).sum();
        let fee = shipping_fee(subtotal);
        let now = Utc::now();

        let order = Order {
            id: None,
            user: user_id,
            items,
            subtotal,
            shipping_fee: fee,
            total_amount: subtotal + fee,
            shipping_address,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: CASH_ON_DELIVERY.to_string(),
            created_at: now,
            updated_at: now,
        };

        let order = self.orders.create_and_clear_cart(order).await?;
        info!(
            order_id = %order.id_hex(),
            subtotal = order.subtotal,
            shipping_fee = order.shipping_fee,
            total = order.total_amount,
            "order placed"
        );

        self.queue_confirmations(&order).await;
        Ok(order)
    }

    /// Full order details, visible to the buyer and to sellers with items in it.
    pub async fn get_order(&self, viewer: &ObjectId, id: &str) -> Result<Order> {
        let id = ObjectId::parse_str(id.trim())?;
        let order = self
            .orders
            .find_by_id(&id)
            .await?
            .ok_or_else(|| AppError::not_found("Order"))?;
        if &order.user == viewer {
            return Ok(order);
        }

        let sells_into = match self.catalog.find_shop_by_owner(viewer).await? {
            Some(Shop { id: Some(shop_id), .. }) => order.contains_shop(&shop_id),
            _ => false,
        };
        if !sells_into {
            return Err(AppError::forbidden("Order belongs to another user"));
        }
        Ok(order)
    }

    /// Looks an order up by its full id or by a short, case-insensitive suffix of it.
    /// A suffix that matches more than one order is treated as not found.
    pub async fn track(&self, reference: &str) -> Result<Order> {
        let reference = reference.trim();
        if let Ok(id) = ObjectId::parse_str(reference) {
            return self
                .orders
                .find_by_id(&id)
                .await?
                .ok_or_else(|| AppError::not_found("Order"));
        }

        let length = reference.chars().count();
        if !(MIN_TRACKING_SUFFIX..=MAX_TRACKING_SUFFIX).contains(&length)
            || !reference.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(AppError::invalid_data(format!(
                "Tracking reference must be {} to {} letters or digits",
                MIN_TRACKING_SUFFIX, MAX_TRACKING_SUFFIX
            )));
        }
        if !reference.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AppError::not_found("Order"));
        }

        let mut matches = self.orders.find_by_id_suffix(reference, 2).await?;
        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(AppError::not_found("Order")),
            _ => {
                warn!(reference = %reference, "ambiguous tracking reference");
                Err(AppError::not_found("Order"))
            }
        }
    }

    pub async fn orders_for_user(&self, user_id: &ObjectId) -> Result<Vec<Order>> {
        self.orders.find_by_user(user_id).await
    }

    /// Orders containing at least one item from the caller's shop.
    pub async fn orders_for_seller(&self, owner: &ObjectId) -> Result<Vec<Order>> {
        match self.catalog.find_shop_by_owner(owner).await? {
            Some(Shop { id: Some(shop_id), .. }) => self.orders.find_by_shop(&shop_id).await,
            _ => Ok(Vec::new()),
        }
    }

    pub async fn update_status(&self, seller: &ObjectId, order_id: &str, status: OrderStatus) -> Result<Order> {
        let order_id = ObjectId::parse_str(order_id.trim())?;

        let shop_id = self
            .catalog
            .find_shop_by_owner(seller)
            .await?
            .and_then(|shop| shop.id)
            .ok_or_else(|| AppError::forbidden("Only shop owners can update order status"))?;

        let order = self
            .orders
            .find_by_id(&order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order"))?;
        if !order.contains_shop(&shop_id) {
            return Err(AppError::forbidden("Order does not belong to your shop"));
        }

        let updated = self
            .orders
            .update_status(&order_id, status)
            .await?
            .ok_or_else(|| AppError::not_found("Order"))?;
        info!(order_id = %updated.id_hex(), status = status.as_str(), "order status updated");
        Ok(updated)
    }

    /// Buyer-side cancellation, allowed only while the order is still pending.
    pub async fn cancel(&self, user_id: &ObjectId, order_id: &str) -> Result<Order> {
        let order_id = ObjectId::parse_str(order_id.trim())?;
        let order = self
            .orders
            .find_by_id(&order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order"))?;
        if &order.user != user_id {
            return Err(AppError::forbidden("Order belongs to another user"));
        }

        let cancelled = self
            .orders
            .cancel_if_pending(&order_id)
            .await?
            .ok_or_else(|| AppError::invalid_data("Only pending orders can be cancelled"))?;
        info!(order_id = %cancelled.id_hex(), "order cancelled by buyer");
        Ok(cancelled)
    }

    async fn queue_confirmations(&self, order: &Order) {
        let order_ref = order.id_hex();

        match self.identity.find_user(&order.user).await {
            Ok(Some(buyer)) => self.outbox.enqueue(Email {
                to: buyer.email.clone(),
                subject: format!("Order Confirmation - #{}", order_ref),
                text: format!(
                    "Hello {},\n\nThank you for your order #{}.\n\n{}\nSubtotal: {:.2}\nShipping: {:.2}\nTotal: {:.2}\nPayment Method: {}\n",
                    buyer.name,
                    order_ref,
                    item_lines(&order.items),
                    order.subtotal,
                    order.shipping_fee,
                    order.total_amount,
                    order.payment_method
                ),
                html: format!(
                    "<h1>Order Confirmed!</h1><p>Hello {},</p><p>Your order ID is <strong>#{}</strong>.</p><ul>{}</ul><p><strong>Total: {:.2}</strong></p><p>Delivery Address: {}, {}</p>",
                    buyer.name,
                    order_ref,
                    item_list_html(&order.items),
                    order.total_amount,
                    order.shipping_address.street,
                    order.shipping_address.city
                ),
            }),
            Ok(None) => warn!(order_id = %order_ref, "buyer not found; confirmation skipped"),
            Err(e) => warn!(order_id = %order_ref, error = %e, "could not load buyer for confirmation"),
        }

        let mut by_shop: BTreeMap<ObjectId, Vec<OrderItem>> = BTreeMap::new();
        for item in &order.items {
            by_shop.entry(item.shop).or_default().push(item.clone());
        }

        for (shop_id, items) in by_shop {
            let shop = match self.catalog.find_shop(&shop_id).await {
                Ok(Some(shop)) => shop,
                Ok(None) => {
                    warn!(order_id = %order_ref, shop_id = %shop_id.to_hex(), "shop not found; seller notice skipped");
                    continue;
                }
                Err(e) => {
                    warn!(order_id = %order_ref, error = %e, "could not load shop for seller notice");
                    continue;
                }
            };

            self.outbox.enqueue(Email {
                to: shop.email.clone(),
                subject: format!("New Order Notification - #{}", order_ref),
                text: format!(
                    "Hello {},\n\nYou have received a new order #{}.\n\n{}\nCustomer Phone: {}\nDelivery Address: {}, {}\n",
                    shop.name,
                    order_ref,
                    item_lines(&items),
                    order.shipping_address.phone,
                    order.shipping_address.street,
                    order.shipping_address.city
                ),
                html: format!(
                    "<h1>New Order Received!</h1><p>Hello {},</p><ul>{}</ul><p>Customer Phone: {}</p>",
                    shop.name,
                    item_list_html(&items),
                    order.shipping_address.phone
                ),
            });
        }
    }
}


fn item_lines(items: &[OrderItem]) -> String {
    items
        .iter()
        .map(|item| format!("{} x{} @ {:.2}\n", item.name, item.quantity, item.price))
        .collect()
}

fn item_list_html(items: &[OrderItem]) -> String {
    items
        .iter()
        .map(|item| format!("<li>{} x{} @ {:.2}</li>", item.name, item.quantity, item.price))
        .collect()
}
