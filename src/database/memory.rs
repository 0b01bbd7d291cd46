use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::database::stores::{ActivityStore, CatalogStore, IdentityStore, OrderStore, TransactionStore};
use crate::errors::{AppError, Result};
use crate::models::{
    activity::Activity,
    cart::{Cart, CartItem},
    mpesa_transactions::{Finalization, MpesaTransaction, TransactionStatus},
    order::{Order, OrderStatus},
    product::Product,
    shop::Shop,
    user::{PremiumGrant, User},
};

#[derive(Default)]
struct Collections {
    transactions: HashMap<String, MpesaTransaction>,
    users: HashMap<ObjectId, User>,
    shops: HashMap<ObjectId, Shop>,
    products: Vec<Product>,
    carts: HashMap<ObjectId, Cart>,
    orders: Vec<Order>,
    activities: Vec<Activity>,
}

/// In-process store for `memory://` deployments and the test suite.
/// A single lock covers every collection, so each call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
    fail_order_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent order write fail, to exercise rollback paths.
    pub fn fail_order_writes(&self, fail: bool) {
        self.fail_order_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn insert_user(&self, mut user: User) -> User {
        let id = *user.id.get_or_insert_with(ObjectId::new);
        self.inner.lock().await.users.insert(id, user.clone());
        user
    }

    pub async fn insert_shop(&self, mut shop: Shop) -> Shop {
        let id = *shop.id.get_or_insert_with(ObjectId::new);
        self.inner.lock().await.shops.insert(id, shop.clone());
        shop
    }

    pub async fn insert_product(&self, mut product: Product) -> Product {
        product.id.get_or_insert_with(ObjectId::new);
        self.inner.lock().await.products.push(product.clone());
        product
    }

    pub async fn insert_order(&self, mut order: Order) -> Order {
        order.id.get_or_insert_with(ObjectId::new);
        self.inner.lock().await.orders.push(order.clone());
        order
    }

    pub async fn set_cart(&self, user: ObjectId, items: Vec<CartItem>) {
        let cart = Cart { id: Some(ObjectId::new()), user, items };
        self.inner.lock().await.carts.insert(user, cart);
    }

    pub async fn cart_of(&self, user: &ObjectId) -> Option<Cart> {
        self.inner.lock().await.carts.get(user).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.inner.lock().await.orders.len()
    }

    pub async fn shop(&self, id: &ObjectId) -> Option<Shop> {
        self.inner.lock().await.shops.get(id).cloned()
    }

    pub async fn push_activity(&self, activity: Activity) {
        self.inner.lock().await.activities.push(activity);
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert(&self, mut transaction: MpesaTransaction) -> Result<MpesaTransaction> {
        let mut inner = self.inner.lock().await;
        if inner.transactions.contains_key(&transaction.checkout_request_id) {
            return Err(AppError::invalid_data(format!(
                "Duplicate checkout request id {}",
                transaction.checkout_request_id
            )));
        }
        transaction.id.get_or_insert_with(ObjectId::new);
        inner
            .transactions
            .insert(transaction.checkout_request_id.clone(), transaction.clone());
        Ok(transaction)
    }

    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<MpesaTransaction>> {
        Ok(self.inner.lock().await.transactions.get(checkout_request_id).cloned())
    }

    async fn finalize_if_pending(
        &self,
        checkout_request_id: &str,
        outcome: &Finalization,
    ) -> Result<Option<MpesaTransaction>> {
        let mut inner = self.inner.lock().await;
        let Some(transaction) = inner.transactions.get_mut(checkout_request_id) else {
            return Ok(None);
        };
        if transaction.status != TransactionStatus::Pending {
            return Ok(None);
        }

        transaction.status = outcome.status;
        transaction.result_code = Some(outcome.result_code);
        transaction.result_desc = Some(outcome.result_desc.clone());
        transaction.mpesa_receipt_number = outcome.mpesa_receipt_number.clone();
        transaction.transaction_date = Some(outcome.settled_at);
        transaction.updated_at = Utc::now();
        Ok(Some(transaction.clone()))
    }

    async fn mark_entitlement_applied(&self, checkout_request_id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(transaction) = self.inner.lock().await.transactions.get_mut(checkout_request_id) {
            if transaction.entitlement_applied_at.is_none() {
                transaction.entitlement_applied_at = Some(at);
                transaction.updated_at = Utc::now();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(id).cloned())
    }

    async fn apply_premium(&self, user_id: &ObjectId, grant: &PremiumGrant) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(user) = inner.users.get_mut(user_id) else {
            return Ok(false);
        };
        if user.premium_activations.contains(&grant.activation_key) {
            return Ok(false);
        }

        user.is_premium = true;
        user.premium_plan = Some(grant.plan_name.clone());
        user.premium_until = Some(grant.premium_until);
        user.premium_activations.push(grant.activation_key.clone());
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn verify_shop_of(&self, owner: &ObjectId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.shops.values_mut().find(|shop| &shop.owner == owner) {
            Some(shop) => {
                shop.is_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_product(&self, id: &ObjectId) -> Result<Option<Product>> {
        let inner = self.inner.lock().await;
        Ok(inner.products.iter().find(|p| p.id.as_ref() == Some(id)).cloned())
    }

    async fn find_shop(&self, id: &ObjectId) -> Result<Option<Shop>> {
        Ok(self.inner.lock().await.shops.get(id).cloned())
    }

    async fn find_shop_by_owner(&self, owner: &ObjectId) -> Result<Option<Shop>> {
        let inner = self.inner.lock().await;
        Ok(inner.shops.values().find(|shop| &shop.owner == owner).cloned())
    }

    async fn newest_products(&self, limit: usize) -> Result<Vec<Product>> {
        let mut products = self.inner.lock().await.products.clone();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        products.truncate(limit);
        Ok(products)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_and_clear_cart(&self, mut order: Order) -> Result<Order> {
        let mut inner = self.inner.lock().await;
        if self.fail_order_writes.load(Ordering::SeqCst) {
            return Err(AppError::internal("order write failed"));
        }

        order.id.get_or_insert_with(ObjectId::new);
        inner.orders.push(order.clone());
        if let Some(cart) = inner.carts.get_mut(&order.user) {
            cart.items.clear();
        }
        Ok(order)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Order>> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.iter().find(|o| o.id.as_ref() == Some(id)).cloned())
    }

    async fn find_by_id_suffix(&self, suffix: &str, limit: usize) -> Result<Vec<Order>> {
        let suffix = suffix.to_ascii_lowercase();
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .iter()
            .filter(|o| o.id_hex().to_ascii_lowercase().ends_with(&suffix))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_by_user(&self, user: &ObjectId) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner.orders.iter().filter(|o| &o.user == user).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn find_by_shop(&self, shop: &ObjectId) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner.orders.iter().filter(|o| o.contains_shop(shop)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_status(&self, id: &ObjectId, status: OrderStatus) -> Result<Option<Order>> {
        if self.fail_order_writes.load(Ordering::SeqCst) {
            return Err(AppError::internal("order write failed"));
        }
        let mut inner = self.inner.lock().await;
        Ok(inner.orders.iter_mut().find(|o| o.id.as_ref() == Some(id)).map(|order| {
            order.status = status;
            order.updated_at = Utc::now();
            order.clone()
        }))
    }

    async fn cancel_if_pending(&self, id: &ObjectId) -> Result<Option<Order>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .orders
            .iter_mut()
            .find(|o| o.id.as_ref() == Some(id) && o.status == OrderStatus::Pending)
            .map(|order| {
                order.status = OrderStatus::Cancelled;
                order.updated_at = Utc::now();
                order.clone()
            }))
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn record(&self, mut activity: Activity) -> Result<Activity> {
        activity.id.get_or_insert_with(ObjectId::new);
        self.inner.lock().await.activities.push(activity.clone());
        Ok(activity)
    }

    async fn recent_for_user(
        &self,
        user_id: &ObjectId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        let mut inner = self.inner.lock().await;
        inner.activities.retain(|a| a.created_at >= since);

        let mut recent: Vec<Activity> = inner
            .activities
            .iter()
            .filter(|a| &a.user_id == user_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}
