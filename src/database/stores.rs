use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use crate::errors::Result;
use crate::models::{
    activity::Activity,
    mpesa_transactions::{Finalization, MpesaTransaction},
    order::{Order, OrderStatus},
    product::Product,
    shop::Shop,
    user::{PremiumGrant, User},
};

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, transaction: MpesaTransaction) -> Result<MpesaTransaction>;

    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<MpesaTransaction>>;

    /// Conditional update: applies only while the record is still `pending`.
    /// Returns the finalized record to the single caller that won, `None` to everyone else.
    async fn finalize_if_pending(
        &self,
        checkout_request_id: &str,
        outcome: &Finalization,
    ) -> Result<Option<MpesaTransaction>>;

    /// Records when the entitlement was first applied. Later calls leave the stamp alone.
    async fn mark_entitlement_applied(&self, checkout_request_id: &str, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>>;

    /// Applies the grant unless its activation key was already recorded on the user.
    /// Returns whether this call changed anything.
    async fn apply_premium(&self, user_id: &ObjectId, grant: &PremiumGrant) -> Result<bool>;

    /// Marks the shop owned by `owner` as verified; `false` when the user has no shop.
    async fn verify_shop_of(&self, owner: &ObjectId) -> Result<bool>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_product(&self, id: &ObjectId) -> Result<Option<Product>>;

    async fn find_shop(&self, id: &ObjectId) -> Result<Option<Shop>>;

    async fn find_shop_by_owner(&self, owner: &ObjectId) -> Result<Option<Shop>>;

    async fn newest_products(&self, limit: usize) -> Result<Vec<Product>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists the order and empties the buyer's cart as one unit of work.
    /// On failure the cart is left as it was.
    async fn create_and_clear_cart(&self, order: Order) -> Result<Order>;

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Order>>;

    /// Orders whose id ends with `suffix` (case-insensitive), at most `limit` of them.
    async fn find_by_id_suffix(&self, suffix: &str, limit: usize) -> Result<Vec<Order>>;

    async fn find_by_user(&self, user: &ObjectId) -> Result<Vec<Order>>;

    async fn find_by_shop(&self, shop: &ObjectId) -> Result<Vec<Order>>;

    async fn update_status(&self, id: &ObjectId, status: OrderStatus) -> Result<Option<Order>>;

    /// Cancels only while the order is still pending.
    async fn cancel_if_pending(&self, id: &ObjectId) -> Result<Option<Order>>;
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn record(&self, activity: Activity) -> Result<Activity>;

    /// Most recent first, never older than `since`.
    async fn recent_for_user(
        &self,
        user_id: &ObjectId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Activity>>;
}
