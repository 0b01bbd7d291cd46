use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId},
    options::ReturnDocument,
    Client, Collection, Database,
};

use crate::database::stores::{ActivityStore, CatalogStore, IdentityStore, OrderStore, TransactionStore};
use crate::errors::Result;
use crate::models::{
    activity::Activity,
    cart::Cart,
    mpesa_transactions::{Finalization, MpesaTransaction},
    order::{Order, OrderStatus},
    product::Product,
    shop::Shop,
    user::{PremiumGrant, User},
};

pub const TRANSACTIONS: &str = "mpesa_transactions";
pub const USERS: &str = "users";
pub const SHOPS: &str = "shops";
pub const PRODUCTS: &str = "products";
pub const CARTS: &str = "carts";
pub const ORDERS: &str = "orders";
pub const ACTIVITIES: &str = "activities";

/// MongoDB-backed implementation of every store.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    use_transactions: bool,
}

impl MongoStore {
    pub fn new(client: Client, db: Database, use_transactions: bool) -> Self {
        MongoStore { client, db, use_transactions }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn transactions(&self) -> Collection<MpesaTransaction> {
        self.db.collection(TRANSACTIONS)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn shops(&self) -> Collection<Shop> {
        self.db.collection(SHOPS)
    }

    fn products(&self) -> Collection<Product> {
        self.db.collection(PRODUCTS)
    }

    fn carts(&self) -> Collection<Cart> {
        self.db.collection(CARTS)
    }

    fn orders(&self) -> Collection<Order> {
        self.db.collection(ORDERS)
    }

    fn activities(&self) -> Collection<Activity> {
        self.db.collection(ACTIVITIES)
    }

    async fn insert_order_then_clear_cart(&self, order: &Order) -> Result<()> {
        self.orders().insert_one(order).await?;

        // Without a transaction the order must land first; a stale cart is the lesser failure.
        if let Err(e) = self
            .carts()
            .update_one(doc! { "user": order.user }, doc! { "$set": { "items": [] } })
            .await
        {
            tracing::warn!(
                order_id = %order.id_hex(),
                user_id = %order.user.to_hex(),
                error = %e,
                "order stored but cart could not be cleared"
            );
        }
        Ok(())
    }

    async fn insert_order_in_session(&self, order: &Order) -> Result<()> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let inserted = self.orders().insert_one(order).session(&mut session).await;
        if let Err(e) = inserted {
            let _ = session.abort_transaction().await;
            return Err(e.into());
        }

        let cleared = self
            .carts()
            .update_one(doc! { "user": order.user }, doc! { "$set": { "items": [] } })
            .session(&mut session)
            .await;
        if let Err(e) = cleared {
            let _ = session.abort_transaction().await;
            return Err(e.into());
        }

        session.commit_transaction().await?;
        Ok(())
    }
}

fn now_bson() -> bson::DateTime {
    bson::DateTime::from_chrono(Utc::now())
}

#[async_trait]
impl TransactionStore for MongoStore {
    async fn insert(&self, mut transaction: MpesaTransaction) -> Result<MpesaTransaction> {
        let result = self.transactions().insert_one(&transaction).await?;
        transaction.id = result.inserted_id.as_object_id();
        Ok(transaction)
    }

    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> Result<Option<MpesaTransaction>> {
        let filter = doc! { "checkout_request_id": checkout_request_id };
        Ok(self.transactions().find_one(filter).await?)
    }

    async fn finalize_if_pending(
        &self,
        checkout_request_id: &str,
        outcome: &Finalization,
    ) -> Result<Option<MpesaTransaction>> {
        let filter = doc! {
            "checkout_request_id": checkout_request_id,
            "status": "pending",
        };
        let update = doc! {
            "$set": {
                "status": outcome.status.as_str(),
                "result_code": outcome.result_code.0,
                "result_desc": &outcome.result_desc,
                "mpesa_receipt_number": outcome.mpesa_receipt_number.clone(),
                "transaction_date": bson::DateTime::from_chrono(outcome.settled_at),
                "updated_at": now_bson(),
            }
        };

        let finalized = self
            .transactions()
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?;
        Ok(finalized)
    }

    async fn mark_entitlement_applied(&self, checkout_request_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.transactions()
            .update_one(
                doc! { "checkout_request_id": checkout_request_id, "entitlement_applied_at": null },
                doc! { "$set": { "entitlement_applied_at": bson::DateTime::from_chrono(at), "updated_at": now_bson() } },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MongoStore {
    async fn find_user(&self, id: &ObjectId) -> Result<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }).await?)
    }

    async fn apply_premium(&self, user_id: &ObjectId, grant: &PremiumGrant) -> Result<bool> {
        let filter = doc! {
            "_id": user_id,
            "premium_activations": { "$ne": &grant.activation_key },
        };
        let update = doc! {
            "$set": {
                "is_premium": true,
                "premium_plan": &grant.plan_name,
                "premium_until": bson::DateTime::from_chrono(grant.premium_until),
                "updated_at": now_bson(),
            },
            "$addToSet": { "premium_activations": &grant.activation_key },
        };

        let result = self.users().update_one(filter, update).await?;
        Ok(result.modified_count > 0)
    }

    async fn verify_shop_of(&self, owner: &ObjectId) -> Result<bool> {
        let result = self
            .shops()
            .update_one(doc! { "owner": owner }, doc! { "$set": { "is_verified": true } })
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl CatalogStore for MongoStore {
    async fn find_product(&self, id: &ObjectId) -> Result<Option<Product>> {
        Ok(self.products().find_one(doc! { "_id": id }).await?)
    }

    async fn find_shop(&self, id: &ObjectId) -> Result<Option<Shop>> {
        Ok(self.shops().find_one(doc! { "_id": id }).await?)
    }

    async fn find_shop_by_owner(&self, owner: &ObjectId) -> Result<Option<Shop>> {
        Ok(self.shops().find_one(doc! { "owner": owner }).await?)
    }

    async fn newest_products(&self, limit: usize) -> Result<Vec<Product>> {
        let cursor = self
            .products()
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .limit(limit as i64)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl OrderStore for MongoStore {
    async fn create_and_clear_cart(&self, mut order: Order) -> Result<Order> {
        if order.id.is_none() {
            order.id = Some(ObjectId::new());
        }

        if self.use_transactions {
            self.insert_order_in_session(&order).await?;
        } else {
            self.insert_order_then_clear_cart(&order).await?;
        }
        Ok(order)
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Order>> {
        Ok(self.orders().find_one(doc! { "_id": id }).await?)
    }

    async fn find_by_id_suffix(&self, suffix: &str, limit: usize) -> Result<Vec<Order>> {
        // Callers only pass alphanumeric suffixes, so the pattern needs no escaping.
        let filter = doc! {
            "$expr": {
                "$regexMatch": {
                    "input": { "$toString": "$_id" },
                    "regex": format!("{}$", suffix),
                    "options": "i",
                }
            }
        };
        let cursor = self.orders().find(filter).limit(limit as i64).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_user(&self, user: &ObjectId) -> Result<Vec<Order>> {
        let cursor = self
            .orders()
            .find(doc! { "user": user })
            .sort(doc! { "created_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_shop(&self, shop: &ObjectId) -> Result<Vec<Order>> {
        let cursor = self
            .orders()
            .find(doc! { "items.shop": shop })
            .sort(doc! { "created_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn update_status(&self, id: &ObjectId, status: OrderStatus) -> Result<Option<Order>> {
        let updated = self
            .orders()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$set": { "status": status.as_str(), "updated_at": now_bson() } },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }

    async fn cancel_if_pending(&self, id: &ObjectId) -> Result<Option<Order>> {
        let updated = self
            .orders()
            .find_one_and_update(
                doc! { "_id": id, "status": OrderStatus::Pending.as_str() },
                doc! { "$set": { "status": OrderStatus::Cancelled.as_str(), "updated_at": now_bson() } },
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated)
    }
}

#[async_trait]
impl ActivityStore for MongoStore {
    async fn record(&self, mut activity: Activity) -> Result<Activity> {
        let result = self.activities().insert_one(&activity).await?;
        activity.id = result.inserted_id.as_object_id();
        Ok(activity)
    }

    async fn recent_for_user(
        &self,
        user_id: &ObjectId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Activity>> {
        // The TTL monitor runs lazily, so the window is enforced here as well.
        let filter = doc! {
            "user_id": user_id,
            "created_at": { "$gte": bson::DateTime::from_chrono(since) },
        };
        let cursor = self
            .activities()
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .limit(limit as i64)
            .await?;
        Ok(cursor.try_collect().await?)
    }
}
