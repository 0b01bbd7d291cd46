use mongodb::Database;
use std::sync::Arc;

use crate::database::Stores;
use crate::services::{
    mpesa_service::PaymentGateway,
    notifier::Outbox,
    order_service::OrderService,
    payment_service::PaymentService,
    recommendation::FeedService,
};
use crate::config::FeedConfig;

#[derive(Clone)]
pub struct AppState {
    /// Only set when backed by MongoDB; used by the health check.
    pub db: Option<Database>,
    pub jwt_secret: Arc<str>,
    pub payments: Arc<PaymentService>,
    pub orders: Arc<OrderService>,
    pub feed: Arc<FeedService>,
}

impl AppState {
    pub fn new(
        stores: &Stores,
        gateway: Arc<dyn PaymentGateway>,
        outbox: Outbox,
        feed_config: FeedConfig,
        jwt_secret: impl Into<Arc<str>>,
    ) -> Self {
        AppState {
            db: None,
            jwt_secret: jwt_secret.into(),
            payments: Arc::new(PaymentService::new(stores, gateway)),
            orders: Arc::new(OrderService::new(stores, outbox)),
            feed: Arc::new(FeedService::new(stores, feed_config)),
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }
}
