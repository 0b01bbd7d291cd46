#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use soko_api::config::FeedConfig;
use soko_api::database::{memory::MemoryStore, Stores};
use soko_api::errors::{AppError, Result};
use soko_api::models::{
    mpesa_transactions::ResultCode,
    order::{Order, OrderItem, OrderStatus, PaymentStatus, ShippingAddress, CASH_ON_DELIVERY},
    product::Product,
    shop::Shop,
    user::{AccountType, User},
};
use soko_api::services::mpesa_service::{PaymentGateway, PushAccepted, QueryOutcome};
use soko_api::services::notifier::{Email, Mailer, Outbox};
use soko_api::state::AppState;

pub const JWT_SECRET: &str = "test-secret";

#[derive(Debug, Clone)]
pub enum QueryBehaviour {
    Resolved(i64, &'static str),
    Pending,
    Unreachable,
}

/// Stand-in for the provider: accepts pushes with sequential checkout ids and
/// answers status queries with whatever the test configured.
pub struct FakeGateway {
    next_id: AtomicUsize,
    reject_pushes: AtomicBool,
    query: Mutex<QueryBehaviour>,
    pub queries: AtomicUsize,
    pub pushes: Mutex<Vec<(String, u64)>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeGateway {
            next_id: AtomicUsize::new(1),
            reject_pushes: AtomicBool::new(false),
            query: Mutex::new(QueryBehaviour::Pending),
            queries: AtomicUsize::new(0),
            pushes: Mutex::new(Vec::new()),
        })
    }

    pub fn answer_queries_with(&self, behaviour: QueryBehaviour) {
        *self.query.lock().unwrap() = behaviour;
    }

    pub fn reject_pushes(&self, reject: bool) {
        self.reject_pushes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initiate_stk_push(&self, phone_number: &str, amount: u64) -> Result<PushAccepted> {
        if self.reject_pushes.load(Ordering::SeqCst) {
            return Err(AppError::external_api("provider unavailable"));
        }
        self.pushes.lock().unwrap().push((phone_number.to_string(), amount));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(PushAccepted {
            merchant_request_id: format!("29115-{}", n),
            checkout_request_id: format!("ws_CO_TEST_{}", n),
            phone_number: "254712345678".to_string(),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }

    async fn query_stk_status(&self, _checkout_request_id: &str) -> Result<QueryOutcome> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.query.lock().unwrap().clone() {
            QueryBehaviour::Resolved(code, desc) => Ok(QueryOutcome::Resolved {
                result_code: ResultCode(code),
                result_desc: desc.to_string(),
            }),
            QueryBehaviour::Pending => Ok(QueryOutcome::Pending {
                reason: "The transaction is being processed".to_string(),
            }),
            QueryBehaviour::Unreachable => Err(AppError::ServiceUnavailable("timed out".to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

impl RecordingMailer {
    /// Waits for the outbox worker to deliver at least `count` emails.
    pub async fn wait_for(&self, count: usize) -> Vec<Email> {
        for _ in 0..100 {
            if self.sent.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent.lock().unwrap().clone()
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub stores: Stores,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<RecordingMailer>,
    pub state: AppState,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::memory(store.clone());
    let gateway = FakeGateway::new();
    let mailer = Arc::new(RecordingMailer::default());
    let outbox = Outbox::start(mailer.clone());
    let state = AppState::new(&stores, gateway.clone(), outbox, FeedConfig::default(), JWT_SECRET);

    TestApp {
        store,
        stores,
        gateway,
        mailer,
        state,
    }
}

impl TestApp {
    pub async fn buyer(&self) -> User {
        self.store
            .insert_user(User::new("Amina Otieno", "amina@example.com", AccountType::Buyer))
            .await
    }

    /// A seller together with the shop they own.
    pub async fn seller(&self, shop_name: &str) -> (User, Shop) {
        let email = format!("{}@example.com", shop_name.to_lowercase().replace(' ', ""));
        let user = self
            .store
            .insert_user(User::new(shop_name, email.clone(), AccountType::Seller))
            .await;
        let shop = self
            .store
            .insert_shop(Shop::new(user.id.unwrap(), shop_name, email))
            .await;
        (user, shop)
    }

    pub async fn product(&self, shop: &Shop, name: &str, price: f64, category: &str) -> Product {
        self.store
            .insert_product(Product::new(shop.id.unwrap(), name, price, category))
            .await
    }
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        name: "Amina Otieno".to_string(),
        phone: "0712345678".to_string(),
        city: "Nairobi".to_string(),
        street: "Moi Avenue".to_string(),
    }
}

/// A stored order with a chosen id, for lookups that depend on the id's text.
pub fn order_with_id(id: &str, user: ObjectId, shop: ObjectId) -> Order {
    let now = Utc::now();
    Order {
        id: Some(ObjectId::parse_str(id).unwrap()),
        user,
        items: vec![OrderItem {
            product: ObjectId::new(),
            shop,
            name: "Leather Sandals".to_string(),
            price: 1200.0,
            quantity: 1,
            image: String::new(),
            size: None,
            color: None,
        }],
        subtotal: 1200.0,
        shipping_fee: 200.0,
        total_amount: 1400.0,
        shipping_address: address(),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: CASH_ON_DELIVERY.to_string(),
        created_at: now,
        updated_at: now,
    }
}
