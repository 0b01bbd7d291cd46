mod common;

use chrono::{Duration, Utc};
use mongodb::bson::oid::ObjectId;
use soko_api::errors::AppError;
use soko_api::models::{
    activity::{Activity, ActivityType},
    product::Product,
};
use soko_api::services::recommendation::NewActivity;

use common::test_app;

fn purchase(product: Option<ObjectId>, category: Option<&str>) -> NewActivity {
    NewActivity {
        kind: ActivityType::Purchase,
        product_id: product,
        category: category.map(str::to_string),
        search_query: None,
    }
}

#[tokio::test]
async fn purchases_in_a_category_lift_that_category() {
    let app = test_app();
    let buyer = app.buyer().await.id.unwrap();
    let (_, shop) = app.seller("Duka Moja").await;

    let shoes = app.product(&shop, "Canvas Sneaker", 1500.0, "shoes").await;
    // Newer than the sneaker, so it would lead an unpersonalized feed.
    let book = app.product(&shop, "River and the Source", 1500.0, "books").await;

    app.state
        .feed
        .record(buyer, purchase(None, Some("shoes")))
        .await
        .unwrap();

    let feed = app.state.feed.feed(Some(buyer), 10).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].product.id, shoes.id);
    assert_eq!(feed[1].product.id, book.id);
    assert!(feed[0].score > feed[1].score);
}

#[tokio::test]
async fn anonymous_and_inactive_users_get_newest_first() {
    let app = test_app();
    let (_, shop) = app.seller("Duka Moja").await;

    let mut older = Product::new(shop.id.unwrap(), "Old Radio", 900.0, "electronics");
    older.created_at = Utc::now() - Duration::days(3);
    let older = app.store.insert_product(older).await;
    let newer = app.product(&shop, "Solar Lamp", 1200.0, "electronics").await;

    let anonymous = app.state.feed.feed(None, 10).await.unwrap();
    assert_eq!(anonymous[0].product.id, newer.id);
    assert_eq!(anonymous[1].product.id, older.id);

    let fresh_user = app.buyer().await.id.unwrap();
    let feed = app.state.feed.feed(Some(fresh_user), 1).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].product.id, newer.id);
}

#[tokio::test]
async fn expired_activity_no_longer_personalizes() {
    let app = test_app();
    let buyer = app.buyer().await.id.unwrap();
    let (_, shop) = app.seller("Duka Moja").await;

    let mut shoes = Product::new(shop.id.unwrap(), "Canvas Sneaker", 1500.0, "shoes");
    shoes.created_at = Utc::now() - Duration::days(1);
    let shoes = app.store.insert_product(shoes).await;
    let book = app.product(&shop, "River and the Source", 1500.0, "books").await;

    let mut stale = Activity::new(buyer, ActivityType::Purchase, shoes.id, Some("shoes".into()), None);
    stale.created_at = Utc::now() - Duration::days(45);
    app.store.push_activity(stale).await;

    let feed = app.state.feed.feed(Some(buyer), 10).await.unwrap();
    assert_eq!(feed[0].product.id, book.id);
}

#[tokio::test]
async fn recording_by_product_fills_in_its_category() {
    let app = test_app();
    let buyer = app.buyer().await.id.unwrap();
    let (_, shop) = app.seller("Duka Moja").await;
    let lamp = app.product(&shop, "Solar Lamp", 1200.0, "electronics").await;

    let activity = app
        .state
        .feed
        .record(
            buyer,
            NewActivity {
                kind: ActivityType::Wishlist,
                product_id: lamp.id,
                category: None,
                search_query: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(activity.category.as_deref(), Some("electronics"));
    assert_eq!(activity.weight, 5);

    let err = app
        .state
        .feed
        .record(buyer, purchase(Some(ObjectId::new()), None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = app.state.feed.record(buyer, purchase(None, None)).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}
