use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client, Database, IndexModel,
};
use std::time::Duration;

use crate::config::AppConfig;
use crate::database::mongo::{self, MongoStore};
use crate::errors::Result;

pub async fn get_db_client(config: &AppConfig) -> Result<MongoStore> {
    let client = Client::with_uri_str(&config.database_url).await?;
    let db = client.database(&config.database_name);

    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!(database = %config.database_name, ?collections, "connected to MongoDB");
        }
        Err(e) => {
            tracing::error!(database = %config.database_name, error = %e, "database may not exist or is inaccessible");
            return Err(e.into());
        }
    }

    ensure_indexes(&db, config.feed.retention_days).await?;
    Ok(MongoStore::new(client, db, config.use_transactions))
}

async fn ensure_indexes(db: &Database, retention_days: i64) -> Result<()> {
    create_index(db, mongo::TRANSACTIONS, doc! { "checkout_request_id": 1 }, unique()).await?;
    create_index(db, mongo::SHOPS, doc! { "owner": 1 }, unique()).await?;
    create_index(db, mongo::CARTS, doc! { "user": 1 }, unique()).await?;
    create_index(db, mongo::ORDERS, doc! { "user": 1, "created_at": -1 }, None).await?;
    create_index(db, mongo::ORDERS, doc! { "items.shop": 1 }, None).await?;
    create_index(db, mongo::PRODUCTS, doc! { "created_at": -1 }, None).await?;
    create_index(db, mongo::ACTIVITIES, doc! { "user_id": 1, "created_at": -1 }, None).await?;

    let retention = Duration::from_secs(retention_days.max(1) as u64 * 24 * 60 * 60);
    let ttl = IndexOptions::builder().expire_after(retention).build();
    create_index(db, mongo::ACTIVITIES, doc! { "created_at": 1 }, Some(ttl)).await?;

    tracing::info!("indexes ensured");
    Ok(())
}

fn unique() -> Option<IndexOptions> {
    Some(IndexOptions::builder().unique(true).build())
}

async fn create_index(
    db: &Database,
    collection: &str,
    keys: Document,
    options: Option<IndexOptions>,
) -> Result<()> {
    let model = IndexModel::builder().keys(keys).options(options).build();
    db.collection::<Document>(collection).create_index(model).await?;
    Ok(())
}
