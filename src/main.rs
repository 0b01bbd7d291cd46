use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;

use soko_api::{
    build_router,
    config::AppConfig,
    database::{connection::get_db_client, memory::MemoryStore, Stores},
    services::{
        mpesa_service::MpesaService,
        notifier::{HttpMailer, LogMailer, Mailer, Outbox},
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let app_state = initialize_app_state(&config).await?;
    let app = build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    tracing::info!("🚀 Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn initialize_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let mpesa = MpesaService::new(config.mpesa.clone()).context("failed to build M-Pesa client")?;
    tracing::info!(
        short_code = %config.mpesa.short_code,
        environment = %config.mpesa.environment,
        callback = %config.mpesa.callback_url(),
        "M-Pesa service configured"
    );

    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(mail) => Arc::new(HttpMailer::new(mail.clone())),
        None => {
            tracing::warn!("MAIL_API_URL/MAIL_API_KEY not set; emails will only be logged");
            Arc::new(LogMailer)
        }
    };
    let outbox = Outbox::start(mailer);

    if config.uses_memory_store() {
        tracing::warn!("using the in-memory store; data is lost on restart");
        let stores = Stores::memory(Arc::new(MemoryStore::new()));
        return Ok(AppState::new(
            &stores,
            Arc::new(mpesa),
            outbox,
            config.feed.clone(),
            config.jwt_secret.as_str(),
        ));
    }

    let store = get_db_client(config).await.context("failed to connect to MongoDB")?;
    let db = store.database().clone();
    let stores = Stores::mongo(store);
    tracing::info!(transactions = config.use_transactions, "✅ MongoDB store ready");

    Ok(AppState::new(
        &stores,
        Arc::new(mpesa),
        outbox,
        config.feed.clone(),
        config.jwt_secret.as_str(),
    )
    .with_database(db))
}
