// config.rs
use std::env;
use std::time::Duration;

use crate::errors::{AppError, Result};

pub const CALLBACK_PATH: &str = "/api/payments/callback";

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub passkey: String,
    pub environment: String,
    pub base_url: Option<String>,
    pub callback_url: String,
    pub tunnel_url: Option<String>,
    pub account_reference: String,
    pub transaction_desc: String,
    pub timeout: Duration,
}

impl MpesaConfig {
    pub fn from_env() -> Result<Self> {
        Ok(MpesaConfig {
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            short_code: required("MPESA_SHORTCODE")?,
            passkey: required("MPESA_PASSKEY")?,
            environment: env::var("MPESA_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string()),
            base_url: optional("MPESA_BASE_URL"),
            callback_url: env::var("MPESA_CALLBACK_URL")
                .unwrap_or_else(|_| format!("http://localhost:10000{}", CALLBACK_PATH)),
            tunnel_url: optional("MPESA_TUNNEL_URL"),
            account_reference: env::var("MPESA_ACCOUNT_REFERENCE")
                .unwrap_or_else(|_| ".Soko Ecommerce".to_string()),
            transaction_desc: env::var("MPESA_TRANSACTION_DESC")
                .unwrap_or_else(|_| "Premium Upgrade".to_string()),
            timeout: Duration::from_secs(parse_or("MPESA_TIMEOUT_SECS", 30)?),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        if self.is_production() {
            "https://api.safaricom.co.ke".to_string()
        } else {
            "https://sandbox.safaricom.co.ke".to_string()
        }
    }

    pub fn auth_url(&self) -> String {
        format!("{}/oauth/v1/generate?grant_type=client_credentials", self.base_url())
    }

    pub fn stk_push_url(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.base_url())
    }

    pub fn stk_query_url(&self) -> String {
        format!("{}/mpesa/stkpushquery/v1/query", self.base_url())
    }

    /// The provider must be able to reach us, so a public tunnel wins over the static URL.
    pub fn callback_url(&self) -> String {
        match &self.tunnel_url {
            Some(tunnel) => format!("{}{}", tunnel.trim_end_matches('/'), CALLBACK_PATH),
            None => self.callback_url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl MailConfig {
    fn from_env() -> Option<Self> {
        Some(MailConfig {
            api_url: optional("MAIL_API_URL")?,
            api_key: optional("MAIL_API_KEY")?,
            from: env::var("MAIL_FROM").unwrap_or_else(|_| "\".soko Support\" <no-reply@soko.app>".to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub activity_window: usize,
    pub candidate_pool: usize,
    pub retention_days: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            activity_window: 100,
            candidate_pool: 500,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_name: String,
    pub use_transactions: bool,
    pub jwt_secret: String,
    pub log_level: tracing::Level,
    pub mpesa: MpesaConfig,
    pub mail: Option<MailConfig>,
    pub feed: FeedConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = FeedConfig::default();
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| level.parse().ok())
            .unwrap_or(tracing::Level::INFO);

        Ok(AppConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("PORT", 10000)?,
            database_url: required("DATABASE_URL")?,
            database_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "soko".to_string()),
            use_transactions: parse_or("MONGO_TRANSACTIONS", true)?,
            jwt_secret: required("JWT_SECRET")?,
            log_level,
            mpesa: MpesaConfig::from_env()?,
            mail: MailConfig::from_env(),
            feed: FeedConfig {
                activity_window: parse_or("FEED_ACTIVITY_WINDOW", defaults.activity_window)?,
                candidate_pool: parse_or("FEED_CANDIDATE_POOL", defaults.candidate_pool)?,
                retention_days: parse_or("ACTIVITY_RETENTION_DAYS", defaults.retention_days)?,
            },
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| AppError::configuration(format!("{} must be set", key)))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::configuration(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mpesa(tunnel: Option<&str>) -> MpesaConfig {
        MpesaConfig {
            consumer_key: "key".into(),
            consumer_secret: "secret".into(),
            short_code: "174379".into(),
            passkey: "passkey".into(),
            environment: "sandbox".into(),
            base_url: None,
            callback_url: "https://static.example.com/api/payments/callback".into(),
            tunnel_url: tunnel.map(String::from),
            account_reference: ".Soko Ecommerce".into(),
            transaction_desc: "Premium Upgrade".into(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn tunnel_url_is_preferred_for_callbacks() {
        let config = mpesa(Some("https://abc.ngrok.app/"));
        assert_eq!(config.callback_url(), "https://abc.ngrok.app/api/payments/callback");
        assert_eq!(
            mpesa(None).callback_url(),
            "https://static.example.com/api/payments/callback"
        );
    }

    #[test]
    fn environment_selects_provider_host() {
        let mut config = mpesa(None);
        assert!(config.stk_push_url().starts_with("https://sandbox.safaricom.co.ke"));
        config.environment = "production".into();
        assert_eq!(
            config.stk_query_url(),
            "https://api.safaricom.co.ke/mpesa/stkpushquery/v1/query"
        );
        config.base_url = Some("http://127.0.0.1:9000/".into());
        assert_eq!(
            config.auth_url(),
            "http://127.0.0.1:9000/oauth/v1/generate?grant_type=client_credentials"
        );
    }
}
