use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub webhook: WebhookConfig,
    pub rate_limit: RateLimitConfig,
    pub push: PushConfig,
    pub dispatch: DispatchConfig,
    pub sweeps: SweepConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the auth provider that issues user tokens.
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// HMAC-SHA256 secret used to sign domain events and sweep triggers.
    pub signing_secret: String,
    /// Maximum accepted clock skew between the signed timestamp and now.
    pub max_skew_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for webhook endpoints
    pub webhook_per_second: u32,
    /// Burst size for webhook endpoints
    pub webhook_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// base64url-encoded uncompressed P-256 public key (65 bytes).
    pub vapid_public_key: Option<String>,
    /// base64url-encoded raw P-256 private scalar (32 bytes).
    pub vapid_private_key: Option<String>,
    pub vapid_subject: String,
    pub ttl_seconds: u32,
    /// Parallel deliveries per fan-out.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Attempt browser push after each persisted in-app notification.
    pub push_enabled: bool,
    /// Orders at or above this total raise an admin alert.
    pub high_value_order_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    pub low_stock_threshold: i64,
    pub coupon_usage_alert_percent: i64,
    pub coupon_expiry_window_days: i64,
    /// When set, sweeps also run in-process on this interval.
    pub interval_seconds: Option<u64>,
}

fn parse_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Longest accepted coupon expiry look-ahead.
pub const MAX_COUPON_EXPIRY_WINDOW_DAYS: i64 = 3650;

fn coupon_expiry_window_days(raw: Option<String>) -> Result<i64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(3);
    };
    match raw.trim().parse::<i64>() {
        Ok(days) if (0..=MAX_COUPON_EXPIRY_WINDOW_DAYS).contains(&days) => Ok(days),
        _ => Err(ConfigError::InvalidValue(format!(
            "COUPON_EXPIRY_WINDOW_DAYS must be between 0 and {}",
            MAX_COUPON_EXPIRY_WINDOW_DAYS
        ))),
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let vapid_public_key = non_empty("VAPID_PUBLIC_KEY");
        let vapid_private_key = non_empty("VAPID_PRIVATE_KEY");
        if vapid_public_key.is_some() != vapid_private_key.is_some() {
            return Err(ConfigError::InvalidValue(
                "VAPID_PUBLIC_KEY and VAPID_PRIVATE_KEY must be set together".to_string(),
            ));
        }

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/notifications.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
            },
            webhook: WebhookConfig {
                signing_secret: env::var("WEBHOOK_SIGNING_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("WEBHOOK_SIGNING_SECRET".to_string()))?,
                max_skew_seconds: env::var("WEBHOOK_MAX_SKEW_SECONDS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .unwrap_or(600),
            },
            rate_limit: RateLimitConfig {
                webhook_per_second: env::var("RATE_LIMIT_WEBHOOKS_PER_SECOND")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                webhook_burst: env::var("RATE_LIMIT_WEBHOOKS_BURST")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50),
            },
            push: PushConfig {
                vapid_public_key,
                vapid_private_key,
                vapid_subject: env::var("VAPID_SUBJECT")
                    .unwrap_or_else(|_| "mailto:admin@localhost".to_string()),
                ttl_seconds: env::var("PUSH_TTL_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .unwrap_or(86400),
                concurrency: env::var("PUSH_CONCURRENCY")
                    .unwrap_or_else(|_| "16".to_string())
                    .parse()
                    .unwrap_or(16),
            },
            dispatch: DispatchConfig {
                push_enabled: parse_bool("PUSH_DELIVERY_ENABLED", true),
                high_value_order_threshold: env::var("HIGH_VALUE_ORDER_THRESHOLD")
                    .unwrap_or_else(|_| "500000".to_string())
                    .parse()
                    .map_err(|_| {
                        ConfigError::InvalidValue("HIGH_VALUE_ORDER_THRESHOLD".to_string())
                    })?,
            },
            sweeps: SweepConfig {
                low_stock_threshold: env::var("LOW_STOCK_THRESHOLD")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                coupon_usage_alert_percent: env::var("COUPON_USAGE_ALERT_PERCENT")
                    .unwrap_or_else(|_| "80".to_string())
                    .parse()
                    .unwrap_or(80),
                coupon_expiry_window_days: coupon_expiry_window_days(
                    env::var("COUPON_EXPIRY_WINDOW_DAYS").ok(),
                )?,
                interval_seconds: env::var("SWEEP_INTERVAL_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v: &u64| *v > 0),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                jwt_secret: String::new(),
            },
            webhook: WebhookConfig {
                signing_secret: String::new(),
                max_skew_seconds: 600,
            },
            rate_limit: RateLimitConfig {
                webhook_per_second: 10,
                webhook_burst: 50,
            },
            push: PushConfig {
                vapid_public_key: None,
                vapid_private_key: None,
                vapid_subject: "mailto:admin@localhost".to_string(),
                ttl_seconds: 86400,
                concurrency: 16,
            },
            dispatch: DispatchConfig {
                push_enabled: true,
                high_value_order_threshold: 500_000.0,
            },
            sweeps: SweepConfig {
                low_stock_threshold: 10,
                coupon_usage_alert_percent: 80,
                coupon_expiry_window_days: 3,
                interval_seconds: None,
            },
        }
    }
}
