//! Service configuration.
//!
//! Loaded from environment variables (after `.env` via `dotenvy`) with
//! defaults for local development. Payment providers are optional; a
//! provider without credentials is simply not registered.

use std::env;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port
    pub port: u16,

    /// PostgreSQL connection string. Without it the in-memory store is used.
    pub database_url: Option<String>,

    /// NATS server for domain events (optional)
    pub nats_url: Option<String>,

    pub auth: AuthConfig,

    pub stripe: Option<StripeConfig>,
    pub paypal: Option<PayPalConfig>,
    pub square: Option<SquareConfig>,

    /// Support chat widget ids
    pub tawk_to_property_id: Option<String>,
    pub tawk_to_widget_id: Option<String>,

    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,

    /// Inventory below this level is reported as low stock
    pub low_stock_threshold: i64,

    /// Timeout for outbound payment-provider calls
    pub http_timeout_secs: u64,
}

/// Bearer token verification settings.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// HS256 shared secret
    pub jwt_secret: Option<String>,
    /// RS256 public key (PEM). Takes precedence over the secret.
    pub jwt_public_key_pem: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub base_url: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct SquareConfig {
    pub access_token: String,
    pub location_id: String,
    pub base_url: String,
    pub currency: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let auth = AuthConfig {
            jwt_secret: get("AUTH_JWT_SECRET"),
            jwt_public_key_pem: get("AUTH_JWT_PUBLIC_KEY"),
            issuer: get("AUTH_ISSUER"),
            audience: get("AUTH_AUDIENCE"),
        };
        if auth.jwt_secret.is_none() && auth.jwt_public_key_pem.is_none() {
            return Err(ConfigError::MissingRequired("AUTH_JWT_SECRET or AUTH_JWT_PUBLIC_KEY".to_string()));
        }

        let stripe = get("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            base_url: get("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".to_string()),
            currency: get("STRIPE_CURRENCY").unwrap_or_else(|| "usd".to_string()),
        });

        let paypal = match (get("PAYPAL_CLIENT_ID"), get("PAYPAL_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(PayPalConfig {
                client_id,
                client_secret,
                base_url: match get("PAYPAL_MODE").as_deref() {
                    Some("live") => "https://api-m.paypal.com".to_string(),
                    Some("sandbox") | None => "https://api-m.sandbox.paypal.com".to_string(),
                    Some(_) => return Err(ConfigError::InvalidValue("PAYPAL_MODE".to_string())),
                },
                currency: get("PAYPAL_CURRENCY").unwrap_or_else(|| "USD".to_string()),
                return_url: get("PAYPAL_RETURN_URL")
                    .unwrap_or_else(|| "http://localhost:3000/checkout/success".to_string()),
                cancel_url: get("PAYPAL_CANCEL_URL")
                    .unwrap_or_else(|| "http://localhost:3000/checkout/cancel".to_string()),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingRequired("PAYPAL_CLIENT_SECRET".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingRequired("PAYPAL_CLIENT_ID".to_string())),
        };

        let square = match get("SQUARE_ACCESS_TOKEN") {
            Some(access_token) => Some(SquareConfig {
                access_token,
                location_id: get("SQUARE_LOCATION_ID")
                    .ok_or_else(|| ConfigError::MissingRequired("SQUARE_LOCATION_ID".to_string()))?,
                base_url: match get("SQUARE_ENVIRONMENT").as_deref() {
                    Some("production") => "https://connect.squareup.com".to_string(),
                    Some("sandbox") | None => "https://connect.squareupsandbox.com".to_string(),
                    Some(_) => return Err(ConfigError::InvalidValue("SQUARE_ENVIRONMENT".to_string())),
                },
                currency: get("SQUARE_CURRENCY").unwrap_or_else(|| "USD".to_string()),
            }),
            None => None,
        };

        Ok(AppConfig {
            port: get("PORT")
                .unwrap_or_else(|| "5000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,

            database_url: get("DATABASE_URL"),

            nats_url: get("NATS_URL"),

            auth,
            stripe,
            paypal,
            square,

            tawk_to_property_id: get("TAWK_TO_PROPERTY_ID"),
            tawk_to_widget_id: get("TAWK_TO_WIDGET_ID"),

            cors_origins: get("CORS_ORIGINS")
                .map(|v| v.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
                .unwrap_or_default(),

            low_stock_threshold: get("LOW_STOCK_THRESHOLD")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("LOW_STOCK_THRESHOLD".to_string()))?,

            http_timeout_secs: get("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("HTTP_TIMEOUT_SECS".to_string()))?,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
