//! Payment provider adapters.
//!
//! Stripe, PayPal and Square are normalized behind [`PaymentProvider`].
//! Amounts are decimals in major units; adapters convert to whatever the
//! provider expects.

pub mod paypal;
pub mod square;
pub mod stripe;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

pub use paypal::PayPalProvider;
pub use square::SquareProvider;
pub use stripe::StripeProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Stripe,
    Paypal,
    Square,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
            Self::Square => "square",
        }
    }

    /// Provider recorded on an order's `paymentMethod`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stripe" => Some(Self::Stripe),
            "paypal" => Some(Self::Paypal),
            "square" => Some(Self::Square),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A charge in major units (e.g. dollars).
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub amount: Decimal,
    /// Falls back to the provider's configured currency.
    pub currency: Option<String>,
    /// Provider-side payment method: Stripe `payment_method`, Square `source_id`.
    /// Unused by PayPal, where the buyer approves on PayPal's site.
    pub method_ref: Option<String>,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub payment_id: String,
    pub status: String,
    /// Where the buyer must go to approve the payment (PayPal).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    /// Amount the provider reports for this payment, when it reports one.
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl PaymentResult {
    pub fn new(payment_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self { payment_id: payment_id.into(), status: status.into(), approval_url: None, amount: None, currency: None }
    }

    pub fn with_amount(mut self, amount: Decimal, currency: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
    pub refund_id: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider {0} is not configured")]
    NotConfigured(ProviderKind),

    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error: {status} - {message}")]
    Api { provider: ProviderKind, status: u16, message: String },

    #[error("Unexpected {provider} response: {message}")]
    Parse { provider: ProviderKind, message: String },
}

impl PaymentError {
    /// Errors caused by the request rather than by the provider.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::InvalidRequest(_))
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, PaymentError>;

    /// Refund `amount` (everything when `None`) of a completed payment.
    async fn refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> Result<RefundResult, PaymentError>;

    /// Finish a payment that needed buyer approval, or report its status.
    async fn complete(&self, payment_id: &str) -> Result<PaymentResult, PaymentError>;
}

/// Registered providers, keyed by kind.
#[derive(Clone, Default)]
pub struct PaymentProviders {
    providers: HashMap<ProviderKind, Arc<dyn PaymentProvider>>,
}

impl PaymentProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, PaymentError> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let mut providers = Self::new();
        if let Some(stripe) = &config.stripe {
            providers = providers.with(Arc::new(StripeProvider::new(stripe.clone(), timeout)?));
        }
        if let Some(paypal) = &config.paypal {
            providers = providers.with(Arc::new(PayPalProvider::new(paypal.clone(), timeout)?));
        }
        if let Some(square) = &config.square {
            providers = providers.with(Arc::new(SquareProvider::new(square.clone(), timeout)?));
        }
        Ok(providers)
    }

    pub fn with(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn PaymentProvider>, PaymentError> {
        self.providers.get(&kind).cloned().ok_or(PaymentError::NotConfigured(kind))
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl fmt::Debug for PaymentProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProviders").field("kinds", &self.kinds()).finish()
    }
}

/// Amount in the smallest currency unit (cents), rounding half away from zero.
pub fn minor_units(amount: Decimal) -> Result<i64, PaymentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::InvalidRequest(format!("amount must be positive, got {amount}")));
    }
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| PaymentError::InvalidRequest(format!("amount out of range: {amount}")))
}

/// Decimal string with exactly two places, as PayPal expects.
pub fn major_units(amount: Decimal) -> Result<String, PaymentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::InvalidRequest(format!("amount must be positive, got {amount}")));
    }
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Ok(format!("{rounded:.2}"))
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, PaymentError> {
    Ok(reqwest::Client::builder().timeout(timeout).connect_timeout(Duration::from_secs(10)).build()?)
}

/// Turn a non-success response into [`PaymentError::Api`].
pub(crate) async fn api_error(provider: ProviderKind, response: reqwest::Response) -> PaymentError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    tracing::warn!(%provider, status, "Payment provider rejected request");
    PaymentError::Api { provider, status, message }
}

/// Parse a successful JSON body or convert the failure.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: ProviderKind,
    response: reqwest::Response,
) -> Result<T, PaymentError> {
    if !response.status().is_success() {
        return Err(api_error(provider, response).await);
    }
    response
        .json()
        .await
        .map_err(|e| PaymentError::Parse { provider, message: e.to_string() })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_minor_units() {
        assert_eq!(minor_units(Decimal::from_str("19.99").unwrap()).unwrap(), 1999);
        assert_eq!(minor_units(Decimal::from_str("0.005").unwrap()).unwrap(), 1);
        assert_eq!(minor_units(Decimal::from_str("180").unwrap()).unwrap(), 18000);
        assert!(minor_units(Decimal::ZERO).is_err());
        assert!(minor_units(Decimal::from_str("-1").unwrap()).is_err());
    }

    #[test]
    fn test_major_units() {
        assert_eq!(major_units(Decimal::from_str("180").unwrap()).unwrap(), "180.00");
        assert_eq!(major_units(Decimal::from_str("4.9995").unwrap()).unwrap(), "5.00");
    }

    #[test]
    fn test_unconfigured_provider() {
        let providers = PaymentProviders::new();
        let err = providers.get(ProviderKind::Square).err().unwrap();
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Payment provider square is not configured");
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(ProviderKind::parse("paypal"), Some(ProviderKind::Paypal));
        assert_eq!(ProviderKind::parse("cash"), None);
    }

    #[test]
    fn test_registry_lists_kinds() {
        let providers = PaymentProviders::new()
            .with(Arc::new(testing::FakeProvider::new(ProviderKind::Stripe)))
            .with(Arc::new(testing::FakeProvider::new(ProviderKind::Paypal)));
        assert_eq!(providers.kinds(), vec![ProviderKind::Paypal, ProviderKind::Stripe]);
    }
}
