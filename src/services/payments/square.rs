//! Square adapter: Payments and Refunds APIs, amounts in minor units.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    http_client, minor_units, read_json, ChargeRequest, PaymentError, PaymentProvider, PaymentResult, ProviderKind,
    RefundResult,
};
use crate::config::SquareConfig;

const SQUARE_VERSION: &str = "2024-06-04";

pub struct SquareProvider {
    client: reqwest::Client,
    config: SquareConfig,
}

#[derive(Debug, Deserialize)]
struct Money {
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct Payment {
    id: String,
    status: String,
    amount_money: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct PaymentEnvelope {
    payment: Payment,
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RefundEnvelope {
    refund: Refund,
}

impl SquareProvider {
    pub fn new(config: SquareConfig, timeout: Duration) -> Result<Self, PaymentError> {
        Ok(Self { client: http_client(timeout)?, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.config.access_token)
            .header("Square-Version", SQUARE_VERSION)
    }

    async fn fetch(&self, payment_id: &str) -> Result<Payment, PaymentError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v2/payments/{payment_id}"))
            .send()
            .await?;
        let envelope: PaymentEnvelope = read_json(ProviderKind::Square, response).await?;
        Ok(envelope.payment)
    }
}

/// JSON body for `POST /v2/payments`.
pub(crate) fn payment_body(
    request: &ChargeRequest,
    config: &SquareConfig,
    idempotency_key: &str,
) -> Result<Value, PaymentError> {
    let source = request
        .method_ref
        .as_deref()
        .ok_or_else(|| PaymentError::InvalidRequest("sourceId is required".to_string()))?;
    let currency = request.currency.as_deref().unwrap_or(&config.currency).to_uppercase();
    let mut body = json!({
        "source_id": source,
        "idempotency_key": idempotency_key,
        "amount_money": { "amount": minor_units(request.amount)?, "currency": currency },
        "location_id": config.location_id,
    });
    if let Some(description) = &request.description {
        body["note"] = json!(description);
    }
    if let Some(user) = request.metadata.get("userId") {
        body["reference_id"] = json!(user);
    }
    Ok(body)
}

/// JSON body for `POST /v2/refunds`. `amount` is already in minor units.
pub(crate) fn refund_body(
    payment_id: &str,
    amount: i64,
    currency: &str,
    reason: Option<&str>,
    idempotency_key: &str,
) -> Value {
    let mut body = json!({
        "idempotency_key": idempotency_key,
        "payment_id": payment_id,
        "amount_money": { "amount": amount, "currency": currency.to_uppercase() },
    });
    if let Some(reason) = reason {
        body["reason"] = json!(reason);
    }
    body
}

#[async_trait]
impl PaymentProvider for SquareProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Square
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, PaymentError> {
        let body = payment_body(request, &self.config, &Uuid::new_v4().to_string())?;
        let response = self.request(reqwest::Method::POST, "/v2/payments").json(&body).send().await?;
        let PaymentEnvelope { payment } = read_json(ProviderKind::Square, response).await?;
        tracing::info!(payment_id = %payment.id, status = %payment.status, "Square payment created");
        Ok(PaymentResult::new(payment.id, payment.status))
    }

    /// Square needs an explicit amount; a full refund looks the payment up first.
    async fn refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> Result<RefundResult, PaymentError> {
        let (minor, currency) = match amount {
            Some(amount) => (minor_units(amount)?, self.config.currency.clone()),
            None => {
                let money = self.fetch(payment_id).await?.amount_money.ok_or_else(|| PaymentError::Parse {
                    provider: ProviderKind::Square,
                    message: format!("payment {payment_id} has no amount"),
                })?;
                (money.amount, money.currency)
            }
        };
        let body = refund_body(payment_id, minor, &currency, reason, &Uuid::new_v4().to_string());
        let response = self.request(reqwest::Method::POST, "/v2/refunds").json(&body).send().await?;
        let RefundEnvelope { refund } = read_json(ProviderKind::Square, response).await?;
        Ok(RefundResult { refund_id: refund.id, status: refund.status })
    }

    async fn complete(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        let payment = self.fetch(payment_id).await?;
        Ok(PaymentResult::new(payment.id, payment.status))
    }
}
