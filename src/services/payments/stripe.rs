//! Stripe adapter: Payment Intents confirmed server-side, plus Refunds.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{
    http_client, minor_units, read_json, ChargeRequest, PaymentError, PaymentProvider, PaymentResult, ProviderKind,
    RefundResult,
};
use crate::config::StripeConfig;

/// Refund reasons Stripe accepts as `reason`; anything else goes to metadata.
const REFUND_REASONS: [&str; 3] = ["duplicate", "fraudulent", "requested_by_customer"];

pub struct StripeProvider {
    client: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
    status: String,
}

impl StripeProvider {
    pub fn new(config: StripeConfig, timeout: Duration) -> Result<Self, PaymentError> {
        Ok(Self { client: http_client(timeout)?, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }
}

/// Form body for `POST /v1/payment_intents`.
pub(crate) fn intent_form(request: &ChargeRequest, default_currency: &str) -> Result<Vec<(String, String)>, PaymentError> {
    let method = request
        .method_ref
        .as_deref()
        .ok_or_else(|| PaymentError::InvalidRequest("paymentMethodId is required".to_string()))?;
    let currency = request.currency.as_deref().unwrap_or(default_currency).to_lowercase();
    let mut form = vec![
        ("amount".to_string(), minor_units(request.amount)?.to_string()),
        ("currency".to_string(), currency),
        ("payment_method".to_string(), method.to_string()),
        ("confirm".to_string(), "true".to_string()),
        ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ("automatic_payment_methods[allow_redirects]".to_string(), "never".to_string()),
    ];
    if let Some(description) = &request.description {
        form.push(("description".to_string(), description.clone()));
    }
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    Ok(form)
}

/// Form body for `POST /v1/refunds`.
pub(crate) fn refund_form(
    payment_id: &str,
    amount: Option<Decimal>,
    reason: Option<&str>,
) -> Result<Vec<(String, String)>, PaymentError> {
    let mut form = vec![("payment_intent".to_string(), payment_id.to_string())];
    if let Some(amount) = amount {
        form.push(("amount".to_string(), minor_units(amount)?.to_string()));
    }
    match reason {
        Some(r) if REFUND_REASONS.contains(&r) => form.push(("reason".to_string(), r.to_string())),
        Some(r) => form.push(("metadata[reason]".to_string(), r.to_string())),
        None => {}
    }
    Ok(form)
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, PaymentError> {
        let form = intent_form(request, &self.config.currency)?;
        let response = self
            .client
            .post(self.url("/v1/payment_intents"))
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await?;
        let intent: StripeObject = read_json(ProviderKind::Stripe, response).await?;
        tracing::info!(payment_id = %intent.id, status = %intent.status, "Stripe payment intent confirmed");
        Ok(PaymentResult::new(intent.id, intent.status))
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> Result<RefundResult, PaymentError> {
        let form = refund_form(payment_id, amount, reason)?;
        let response = self
            .client
            .post(self.url("/v1/refunds"))
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await?;
        let refund: StripeObject = read_json(ProviderKind::Stripe, response).await?;
        Ok(RefundResult { refund_id: refund.id, status: refund.status })
    }

    async fn complete(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{payment_id}")))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        let intent: StripeObject = read_json(ProviderKind::Stripe, response).await?;
        Ok(PaymentResult::new(intent.id, intent.status))
    }
}
