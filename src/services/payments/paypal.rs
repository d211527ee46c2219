//! PayPal adapter: Orders v2 with buyer approval, then capture.
//!
//! `charge` creates a checkout order and returns the approval link; the
//! money only moves on `complete`, which captures and returns the capture
//! id. Refunds are issued against that capture id.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{
    http_client, major_units, read_json, ChargeRequest, PaymentError, PaymentProvider, PaymentResult, ProviderKind,
    RefundResult,
};
use crate::config::PayPalConfig;

pub struct PayPalProvider {
    client: reqwest::Client,
    config: PayPalConfig,
    token: Mutex<Option<(String, Instant)>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutOrder {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<CapturedUnit>,
}

#[derive(Debug, Deserialize)]
struct CapturedUnit {
    payments: Option<CapturedPayments>,
}

#[derive(Debug, Deserialize)]
struct CapturedPayments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
    status: String,
    amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
struct Money {
    currency_code: String,
    value: String,
}

impl Money {
    fn parse(&self) -> Result<Decimal, PaymentError> {
        self.value.parse::<Decimal>().map_err(|e| PaymentError::Parse {
            provider: ProviderKind::Paypal,
            message: format!("capture amount {:?}: {e}", self.value),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: String,
}

impl PayPalProvider {
    pub fn new(config: PayPalConfig, timeout: Duration) -> Result<Self, PaymentError> {
        Ok(Self { client: http_client(timeout)?, config, token: Mutex::new(None) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// OAuth client-credentials token, cached until shortly before expiry.
    async fn access_token(&self) -> Result<String, PaymentError> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }
        let response = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: TokenResponse = read_json(ProviderKind::Paypal, response).await?;
        let ttl = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some((token.access_token.clone(), Instant::now() + ttl));
        Ok(token.access_token)
    }
}

fn currency_for(request: &ChargeRequest, config: &PayPalConfig) -> String {
    request.currency.as_deref().unwrap_or(&config.currency).to_uppercase()
}

/// JSON body for `POST /v2/checkout/orders`.
pub(crate) fn order_body(request: &ChargeRequest, config: &PayPalConfig) -> Result<Value, PaymentError> {
    let currency = currency_for(request, config);
    let mut unit = json!({
        "amount": { "currency_code": currency, "value": major_units(request.amount)? },
    });
    if let Some(description) = &request.description {
        unit["description"] = json!(description);
    }
    if let Some(user) = request.metadata.get("userId") {
        unit["custom_id"] = json!(user);
    }
    Ok(json!({
        "intent": "CAPTURE",
        "purchase_units": [unit],
        "application_context": {
            "return_url": config.return_url,
            "cancel_url": config.cancel_url,
            "user_action": "PAY_NOW",
        },
    }))
}

/// JSON body for `POST /v2/payments/captures/{id}/refund`.
pub(crate) fn refund_body(amount: Option<Decimal>, currency: &str, reason: Option<&str>) -> Result<Value, PaymentError> {
    let mut body = json!({});
    if let Some(amount) = amount {
        body["amount"] = json!({ "currency_code": currency.to_uppercase(), "value": major_units(amount)? });
    }
    if let Some(reason) = reason {
        body["note_to_payer"] = json!(reason);
    }
    Ok(body)
}

fn approval_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel == "approve" || l.rel == "payer-action")
        .map(|l| l.href.clone())
}

#[async_trait]
impl PaymentProvider for PayPalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Paypal
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<PaymentResult, PaymentError> {
        let body = order_body(request, &self.config)?;
        let currency = currency_for(request, &self.config);
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let order: CheckoutOrder = read_json(ProviderKind::Paypal, response).await?;
        let approval_url = approval_link(&order.links).ok_or_else(|| PaymentError::Parse {
            provider: ProviderKind::Paypal,
            message: format!("order {} has no approval link", order.id),
        })?;
        tracing::info!(payment_id = %order.id, "PayPal order created, awaiting approval");
        let mut result = PaymentResult::new(order.id, order.status).with_amount(request.amount, currency);
        result.approval_url = Some(approval_url);
        Ok(result)
    }

    async fn refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> Result<RefundResult, PaymentError> {
        let body = refund_body(amount, &self.config.currency, reason)?;
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url(&format!("/v2/payments/captures/{payment_id}/refund")))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let refund: RefundResponse = read_json(ProviderKind::Paypal, response).await?;
        Ok(RefundResult { refund_id: refund.id, status: refund.status })
    }

    /// Capture an approved order. The returned id is the capture id.
    async fn complete(&self, payment_id: &str) -> Result<PaymentResult, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(self.url(&format!("/v2/checkout/orders/{payment_id}/capture")))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;
        let captured: CaptureResponse = read_json(ProviderKind::Paypal, response).await?;
        let capture = captured
            .purchase_units
            .into_iter()
            .filter_map(|u| u.payments)
            .flat_map(|p| p.captures)
            .next()
            .ok_or_else(|| PaymentError::Parse {
                provider: ProviderKind::Paypal,
                message: format!("order {} captured without a capture record", captured.id),
            })?;
        tracing::info!(order_id = %captured.id, capture_id = %capture.id, status = %captured.status, "PayPal order captured");
        let mut result = PaymentResult::new(capture.id, capture.status);
        if let Some(money) = &capture.amount {
            result = result.with_amount(money.parse()?, money.currency_code.clone());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::str::FromStr;

    fn config() -> PayPalConfig {
        PayPalConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            base_url: "https://api-m.sandbox.paypal.com".into(),
            currency: "USD".into(),
            return_url: "https://shop.test/ok".into(),
            cancel_url: "https://shop.test/cancel".into(),
        }
    }

    #[test]
    fn test_order_body() {
        let request = ChargeRequest {
            amount: Decimal::from_str("180").unwrap(),
            currency: None,
            method_ref: None,
            description: None,
            metadata: BTreeMap::from([("userId".to_string(), "u1".to_string())]),
        };
        let body = order_body(&request, &config()).unwrap();
        assert_eq!(body["intent"], "CAPTURE");
        assert_eq!(body["purchase_units"][0]["amount"], json!({"currency_code": "USD", "value": "180.00"}));
        assert_eq!(body["purchase_units"][0]["custom_id"], "u1");
        assert_eq!(body["application_context"]["return_url"], "https://shop.test/ok");
    }

    #[test]
    fn test_refund_body() {
        assert_eq!(refund_body(None, "usd", None).unwrap(), json!({}));
        let body = refund_body(Some(Decimal::new(1050, 2)), "usd", Some("damaged")).unwrap();
        assert_eq!(body, json!({"amount": {"currency_code": "USD", "value": "10.50"}, "note_to_payer": "damaged"}));
    }

    #[test]
    fn test_capture_amount_is_read_from_the_capture() {
        let captured: CaptureResponse = serde_json::from_value(json!({
            "id": "5O190127TN364715T",
            "status": "COMPLETED",
            "purchase_units": [{"payments": {"captures": [{
                "id": "3C679366HH908993F",
                "status": "COMPLETED",
                "amount": {"currency_code": "USD", "value": "100.00"}
            }]}}]
        }))
        .unwrap();
        let capture = &captured.purchase_units[0].payments.as_ref().unwrap().captures[0];
        let money = capture.amount.as_ref().unwrap();
        assert_eq!(money.parse().unwrap(), Decimal::from(100));
        assert_eq!(money.currency_code, "USD");

        let bad = Money { currency_code: "USD".into(), value: "lots".into() };
        assert!(matches!(bad.parse(), Err(PaymentError::Parse { .. })));
    }

    #[test]
    fn test_approval_link() {
        let links = vec![
            Link { href: "https://api/self".into(), rel: "self".into() },
            Link { href: "https://paypal/approve".into(), rel: "approve".into() },
        ];
        assert_eq!(approval_link(&links).as_deref(), Some("https://paypal/approve"));
        assert_eq!(approval_link(&[]), None);
    }
}
