//! Charge-then-place checkout.
//!
//! The card is charged before the order is written. When the order cannot
//! be written afterwards the charge is refunded and the original error is
//! returned. PayPal splits this in two: `start` returns an approval link
//! and records what the buyer is approving; `complete_paypal` only
//! captures when the re-sent cart prices to that amount, and only places
//! the order when the capture matches it too.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{CreateOrder, Order, OrderStatus};
use crate::domain::events::DomainEvent;
use crate::error::{ApiError, Result};
use crate::services::events::EventPublisher;
use crate::services::orders::OrderService;
use crate::services::payments::{ChargeRequest, PaymentProviders, PaymentResult, ProviderKind, RefundResult};
use crate::store::{Collection, DocumentStore, Entity, StoreError};

const COMPENSATION_REASON: &str = "order creation failed";
const MISMATCH_REASON: &str = "captured amount does not match order";

/// A PayPal order waiting for buyer approval, keyed by the PayPal order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    /// Exact decimal string, compared against the re-priced cart.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for PendingPayment {
    const COLLECTION: &'static str = "pendingPayments";
}

impl PendingPayment {
    /// Whether a provider-reported amount is the one that was approved.
    /// PayPal works in cents, so both sides are compared at two places.
    fn is_settled_by(&self, payment: &PaymentResult) -> bool {
        let cents = |amount: Decimal| amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let currency_matches = match (&self.currency, &payment.currency) {
            (Some(expected), Some(actual)) => expected.eq_ignore_ascii_case(actual),
            _ => true,
        };
        payment.amount.map(cents) == Some(cents(self.amount)) && currency_matches
    }
}

/// What the caller gets back from starting a checkout.
#[derive(Debug)]
pub enum CheckoutOutcome {
    /// Charged and written.
    Placed { order: Order, payment: PaymentResult },
    /// The buyer has to approve the payment first; nothing is written yet.
    AwaitingApproval { payment: PaymentResult, amount: Decimal },
}

/// Provider-side details accompanying a checkout request.
#[derive(Debug, Clone, Default)]
pub struct PaymentDetails {
    pub method_ref: Option<String>,
    pub currency: Option<String>,
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: OrderService,
    pending: Collection<PendingPayment>,
    payments: PaymentProviders,
    events: EventPublisher,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        orders: OrderService,
        payments: PaymentProviders,
        events: EventPublisher,
    ) -> Self {
        Self { orders, pending: Collection::new(store), payments, events }
    }

    pub async fn start(
        &self,
        kind: ProviderKind,
        user_id: &str,
        request: &CreateOrder,
        details: PaymentDetails,
        now: DateTime<Utc>,
    ) -> Result<CheckoutOutcome> {
        let provider = self.payments.get(kind)?;
        let order = self.orders.prepare(user_id, request, now).await?;
        let charge = charge_for(&order, details);

        let payment = provider.charge(&charge).await?;
        if kind == ProviderKind::Paypal {
            let pending = PendingPayment {
                id: payment.payment_id.clone(),
                user_id: user_id.to_string(),
                amount: order.total,
                currency: payment.currency.clone(),
                created_at: None,
            };
            self.pending.upsert(&payment.payment_id, &pending).await?;
            tracing::info!(payment_id = %payment.payment_id, user_id, "Checkout awaiting PayPal approval");
            return Ok(CheckoutOutcome::AwaitingApproval { payment, amount: order.total });
        }
        self.charged(kind, &payment, order.total).await;

        let order = self.place_paid(kind, order, &payment).await?;
        Ok(CheckoutOutcome::Placed { order, payment })
    }

    /// Capture an approved PayPal order and write the store order for it.
    pub async fn complete_paypal(
        &self,
        paypal_order_id: &str,
        user_id: &str,
        request: &CreateOrder,
        now: DateTime<Utc>,
    ) -> Result<(Order, PaymentResult)> {
        let provider = self.payments.get(ProviderKind::Paypal)?;
        let pending = match self.pending.get(paypal_order_id).await {
            Ok(pending) => pending,
            Err(StoreError::NotFound { .. }) => {
                return Err(ApiError::InvalidInput(format!("Unknown PayPal payment {paypal_order_id}")))
            }
            Err(e) => return Err(e.into()),
        };
        if pending.user_id != user_id {
            return Err(ApiError::Forbidden("PayPal payment belongs to another user".to_string()));
        }

        let order = self.orders.prepare(user_id, request, now).await?;
        if order.total != pending.amount {
            return Err(ApiError::InvalidInput(format!(
                "Order total {} does not match the approved PayPal amount {}",
                order.total, pending.amount
            )));
        }

        let capture = provider.complete(paypal_order_id).await?;
        if !pending.is_settled_by(&capture) {
            tracing::error!(
                payment_id = %capture.payment_id,
                expected = %pending.amount,
                captured = ?capture.amount,
                "PayPal capture does not match the approved amount, refunding"
            );
            if let Err(e) = self.refund(ProviderKind::Paypal, &capture.payment_id, None, Some(MISMATCH_REASON)).await {
                tracing::error!(payment_id = %capture.payment_id, error = %e, "Refund of mismatched capture failed");
            }
            return Err(ApiError::InvalidInput("Captured PayPal amount does not match the order total".to_string()));
        }
        self.charged(ProviderKind::Paypal, &capture, order.total).await;

        let order = self.place_paid(ProviderKind::Paypal, order, &capture).await?;
        if let Err(e) = self.pending.delete(paypal_order_id).await {
            tracing::warn!(payment_id = paypal_order_id, error = %e, "Failed to clear pending PayPal payment");
        }
        Ok((order, capture))
    }

    pub async fn refund(
        &self,
        kind: ProviderKind,
        payment_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> Result<RefundResult> {
        if amount.is_some_and(|a| a <= Decimal::ZERO) {
            return Err(ApiError::InvalidInput("Refund amount must be positive".to_string()));
        }
        let provider = self.payments.get(kind)?;
        let refund = provider.refund(payment_id, amount, reason).await?;
        tracing::info!(provider = %kind, payment_id, refund_id = %refund.refund_id, "Payment refunded");
        self.events
            .publish(DomainEvent::PaymentRefunded {
                provider: kind,
                payment_id: payment_id.to_string(),
                refund_id: refund.refund_id.clone(),
                amount: amount.unwrap_or_default(),
            })
            .await;
        Ok(refund)
    }

    /// Refund the payment recorded on an order and mark the order refunded.
    /// Without an amount the whole payment is refunded.
    pub async fn refund_order(
        &self,
        order_id: &str,
        amount: Option<Decimal>,
        reason: Option<&str>,
    ) -> Result<(Order, RefundResult)> {
        let order = self.orders.get(order_id).await?;
        let (Some(method), Some(payment_id)) = (order.payment_method.as_deref(), order.payment_id.as_deref()) else {
            return Err(ApiError::InvalidInput(format!("Order {order_id} has no recorded payment")));
        };
        let kind = ProviderKind::parse(method)
            .ok_or_else(|| ApiError::InvalidInput(format!("Unknown payment method: {method}")))?;

        let refund = self.refund(kind, payment_id, amount, reason).await?;
        let order = self.orders.set_status(order_id, OrderStatus::Refunded).await?;
        Ok((order, refund))
    }

    async fn place_paid(&self, kind: ProviderKind, mut order: Order, payment: &PaymentResult) -> Result<Order> {
        order.mark_paid(kind.as_str(), &payment.payment_id, &payment.status);
        match self.orders.place(&order).await {
            Ok(placed) => Ok(placed),
            Err(e) => {
                tracing::error!(provider = %kind, payment_id = %payment.payment_id, error = %e, "Order failed after charge, refunding");
                if let Err(refund_err) = self.refund(kind, &payment.payment_id, None, Some(COMPENSATION_REASON)).await {
                    tracing::error!(
                        provider = %kind,
                        payment_id = %payment.payment_id,
                        error = %refund_err,
                        "Compensating refund failed, manual action required"
                    );
                }
                Err(e)
            }
        }
    }

    async fn charged(&self, kind: ProviderKind, payment: &PaymentResult, amount: Decimal) {
        self.events
            .publish(DomainEvent::PaymentCharged { provider: kind, payment_id: payment.payment_id.clone(), amount })
            .await;
    }
}

fn charge_for(order: &Order, details: PaymentDetails) -> ChargeRequest {
    ChargeRequest {
        amount: order.total,
        currency: details.currency,
        method_ref: details.method_ref,
        description: Some(format!("Order for {}", order.user_id)),
        metadata: BTreeMap::from([
            ("userId".to_string(), order.user_id.clone()),
            ("items".to_string(), order.items.len().to_string()),
        ]),
    }
}
