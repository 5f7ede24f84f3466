//! Payment collaborator consulted by `confirm`.
//!
//! Authorization happens before the confirm unit of work is opened, so a
//! slow or declining gateway never holds seat or booking locks. The gateway
//! answers synchronously with an approval (carrying the transaction id that
//! is stored on the booking) or a decline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{Money, PaymentMethod};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub amount: Money,
    pub method: PaymentMethod,
    /// Client supplied payment id, forwarded to the gateway.
    pub payment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDecision {
    Approved { transaction_id: String },
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// An `Err` means the gateway could not be reached; a decline is `Ok`.
    async fn authorize(&self, request: &PaymentRequest) -> Result<PaymentDecision, BookingError>;
}

/// Approves every request and uses the client payment id as the
/// transaction id.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughGateway;

#[async_trait]
impl PaymentGateway for PassthroughGateway {
    async fn authorize(&self, request: &PaymentRequest) -> Result<PaymentDecision, BookingError> {
        if request.payment_id.trim().is_empty() {
            return Ok(PaymentDecision::Declined {
                reason: "missing payment id".into(),
            });
        }

        info!(
            booking_id = %request.booking_id,
            reference = %request.booking_reference,
            amount = %request.amount,
            "Payment authorized"
        );
        Ok(PaymentDecision::Approved {
            transaction_id: request.payment_id.clone(),
        })
    }
}

/// Declines payment ids from a configured list, approves the rest.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    declined: Mutex<HashSet<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decline(&self, payment_id: impl Into<String>) {
        if let Ok(mut declined) = self.declined.lock() {
            declined.insert(payment_id.into());
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn authorize(&self, request: &PaymentRequest) -> Result<PaymentDecision, BookingError> {
        let declined = self
            .declined
            .lock()
            .map_err(|_| BookingError::Internal("payment script lock poisoned".into()))?
            .contains(&request.payment_id);

        if declined {
            warn!(booking_id = %request.booking_id, payment_id = %request.payment_id, "Payment declined");
            return Ok(PaymentDecision::Declined {
                reason: format!("payment {} was declined", request.payment_id),
            });
        }
        Ok(PaymentDecision::Approved {
            transaction_id: format!("txn_{}", request.payment_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(payment_id: &str) -> PaymentRequest {
        PaymentRequest {
            booking_id: Uuid::new_v4(),
            booking_reference: "BMS1234560001".into(),
            amount: Money::from_major(330),
            method: PaymentMethod::Upi,
            payment_id: payment_id.into(),
        }
    }

    #[tokio::test]
    async fn passthrough_uses_payment_id() {
        let decision = PassthroughGateway.authorize(&request("pay_42")).await.unwrap();
        assert_eq!(
            decision,
            PaymentDecision::Approved {
                transaction_id: "pay_42".into()
            }
        );
        let decision = PassthroughGateway.authorize(&request("  ")).await.unwrap();
        assert!(matches!(decision, PaymentDecision::Declined { .. }));
    }

    #[tokio::test]
    async fn scripted_gateway_declines_listed_ids() {
        let gateway = ScriptedGateway::new();
        gateway.decline("pay_bad");
        assert!(matches!(
            gateway.authorize(&request("pay_bad")).await.unwrap(),
            PaymentDecision::Declined { .. }
        ));
        assert!(matches!(
            gateway.authorize(&request("pay_ok")).await.unwrap(),
            PaymentDecision::Approved { .. }
        ));
    }
}
