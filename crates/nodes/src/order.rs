//! Built-in order-processing nodes.
//!
//! The pipeline these nodes form:
//!
//! ```text
//! validate-order ─┬─> process-payment ───┬─> create-shipping-label ─> complete-order
//!                 └─> reserve-inventory ─┘
//! ```
//!
//! The context is a JSON object seeded with at least `orderId`. Every node
//! only reads the context and contributes its own top-level keys.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::{ExecutableNode, Patch};

pub const VALIDATE_ORDER: &str = "validate-order";
pub const PROCESS_PAYMENT: &str = "process-payment";
pub const RESERVE_INVENTORY: &str = "reserve-inventory";
pub const CREATE_SHIPPING_LABEL: &str = "create-shipping-label";
pub const COMPLETE_ORDER: &str = "complete-order";

const SIMULATED_LATENCY: Duration = Duration::from_millis(20);

fn order_id(ctx: &Value) -> anyhow::Result<&str> {
    ctx.get("orderId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .context("context has no orderId")
}

fn flag(ctx: &Value, key: &str) -> bool {
    ctx.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn has_string(ctx: &Value, key: &str) -> bool {
    ctx.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn patch(value: Value) -> Patch {
    match value {
        Value::Object(map) => map,
        _ => Patch::new(),
    }
}

/// Stand-in for a call to an external system. Returns early with an error
/// once `cancel` fires.
async fn remote_call(what: &str, cancel: &CancellationToken) -> anyhow::Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(SIMULATED_LATENCY) => Ok(()),
        _ = cancel.cancelled() => bail!("{what} cancelled"),
    }
}

/// Checks that the order carries an id and marks it validated.
pub struct ValidateOrder;

#[async_trait]
impl ExecutableNode for ValidateOrder {
    async fn validate(&self, ctx: &Value) -> bool {
        order_id(ctx).is_ok()
    }

    async fn execute(&self, ctx: &Value, _cancel: CancellationToken) -> anyhow::Result<Patch> {
        let id = order_id(ctx)?;
        debug!(order_id = id, "order validated");
        Ok(patch(json!({
            "orderValidated": true,
            "orderStatus": "validated",
        })))
    }
}

/// Charges the order. Gated on the order having been validated.
#[derive(Default)]
pub struct ProcessPayment {
    /// Simulate the payment provider declining the charge.
    pub decline: bool,
}

impl ProcessPayment {
    pub fn declining() -> Self {
        Self { decline: true }
    }
}

#[async_trait]
impl ExecutableNode for ProcessPayment {
    async fn gate_check(&self, ctx: &Value) -> bool {
        flag(ctx, "orderValidated")
    }

    async fn validate(&self, ctx: &Value) -> bool {
        !has_string(ctx, "paymentId")
    }

    async fn execute(&self, ctx: &Value, cancel: CancellationToken) -> anyhow::Result<Patch> {
        let id = order_id(ctx)?;
        remote_call("payment", &cancel).await?;
        if self.decline {
            bail!("payment declined for order {id}");
        }
        Ok(patch(json!({
            "paymentId": format!("PAY_{}", Uuid::new_v4().simple()),
            "paymentStatus": "captured",
        })))
    }
}

/// Reserves stock for the order unless it is already reserved.
pub struct ReserveInventory;

#[async_trait]
impl ExecutableNode for ReserveInventory {
    async fn validate(&self, ctx: &Value) -> bool {
        !flag(ctx, "inventoryReserved")
    }

    async fn execute(&self, ctx: &Value, cancel: CancellationToken) -> anyhow::Result<Patch> {
        order_id(ctx)?;
        remote_call("inventory reservation", &cancel).await?;
        Ok(patch(json!({
            "inventoryReserved": true,
            "reservationId": format!("RES_{}", Uuid::new_v4().simple()),
        })))
    }

    async fn cleanup(&self, ctx: &Value) -> anyhow::Result<()> {
        debug!(order_id = ?ctx.get("orderId"), "released inventory lock");
        Ok(())
    }
}

/// Produces a shipping label once the order is paid for and reserved.
pub struct CreateShippingLabel;

#[async_trait]
impl ExecutableNode for CreateShippingLabel {
    async fn gate_check(&self, ctx: &Value) -> bool {
        has_string(ctx, "paymentId") && flag(ctx, "inventoryReserved")
    }

    async fn execute(&self, ctx: &Value, cancel: CancellationToken) -> anyhow::Result<Patch> {
        let id = order_id(ctx)?;
        remote_call("shipping label", &cancel).await?;
        Ok(patch(json!({
            "shippingLabel": format!("LABEL_{id}"),
        })))
    }
}

/// Marks the order completed.
pub struct CompleteOrder;

#[async_trait]
impl ExecutableNode for CompleteOrder {
    async fn validate(&self, ctx: &Value) -> bool {
        has_string(ctx, "shippingLabel")
    }

    async fn execute(&self, _ctx: &Value, _cancel: CancellationToken) -> anyhow::Result<Patch> {
        Ok(patch(json!({
            "orderStatus": "completed",
            "completedAt": Utc::now().to_rfc3339(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_order_rejects_missing_id() {
        assert!(!ValidateOrder.validate(&json!({})).await);
        assert!(!ValidateOrder.validate(&json!({ "orderId": "" })).await);
        assert!(ValidateOrder.validate(&json!({ "orderId": "ORD_001" })).await);
    }

    #[tokio::test]
    async fn payment_is_gated_on_validation() {
        let node = ProcessPayment::default();
        assert!(!node.gate_check(&json!({ "orderId": "ORD_001" })).await);
        assert!(
            node.gate_check(&json!({ "orderId": "ORD_001", "orderValidated": true }))
                .await
        );
    }

    #[tokio::test]
    async fn declined_payment_fails() {
        let err = ProcessPayment::declining()
            .execute(&json!({ "orderId": "ORD_001" }), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "payment declined for order ORD_001");
    }

    #[tokio::test]
    async fn payment_stops_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let err = ProcessPayment::default()
            .execute(&json!({ "orderId": "ORD_001" }), token)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "payment cancelled");
    }

    #[tokio::test]
    async fn shipping_label_uses_order_id() {
        let patch = CreateShippingLabel
            .execute(&json!({ "orderId": "ORD_042" }), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(patch.get("shippingLabel"), Some(&json!("LABEL_ORD_042")));
    }
}
