use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{Account, OrderAck, OrderIntent};
use crate::error::{Result, TraderError};
use crate::gateway::OrderGateway;
use crate::notifier::Notifier;

/// Sends order intents to the gateway and classifies failures.
///
/// The caller commits a position transition only on `Ok`. Errors come back as
/// either `OrderRejected` (nothing happened at the broker) or `StateUncertain`
/// (the order may or may not have been placed).
#[derive(Clone)]
pub struct Engine {
    gateway: Arc<dyn OrderGateway>,
    account: Account,
    notifier: Notifier,
}

impl Engine {
    pub fn new(gateway: Arc<dyn OrderGateway>, account: Account, notifier: Notifier) -> Self {
        Self { gateway, account, notifier }
    }

    pub fn is_dry_run(&self) -> bool {
        self.gateway.is_dry_run()
    }

    pub async fn execute(&self, intent: &OrderIntent) -> Result<OrderAck> {
        info!(
            code = %intent.code,
            side = %intent.side,
            quantity = intent.quantity,
            signal_price = intent.signal_price,
            reason = ?intent.reason,
            dry_run = self.is_dry_run(),
            "engine.submit"
        );

        let res = self
            .gateway
            .submit_market_order(&self.account, intent.side, &intent.code, intent.quantity)
            .await;

        match res {
            Ok(ack) => {
                info!(code = %intent.code, side = %intent.side, order_id = %ack.order_id, "engine.accepted");
                Ok(ack)
            }
            Err(e) => {
                let err = classify(&intent.code, e);
                match &err {
                    TraderError::StateUncertain { .. } => error!(error = %err, "engine.state_uncertain"),
                    _ => warn!(error = %err, "engine.rejected"),
                }
                self.notifier
                    .alert_best_effort(&format!("{} {} x{}: {}", intent.side, intent.code, intent.quantity, err))
                    .await;
                Err(err)
            }
        }
    }
}

/// A request that never reached the broker, or one the broker answered with a
/// failure, is a clean rejection. Anything else leaves the outcome unknown.
fn classify(code: &str, err: TraderError) -> TraderError {
    match err {
        TraderError::Broker { code: msg_cd, message } => TraderError::OrderRejected {
            code: code.to_string(),
            reason: format!("[{msg_cd}] {message}"),
        },
        TraderError::Http(e) if e.is_connect() || e.is_builder() || e.status().is_some() => {
            TraderError::OrderRejected { code: code.to_string(), reason: e.to_string() }
        }
        e @ (TraderError::OrderRejected { .. } | TraderError::StateUncertain { .. }) => e,
        other => TraderError::StateUncertain { code: code.to_string(), reason: other.to_string() },
    }
}
