use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::domain::{Account, OrderAck, Side};
use crate::error::Result;

#[async_trait]
pub trait OrderGateway: Send + Sync {
    fn is_dry_run(&self) -> bool;

    async fn submit_market_order(
        &self,
        account: &Account,
        side: Side,
        code: &str,
        quantity: u64,
    ) -> Result<OrderAck>;
}

/// Accepts every order without touching the broker (`DRY_RUN`).
#[derive(Debug, Default)]
pub struct PaperGateway {
    next_id: AtomicU64,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    fn is_dry_run(&self) -> bool {
        true
    }

    async fn submit_market_order(
        &self,
        _account: &Account,
        side: Side,
        code: &str,
        quantity: u64,
    ) -> Result<OrderAck> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let order_id = format!("DRY_RUN-{id:06}");
        info!(%side, code, quantity, %order_id, "paper.fill");
        Ok(OrderAck { order_id })
    }
}
