//! Fallback reconciliation worker: covers provider webhooks that never
//! arrive by actively polling PENDING transactions past the grace window.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::component::{CloseReason, Component, ConsumerPorts};
use crate::component::common::Ports;
use crate::frame::EventFrame;
use crate::store::durable::DurableStore;

use super::PaymentOrchestrator;

#[derive(Clone)]
pub struct PollerContext {
    pub store: DurableStore,
    pub orchestrator: PaymentOrchestrator,
    pub period_ms: u64,
    pub grace_secs: i64,
    pub max_age_secs: i64,
    pub batch_size: i64,
}

pub struct PaymentPoller;

#[async_trait]
impl Component<ConsumerPorts, PollerContext> for PaymentPoller {
    fn name(&self) -> &str {
        "payment-poller"
    }

    async fn run(mut ports: ConsumerPorts, ctx: PollerContext) {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(ctx.period_ms));
        loop {
            tokio::select! {
                frame = ports.recv() => {
                    match frame {
                        Some(EventFrame::Shutdown) | None => break,
                        Some(_) => continue,
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = poll_once(&ctx).await {
                        warn!("payment poller tick failed: {}", e);
                    }
                }
            }
        }
        info!("payment poller shutting down");
        ports.close(CloseReason::Complete);
    }
}

async fn poll_once(ctx: &PollerContext) -> wager_core::Result<()> {
    let stale = ctx
        .store
        .list_stale_pending_transactions(ctx.grace_secs, ctx.max_age_secs, ctx.batch_size)
        .await?;
    for txn in &stale {
        if let Err(e) = ctx.orchestrator.poll_and_reconcile(txn).await {
            warn!("poll_and_reconcile failed for transaction {}: {}", txn.id, e);
        }
    }
    Ok(())
}
