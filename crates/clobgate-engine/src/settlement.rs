//! Funds settlement coordinator.
//!
//! Settles an owner's free balances market by market. Markets with nothing
//! to settle, or no open orders account at all, are skipped without a
//! transaction. The rest go through the [`Dispatcher`] as one Settle
//! operation per market, so they batch, serialize and retry like any other
//! mutation. Each market writes a different account, so they settle
//! concurrently.

use std::sync::Arc;

use clobgate_ledger::SharedChainClient;
use clobgate_types::{
    Address, BatchEntry, EntityOutcome, GatewayError, Market, Operation, OperationKind,
    OperationReport, RetryConfig, SettleRequest,
};
use futures::future::join_all;

use crate::dispatcher::Dispatcher;
use crate::retry::with_remote_retry;
use crate::submission::CancelSignal;

/// Reason reported for markets with nothing to settle.
pub const NOTHING_TO_SETTLE: &str = "no free balance to settle";

/// Batches settlement of unclaimed balances across markets.
pub struct SettlementCoordinator {
    chain: SharedChainClient,
    dispatcher: Arc<Dispatcher>,
    retry: RetryConfig,
}

impl SettlementCoordinator {
    #[must_use]
    pub fn new(chain: SharedChainClient, dispatcher: Arc<Dispatcher>, retry: RetryConfig) -> Self {
        Self {
            chain,
            dispatcher,
            retry,
        }
    }

    /// Settle `owner`'s free balances on every market in `markets`.
    /// Reports follow the order of `markets`.
    pub async fn settle(
        &self,
        owner: &Address,
        markets: &[Market],
        cancel: &CancelSignal,
    ) -> Vec<OperationReport> {
        let accounts = join_all(markets.iter().map(|market| {
            with_remote_retry(&self.retry, "open_orders_account", move || {
                self.chain.open_orders_account(owner, market)
            })
        }))
        .await;

        let mut reports = Vec::new();
        let mut entries = Vec::new();
        for (position, (market, account)) in markets.iter().zip(accounts).enumerate() {
            let skip = |outcome: EntityOutcome| OperationReport {
                position,
                kind: OperationKind::Settle,
                entity: market.name.clone(),
                market: market.name.clone(),
                outcome,
            };
            match account {
                Err(err) => {
                    let err = GatewayError::from(err);
                    tracing::warn!(owner = %owner.short(), market = %market.name, error = %err, "Open orders account unreadable");
                    reports.push(skip(EntityOutcome::rejected(err.to_string())));
                }
                Ok(Some(account)) if account.has_unsettled() => {
                    entries.push(BatchEntry {
                        position,
                        key: market.account_key(owner),
                        operation: Operation::Settle(SettleRequest {
                            market_name: market.name.clone(),
                            owner: owner.clone(),
                            base_free: account.base_free,
                            quote_free: account.quote_free,
                        }),
                    });
                }
                Ok(_) => {
                    tracing::debug!(owner = %owner.short(), market = %market.name, "Nothing to settle");
                    reports.push(skip(EntityOutcome::Skipped {
                        reason: NOTHING_TO_SETTLE.into(),
                    }));
                }
            }
        }

        if !entries.is_empty() {
            tracing::info!(
                owner = %owner.short(),
                markets = entries.len(),
                skipped = reports.len(),
                "Settling funds"
            );
            reports.extend(self.dispatcher.dispatch(entries, cancel).await);
        }
        reports.sort_by_key(|r| r.position);
        reports
    }
}
