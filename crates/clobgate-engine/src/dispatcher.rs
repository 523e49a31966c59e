//! Shared mutation pipeline: builder → serializer → submission engine.
//!
//! Chains for different accounts run concurrently. The batches of one
//! chain run one after another, each under its account lock. When a batch
//! ends AMBIGUOUS the rest of its chain is not sent, since those batches
//! were planned against account state that is now unknown.

use std::sync::Arc;

use clobgate_types::{
    BatchEntry, BatchState, EntityOutcome, Operation, OperationReport, TransactionBatch,
};
use futures::future::join_all;

use crate::account_lock::AccountSerializer;
use crate::batch_builder::{BatchBuilder, BatchChain};
use crate::submission::{CancelSignal, SubmissionEngine};
use crate::tracker::OrderTracker;

/// Reason given to batches skipped after an ambiguous predecessor.
pub const PRECEDING_AMBIGUOUS: &str = "preceding batch outcome unknown";

/// Runs planned batches and reports per-operation outcomes.
pub struct Dispatcher {
    builder: BatchBuilder,
    serializer: Arc<AccountSerializer>,
    engine: Arc<SubmissionEngine>,
    tracker: Arc<OrderTracker>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        builder: BatchBuilder,
        serializer: Arc<AccountSerializer>,
        engine: Arc<SubmissionEngine>,
        tracker: Arc<OrderTracker>,
    ) -> Self {
        Self {
            builder,
            serializer,
            engine,
            tracker,
        }
    }

    #[must_use]
    pub fn serializer(&self) -> &AccountSerializer {
        &self.serializer
    }

    /// Execute `entries`; one report per entry, in position order.
    pub async fn dispatch(
        &self,
        entries: Vec<BatchEntry>,
        cancel: &CancelSignal,
    ) -> Vec<OperationReport> {
        let plan = self.builder.plan(entries);

        let mut reports: Vec<OperationReport> = plan
            .rejected
            .into_iter()
            .map(|(entry, err)| report(&entry, EntityOutcome::rejected(err.to_string())))
            .collect();

        let chains = join_all(plan.chains.into_iter().map(|chain| self.run_chain(chain, cancel)))
            .await;
        reports.extend(chains.into_iter().flatten());

        for r in &reports {
            if r.outcome.is_rejected() {
                tracing::debug!(entity = %r.entity, market = %r.market, outcome = ?r.outcome, "Operation rejected");
            }
        }
        reports.sort_by_key(|r| r.position);
        reports
    }

    async fn run_chain(&self, chain: BatchChain, cancel: &CancelSignal) -> Vec<OperationReport> {
        let mut reports = Vec::new();
        let mut blocked = false;

        for batch in chain.batches {
            if blocked {
                reports.extend(
                    batch
                        .entries
                        .iter()
                        .map(|e| report(e, EntityOutcome::rejected(PRECEDING_AMBIGUOUS))),
                );
                self.release_rejected(&batch);
                continue;
            }

            let outcomes = match self
                .serializer
                .with_lock(&batch.key, self.engine.submit(&batch, cancel))
                .await
            {
                Ok(result) => {
                    tracing::info!(
                        batch = %batch.id,
                        account = %chain.key,
                        sequence = batch.sequence,
                        state = %result.state,
                        attempts = result.attempts,
                        "Batch finished"
                    );
                    if result.state == BatchState::Ambiguous {
                        blocked = true;
                    }
                    result.outcomes
                }
                Err(err) => vec![EntityOutcome::rejected(err.to_string()); batch.len()],
            };

            for (entry, outcome) in batch.entries.iter().zip(outcomes) {
                self.track(entry, &outcome);
                reports.push(report(entry, outcome));
            }
        }
        reports
    }

    fn track(&self, entry: &BatchEntry, outcome: &EntityOutcome) {
        match (&entry.operation, outcome) {
            (
                Operation::Place(order),
                EntityOutcome::Accepted {
                    signature,
                    exchange_id,
                },
            ) => self
                .tracker
                .mark_live(&order.owner, &order.client_id, *exchange_id, signature),
            (Operation::Place(order), EntityOutcome::Ambiguous { signature }) => self
                .tracker
                .mark_ambiguous(&order.owner, &order.client_id, signature.as_ref()),
            (Operation::Place(order), EntityOutcome::Rejected { .. }) => {
                self.tracker.release(&order.owner, &order.client_id);
            }
            (Operation::Cancel(cancel), EntityOutcome::Accepted { .. }) => self
                .tracker
                .mark_cancel_confirmed(&cancel.owner, &cancel.client_id),
            _ => {}
        }
    }

    fn release_rejected(&self, batch: &TransactionBatch) {
        for entry in &batch.entries {
            if let Operation::Place(order) = &entry.operation {
                self.tracker.release(&order.owner, &order.client_id);
            }
        }
    }
}

fn report(entry: &BatchEntry, outcome: EntityOutcome) -> OperationReport {
    OperationReport {
        position: entry.position,
        kind: entry.operation.kind(),
        entity: entry.operation.entity(),
        market: entry.operation.market_name().to_string(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clobgate_ledger::{KeyringWallet, SimulatedLedger};
    use clobgate_types::{
        Address, Market, OrderRequest, OrderSide, ProtocolLimits, RetryConfig, TimeoutConfig,
        TrackerConfig, constants,
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::tracker::TrackedState;

    struct Harness {
        ledger: Arc<SimulatedLedger>,
        tracker: Arc<OrderTracker>,
        dispatcher: Dispatcher,
        owner: Address,
    }

    fn harness(max_ops: usize) -> Harness {
        let ledger = Arc::new(SimulatedLedger::with_markets(&[Market::dummy("SOL/USDT")]));
        let mut wallet = KeyringWallet::new();
        let owner = wallet.generate();
        let timeouts = TimeoutConfig {
            confirmation_ms: 1_000,
            ..TimeoutConfig::default()
        };
        let engine = Arc::new(SubmissionEngine::new(
            ledger.clone(),
            Arc::new(wallet),
            timeouts.clone(),
            RetryConfig::default(),
        ));
        let tracker = Arc::new(OrderTracker::new(&TrackerConfig::default()));
        let dispatcher = Dispatcher::new(
            BatchBuilder::new(ProtocolLimits {
                max_ops_per_tx: max_ops,
                compute_budget_units: constants::DEFAULT_COMPUTE_BUDGET_UNITS,
            }),
            Arc::new(AccountSerializer::new(timeouts.lock_acquire())),
            engine,
            tracker.clone(),
        );
        Harness {
            ledger,
            tracker,
            dispatcher,
            owner,
        }
    }

    fn places(h: &Harness, ids: &[&str]) -> Vec<BatchEntry> {
        let market = Market::dummy("SOL/USDT");
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let order = OrderRequest::dummy_limit(
                    id,
                    "SOL/USDT",
                    h.owner.as_str(),
                    OrderSide::Buy,
                    Decimal::new(100, 0),
                    Decimal::ONE,
                );
                h.tracker.reserve(&order).unwrap();
                BatchEntry {
                    position: i,
                    key: market.account_key(&h.owner),
                    operation: Operation::Place(order),
                }
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn reports_in_request_order_and_tracks_live_orders() {
        let h = harness(2);
        let reports = h
            .dispatcher
            .dispatch(places(&h, &["A", "B", "C"]), &CancelSignal::new())
            .await;
        let entities: Vec<&str> = reports.iter().map(|r| r.entity.as_str()).collect();
        assert_eq!(entities, vec!["A", "B", "C"]);
        assert!(reports.iter().all(|r| r.outcome.is_accepted()));
        assert_eq!(h.ledger.stats().applied, 2);
        assert_eq!(h.ledger.stats().write_conflicts, 0);
        assert_eq!(
            h.tracker.get(&h.owner, &"C".into()).unwrap().state,
            TrackedState::Live
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_batch_blocks_rest_of_chain() {
        let h = harness(1);
        h.ledger.drop_next_sends(1);
        let reports = h
            .dispatcher
            .dispatch(places(&h, &["A", "B"]), &CancelSignal::new())
            .await;
        assert!(reports[0].outcome.is_ambiguous());
        assert_eq!(reports[1].outcome, EntityOutcome::rejected(PRECEDING_AMBIGUOUS));
        assert_eq!(h.ledger.stats().sends, 1);

        // "A" stays reserved; "B" is free to reuse.
        assert!(h.tracker.is_live(&h.owner, &"A".into()));
        assert!(!h.tracker.is_live(&h.owner, &"B".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn lock_timeout_is_reported_per_entity() {
        let h = harness(12);
        let key = Market::dummy("SOL/USDT").account_key(&h.owner);
        let entries = places(&h, &["A"]);
        let serializer = h.dispatcher.serializer();
        let (held, reports) = tokio::join!(
            serializer.with_lock(&key, tokio::time::sleep(Duration::from_secs(120))),
            async {
                tokio::task::yield_now().await;
                h.dispatcher.dispatch(entries, &CancelSignal::new()).await
            }
        );
        held.unwrap();
        assert!(reports[0].outcome.is_rejected());
        assert_eq!(h.ledger.stats().sends, 0);
        assert!(!h.tracker.is_live(&h.owner, &"A".into()));
    }
}
