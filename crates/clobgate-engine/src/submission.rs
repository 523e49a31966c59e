//! Submission and confirmation engine.
//!
//! Drives one [`TransactionBatch`] through
//! `BUILT → SUBMITTED → {CONFIRMED | FAILED | AMBIGUOUS}`:
//!
//! 1. fetch a fresh blockhash, build and sign the transaction, simulate it
//! 2. send it under the submission timeout
//! 3. poll its signature until confirmed, failed, or the confirmation
//!    timeout expires
//!
//! Failures known to happen before inclusion send the same operations
//! again with a new blockhash, up to `max_submit_attempts`. Once a send may
//! have reached the chain the batch is never sent again: a send timeout or
//! transport error leads to re-checks by signature, and a batch still
//! unresolved after those is AMBIGUOUS.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clobgate_ledger::{SharedChainClient, SharedWallet};
use clobgate_types::{
    BatchState, ChainError, EntityOutcome, GatewayError, InstructionOutcome, RetryConfig,
    SignatureStatus,
    SignedTransaction, SubmissionResult, TimeoutConfig, Transaction, TransactionBatch,
    TxSignature,
};
use tokio::time::Instant;

use crate::retry::{jittered, with_remote_retry};

/// Caller-side cancellation. Honoured only before a batch is sent.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How one attempt ended.
enum Attempt {
    /// The node accepted the transaction.
    Sent(SignedTransaction),
    /// The send was not acknowledged; the transaction may have landed.
    Unacknowledged {
        signed: SignedTransaction,
        cause: String,
    },
    /// Rejected before inclusion; a fresh attempt may succeed.
    Retryable(ChainError),
    /// Will fail the same way every time.
    Terminal {
        outcomes: Vec<EntityOutcome>,
        error: String,
    },
}

/// Runs batches against the chain.
pub struct SubmissionEngine {
    chain: SharedChainClient,
    wallet: SharedWallet,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
}

impl SubmissionEngine {
    #[must_use]
    pub fn new(
        chain: SharedChainClient,
        wallet: SharedWallet,
        timeouts: TimeoutConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            chain,
            wallet,
            timeouts,
            retry,
        }
    }

    /// Submit `batch` and wait for a terminal state.
    pub async fn submit(&self, batch: &TransactionBatch, cancel: &CancelSignal) -> SubmissionResult {
        let mut state = BatchState::Built;
        let mut attempts = 0u32;

        loop {
            if cancel.is_canceled() {
                tracing::info!(batch = %batch.id, attempts, "Batch canceled before send");
                advance(batch, &mut state, BatchState::Failed);
                return failed(batch, attempts, None, GatewayError::Canceled.to_string());
            }
            if !batch.verify_digest() {
                tracing::error!(batch = %batch.id, "Batch digest mismatch, refusing to send");
                advance(batch, &mut state, BatchState::Failed);
                return failed(batch, attempts, None, "batch digest mismatch".into());
            }

            attempts += 1;
            tracing::debug!(
                batch = %batch.id,
                account = %batch.key,
                attempt = attempts,
                ops = batch.len(),
                digest = %batch.digest_hex(),
                "Submitting batch"
            );

            match self.attempt(batch).await {
                Attempt::Sent(signed) => {
                    advance(batch, &mut state, BatchState::Submitted);
                    return self.confirm(batch, &signed.signature, attempts).await;
                }
                Attempt::Unacknowledged { signed, cause } => {
                    advance(batch, &mut state, BatchState::Submitted);
                    tracing::warn!(
                        batch = %batch.id,
                        signature = %signed.signature.short(),
                        cause = %cause,
                        "Send unacknowledged, checking by signature"
                    );
                    return self
                        .recheck(batch, &signed.signature, attempts, &cause)
                        .await;
                }
                Attempt::Terminal { outcomes, error } => {
                    advance(batch, &mut state, BatchState::Failed);
                    tracing::warn!(batch = %batch.id, attempts, error = %error, "Batch failed");
                    return SubmissionResult {
                        batch_id: batch.id,
                        state: BatchState::Failed,
                        signature: None,
                        attempts,
                        slot: None,
                        outcomes,
                        error: Some(error),
                    };
                }
                Attempt::Retryable(err) => {
                    advance(batch, &mut state, BatchState::Failed);
                    if attempts >= self.retry.max_submit_attempts {
                        tracing::warn!(
                            batch = %batch.id,
                            attempts,
                            error = %err,
                            "Batch submission exhausted"
                        );
                        let error = GatewayError::SubmissionExhausted {
                            batch: batch.id,
                            attempts,
                            last_error: err.to_string(),
                        };
                        return failed(batch, attempts, None, error.to_string());
                    }
                    let delay = jittered(self.retry.backoff(attempts));
                    tracing::warn!(
                        batch = %batch.id,
                        attempt = attempts,
                        error = %err,
                        "Batch rejected before inclusion, retrying with fresh blockhash"
                    );
                    tokio::time::sleep(delay).await;
                    advance(batch, &mut state, BatchState::Built);
                }
            }
        }
    }

    async fn attempt(&self, batch: &TransactionBatch) -> Attempt {
        let blockhash = match with_remote_retry(&self.retry, "latest_blockhash", || {
            self.chain.latest_blockhash()
        })
        .await
        {
            Ok(hash) => hash,
            Err(err) => return Attempt::Retryable(err),
        };

        let tx = Transaction {
            batch_id: batch.id,
            recent_blockhash: blockhash,
            fee_payer: batch.key.owner.clone(),
            compute_budget: batch.compute_units,
            instructions: batch.operations().cloned().collect(),
        };
        let signed = match self.wallet.sign(tx, &batch.key.owner).await {
            Ok(signed) => signed,
            Err(err) => {
                let error = err.to_string();
                return Attempt::Terminal {
                    outcomes: vec![EntityOutcome::rejected(error.clone()); batch.len()],
                    error,
                };
            }
        };

        match with_remote_retry(&self.retry, "simulate_transaction", || {
            self.chain.simulate_transaction(&signed)
        })
        .await
        {
            Ok(()) => {}
            Err(ChainError::InstructionError { index, reason }) => {
                return program_rejected(batch.len(), index, reason);
            }
            // Nothing has been sent yet.
            Err(err) => return Attempt::Retryable(err),
        }

        match tokio::time::timeout(self.timeouts.submission(), self.chain.send_transaction(&signed))
            .await
        {
            Err(_) => Attempt::Unacknowledged {
                signed,
                cause: "submission timed out".into(),
            },
            Ok(Ok(_)) => Attempt::Sent(signed),
            Ok(Err(ChainError::InstructionError { index, reason })) => {
                program_rejected(batch.len(), index, reason)
            }
            Ok(Err(err)) if err.is_retryable_before_inclusion() => Attempt::Retryable(err),
            Ok(Err(err)) => Attempt::Unacknowledged {
                signed,
                cause: format!("send failed: {err}"),
            },
        }
    }

    /// Poll until definitive or the confirmation timeout expires.
    async fn confirm(
        &self,
        batch: &TransactionBatch,
        signature: &TxSignature,
        attempts: u32,
    ) -> SubmissionResult {
        let deadline = Instant::now() + self.timeouts.confirmation();
        let poll = self.timeouts.poll_interval();
        loop {
            match self.chain.signature_status(signature).await {
                Ok(status) if status.is_definitive() => {
                    return resolved(batch, signature, attempts, status);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(batch = %batch.id, error = %err, "Status poll failed");
                }
            }
            if Instant::now() + poll > deadline {
                break;
            }
            tokio::time::sleep(poll).await;
        }
        tracing::warn!(
            batch = %batch.id,
            signature = %signature.short(),
            "Confirmation timed out, checking by signature"
        );
        self.recheck(batch, signature, attempts, "confirmation timed out")
            .await
    }

    /// Bounded re-checks after a timeout. Never resubmits.
    async fn recheck(
        &self,
        batch: &TransactionBatch,
        signature: &TxSignature,
        attempts: u32,
        cause: &str,
    ) -> SubmissionResult {
        for check in 1..=self.retry.max_status_rechecks {
            tokio::time::sleep(self.timeouts.status_recheck_interval()).await;
            match self.chain.signature_status(signature).await {
                Ok(status) if status.is_definitive() => {
                    tracing::info!(
                        batch = %batch.id,
                        signature = %signature.short(),
                        check,
                        "Timed-out batch resolved by signature"
                    );
                    return resolved(batch, signature, attempts, status);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(batch = %batch.id, check, error = %err, "Re-check failed");
                }
            }
        }

        tracing::warn!(
            batch = %batch.id,
            account = %batch.key,
            signature = %signature.short(),
            cause,
            "Batch outcome unknown, surfacing AMBIGUOUS"
        );
        let error = GatewayError::Ambiguous {
            signature: signature.clone(),
        };
        SubmissionResult {
            batch_id: batch.id,
            state: BatchState::Ambiguous,
            signature: Some(signature.clone()),
            attempts,
            slot: None,
            outcomes: vec![
                EntityOutcome::Ambiguous {
                    signature: Some(signature.clone()),
                };
                batch.len()
            ],
            error: Some(format!("{error}: {cause}")),
        }
    }
}

fn advance(batch: &TransactionBatch, state: &mut BatchState, next: BatchState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal batch transition {state} -> {next}"
    );
    tracing::debug!(batch = %batch.id, from = %state, to = %next, "Batch state");
    *state = next;
}

fn failed(
    batch: &TransactionBatch,
    attempts: u32,
    signature: Option<TxSignature>,
    error: String,
) -> SubmissionResult {
    SubmissionResult {
        batch_id: batch.id,
        state: BatchState::Failed,
        signature,
        attempts,
        slot: None,
        outcomes: vec![EntityOutcome::rejected(error.clone()); batch.len()],
        error: Some(error),
    }
}

fn program_rejected(len: usize, index: usize, reason: String) -> Attempt {
    Attempt::Terminal {
        outcomes: atomic_rejection(len, index, &reason),
        error: GatewayError::ProgramRejected { index, reason }.to_string(),
    }
}

/// The failing instruction gets the program's reason; the rest of the
/// atomic transaction is rejected with it.
fn atomic_rejection(len: usize, index: usize, reason: &str) -> Vec<EntityOutcome> {
    (0..len)
        .map(|i| {
            if i == index {
                EntityOutcome::rejected(reason)
            } else {
                EntityOutcome::rejected(format!(
                    "transaction rejected: instruction {index} failed"
                ))
            }
        })
        .collect()
}

/// Map a definitive status to the batch result.
fn resolved(
    batch: &TransactionBatch,
    signature: &TxSignature,
    attempts: u32,
    status: SignatureStatus,
) -> SubmissionResult {
    match status {
        SignatureStatus::Confirmed { slot, logs } => {
            let outcomes = (0..batch.len())
                .map(|i| match logs.get(i) {
                    Some(InstructionOutcome::Placed { exchange_id, .. }) => {
                        EntityOutcome::Accepted {
                            signature: signature.clone(),
                            exchange_id: Some(*exchange_id),
                        }
                    }
                    Some(InstructionOutcome::Canceled | InstructionOutcome::Settled { .. }) => {
                        EntityOutcome::Accepted {
                            signature: signature.clone(),
                            exchange_id: None,
                        }
                    }
                    Some(InstructionOutcome::Rejected { reason }) => {
                        EntityOutcome::rejected(reason.clone())
                    }
                    None => EntityOutcome::Ambiguous {
                        signature: Some(signature.clone()),
                    },
                })
                .collect();
            tracing::info!(
                batch = %batch.id,
                account = %batch.key,
                signature = %signature.short(),
                slot,
                attempts,
                "Batch confirmed"
            );
            SubmissionResult {
                batch_id: batch.id,
                state: BatchState::Confirmed,
                signature: Some(signature.clone()),
                attempts,
                slot: Some(slot),
                outcomes,
                error: None,
            }
        }
        SignatureStatus::Failed { slot, reason } => {
            tracing::warn!(
                batch = %batch.id,
                signature = %signature.short(),
                slot,
                reason = %reason,
                "Batch included but failed"
            );
            let error = GatewayError::TransactionFailed {
                signature: signature.clone(),
                reason,
            };
            let mut result = failed(batch, attempts, Some(signature.clone()), error.to_string());
            result.slot = Some(slot);
            result
        }
        SignatureStatus::NotFound | SignatureStatus::Processed => failed(
            batch,
            attempts,
            Some(signature.clone()),
            "status not definitive".into(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clobgate_ledger::{KeyringWallet, SimulatedLedger};
    use clobgate_types::{
        AccountKey, Address, BatchEntry, Market, Operation, OrderRequest, OrderSide,
    };
    use rust_decimal::Decimal;

    use super::*;

    struct Harness {
        ledger: Arc<SimulatedLedger>,
        engine: SubmissionEngine,
        owner: Address,
    }

    fn harness(timeouts: TimeoutConfig) -> Harness {
        let ledger = Arc::new(SimulatedLedger::with_markets(&[Market::dummy("SOL/USDT")]));
        let mut wallet = KeyringWallet::new();
        let owner = wallet.generate();
        let engine = SubmissionEngine::new(
            ledger.clone(),
            Arc::new(wallet),
            timeouts,
            RetryConfig::default(),
        );
        Harness {
            ledger,
            engine,
            owner,
        }
    }

    fn batch(owner: &Address, ids: &[&str]) -> TransactionBatch {
        let market = Market::dummy("SOL/USDT");
        let entries = ids
            .iter()
            .enumerate()
            .map(|(i, id)| BatchEntry {
                position: i,
                key: market.account_key(owner),
                operation: Operation::Place(OrderRequest::dummy_limit(
                    id,
                    "SOL/USDT",
                    owner.as_str(),
                    OrderSide::Buy,
                    Decimal::new(100, 0),
                    Decimal::ONE,
                )),
            })
            .collect();
        TransactionBatch::new(AccountKey::new(owner.clone(), market.address), 0, entries)
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_and_maps_logs() {
        let h = harness(TimeoutConfig::default());
        let result = h
            .engine
            .submit(&batch(&h.owner, &["A", "B"]), &CancelSignal::new())
            .await;
        assert!(result.is_confirmed());
        assert_eq!(result.attempts, 1);
        assert!(result.outcomes.iter().all(EntityOutcome::is_accepted));
        assert_eq!(h.ledger.resting_orders("SOL/USDT").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_blockhash_retries_with_single_effect() {
        let h = harness(TimeoutConfig::default());
        h.ledger.inject_stale_sends(2);
        let result = h
            .engine
            .submit(&batch(&h.owner, &["A"]), &CancelSignal::new())
            .await;
        assert!(result.is_confirmed());
        assert_eq!(result.attempts, 3);
        let stats = h.ledger.stats();
        assert_eq!(stats.sends, 3);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.blockhash_fetches, 3);
        assert_eq!(h.ledger.resting_orders("SOL/USDT").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhaust_into_failed() {
        let h = harness(TimeoutConfig::default());
        h.ledger.inject_stale_sends(10);
        let result = h
            .engine
            .submit(&batch(&h.owner, &["A"]), &CancelSignal::new())
            .await;
        assert_eq!(result.state, BatchState::Failed);
        assert_eq!(result.attempts, 3);
        assert!(result.error.unwrap().starts_with("CG_ERR_400"));
        assert_eq!(h.ledger.stats().applied, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn program_error_in_simulation_is_terminal() {
        let h = harness(TimeoutConfig::default());
        h.ledger.push_simulation_error(ChainError::InstructionError {
            index: 1,
            reason: "price not on tick".into(),
        });
        let result = h
            .engine
            .submit(&batch(&h.owner, &["A", "B"]), &CancelSignal::new())
            .await;
        assert_eq!(result.state, BatchState::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(
            result.outcomes[1],
            EntityOutcome::rejected("price not on tick")
        );
        assert!(result.outcomes[0].is_rejected());
        assert!(result.error.unwrap().starts_with("CG_ERR_402"));
        assert_eq!(h.ledger.stats().sends, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_on_send_is_rechecked_not_resent() {
        let h = harness(TimeoutConfig::default());
        h.ledger.lose_next_send_acks(1);
        let result = h
            .engine
            .submit(&batch(&h.owner, &["A"]), &CancelSignal::new())
            .await;
        assert!(result.is_confirmed());
        assert_eq!(result.attempts, 1);
        assert!(result.outcomes[0].is_accepted());
        let stats = h.ledger.stats();
        assert_eq!(stats.sends, 1);
        assert_eq!(stats.applied, 1);
        assert_eq!(h.ledger.resting_orders("SOL/USDT").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_send_found_confirmed_is_not_resubmitted() {
        let h = harness(TimeoutConfig {
            submission_ms: 100,
            ..TimeoutConfig::default()
        });
        h.ledger.set_send_delay(Duration::from_secs(1));
        let result = h
            .engine
            .submit(&batch(&h.owner, &["A"]), &CancelSignal::new())
            .await;
        assert!(result.is_confirmed());
        assert_eq!(result.attempts, 1);
        assert_eq!(h.ledger.stats().sends, 1);
        assert_eq!(h.ledger.resting_orders("SOL/USDT").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_confirmation_is_found_by_recheck() {
        let h = harness(TimeoutConfig {
            confirmation_ms: 1_000,
            poll_interval_ms: 250,
            ..TimeoutConfig::default()
        });
        // Outlasts polling (~5 queries) but not the first re-checks.
        h.ledger.hide_next_confirmation(6);
        let result = h
            .engine
            .submit(&batch(&h.owner, &["A"]), &CancelSignal::new())
            .await;
        assert!(result.is_confirmed());
        assert_eq!(h.ledger.stats().sends, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_send_surfaces_ambiguous() {
        let h = harness(TimeoutConfig {
            confirmation_ms: 1_000,
            ..TimeoutConfig::default()
        });
        h.ledger.drop_next_sends(1);
        let result = h
            .engine
            .submit(&batch(&h.owner, &["A", "B"]), &CancelSignal::new())
            .await;
        assert!(result.is_ambiguous());
        assert!(result.signature.is_some());
        assert!(result.outcomes.iter().all(EntityOutcome::is_ambiguous));
        assert!(result.error.unwrap().starts_with("CG_ERR_401"));
        assert_eq!(h.ledger.stats().sends, 1);
    }

    #[tokio::test]
    async fn canceled_batch_is_never_sent() {
        let h = harness(TimeoutConfig::default());
        let cancel = CancelSignal::new();
        cancel.cancel();
        let result = h.engine.submit(&batch(&h.owner, &["A"]), &cancel).await;
        assert_eq!(result.state, BatchState::Failed);
        assert_eq!(result.attempts, 0);
        assert!(result.error.unwrap().starts_with("CG_ERR_404"));
        assert_eq!(h.ledger.stats().sends, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_signer_is_terminal() {
        let h = harness(TimeoutConfig::default());
        let stranger = Address::new("stranger");
        let result = h
            .engine
            .submit(&batch(&stranger, &["A"]), &CancelSignal::new())
            .await;
        assert_eq!(result.state, BatchState::Failed);
        assert_eq!(result.attempts, 1);
        assert_eq!(h.ledger.stats().sends, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn program_rejection_in_logs_is_per_entry() {
        let h = harness(TimeoutConfig::default());
        let first = h
            .engine
            .submit(&batch(&h.owner, &["A"]), &CancelSignal::new())
            .await;
        assert!(first.is_confirmed());
        // "A" is already resting, so its second place is rejected by the program.
        let second = h
            .engine
            .submit(&batch(&h.owner, &["A", "B"]), &CancelSignal::new())
            .await;
        assert!(second.is_confirmed());
        assert!(second.outcomes[0].is_rejected());
        assert!(second.outcomes[1].is_accepted());
    }
}
