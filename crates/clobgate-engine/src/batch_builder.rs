//! Batch transaction builder.
//!
//! Groups operations by the account they write, then packs each group into
//! as few transactions as the protocol allows. Packing is next-fit in
//! request order: a batch closes when adding the next operation would
//! exceed either the operation ceiling or the compute budget. Operations
//! are never reordered, inside a batch or across the batches of a chain.

use std::collections::HashMap;

use clobgate_types::{AccountKey, BatchEntry, GatewayError, ProtocolLimits, TransactionBatch};

/// The batches for one account, to be executed strictly in order.
#[derive(Debug, Clone)]
pub struct BatchChain {
    pub key: AccountKey,
    pub batches: Vec<TransactionBatch>,
}

/// Output of [`BatchBuilder::plan`].
#[derive(Debug, Default)]
pub struct BatchPlan {
    /// One chain per account key, in first-appearance order.
    pub chains: Vec<BatchChain>,
    /// Entries that cannot fit any transaction.
    pub rejected: Vec<(BatchEntry, GatewayError)>,
}

impl BatchPlan {
    /// Total number of transactions the plan will send.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.chains.iter().map(|c| c.batches.len()).sum()
    }
}

/// Packs operations into transaction batches.
pub struct BatchBuilder {
    limits: ProtocolLimits,
}

impl BatchBuilder {
    #[must_use]
    pub fn new(limits: ProtocolLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn limits(&self) -> &ProtocolLimits {
        &self.limits
    }

    /// Split `entries` into per-account chains of bounded batches.
    #[must_use]
    pub fn plan(&self, entries: Vec<BatchEntry>) -> BatchPlan {
        let mut groups: Vec<(AccountKey, Vec<BatchEntry>)> = Vec::new();
        let mut index: HashMap<AccountKey, usize> = HashMap::new();
        for entry in entries {
            let slot = *index.entry(entry.key.clone()).or_insert_with(|| {
                groups.push((entry.key.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(entry);
        }

        let mut plan = BatchPlan::default();
        for (key, group) in groups {
            let batches = self.pack(&key, group, &mut plan.rejected);
            if !batches.is_empty() {
                plan.chains.push(BatchChain { key, batches });
            }
        }

        tracing::debug!(
            chains = plan.chains.len(),
            batches = plan.batch_count(),
            rejected = plan.rejected.len(),
            "Batch plan built"
        );
        plan
    }

    fn pack(
        &self,
        key: &AccountKey,
        group: Vec<BatchEntry>,
        rejected: &mut Vec<(BatchEntry, GatewayError)>,
    ) -> Vec<TransactionBatch> {
        let max_ops = self.limits.max_ops_per_tx.max(1);
        let budget = self.limits.compute_budget_units;

        let mut batches = Vec::new();
        let mut current: Vec<BatchEntry> = Vec::new();
        let mut current_cu = 0u64;

        for entry in group {
            let cu = entry.operation.compute_units();
            if cu > budget {
                rejected.push((
                    entry,
                    GatewayError::OperationTooLarge {
                        compute_units: cu,
                        budget,
                    },
                ));
                continue;
            }
            if !current.is_empty() && (current.len() == max_ops || current_cu + cu > budget) {
                let sequence = batches.len();
                batches.push(TransactionBatch::new(
                    key.clone(),
                    sequence,
                    std::mem::take(&mut current),
                ));
                current_cu = 0;
            }
            current_cu += cu;
            current.push(entry);
        }
        if !current.is_empty() {
            let sequence = batches.len();
            batches.push(TransactionBatch::new(key.clone(), sequence, current));
        }
        batches
    }
}
