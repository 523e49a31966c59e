//! Wire-level transaction model shared with the chain collaborators.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, BatchId, Blockhash, ExchangeOrderId, Operation, Result, TxSignature};

/// An unsigned transaction built from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub batch_id: BatchId,
    pub recent_blockhash: Blockhash,
    pub fee_payer: Address,
    /// Compute units requested for the whole transaction.
    pub compute_budget: u64,
    /// One instruction per operation, in batch order.
    pub instructions: Vec<Operation>,
}

impl Transaction {
    /// Canonical bytes that get signed.
    pub fn message_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A transaction plus the signature that identifies it on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signer: Address,
    pub signature: TxSignature,
}

/// Per-instruction result read back from a confirmed transaction's logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum InstructionOutcome {
    Placed {
        exchange_id: ExchangeOrderId,
        /// `false` when the order did not rest (IOC, or fully filled).
        resting: bool,
    },
    Canceled,
    Settled {
        base: Decimal,
        quote: Decimal,
    },
    Rejected {
        reason: String,
    },
}

/// What the chain knows about a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SignatureStatus {
    /// Never seen, or already dropped.
    NotFound,
    /// Seen by the leader but not yet committed.
    Processed,
    /// Committed; `logs[i]` is the outcome of instruction `i`.
    Confirmed {
        slot: u64,
        logs: Vec<InstructionOutcome>,
    },
    /// Included but failed; nothing was applied.
    Failed { slot: u64, reason: String },
}

impl SignatureStatus {
    /// Whether the chain has a definitive answer.
    #[must_use]
    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Failed { .. })
    }
}
