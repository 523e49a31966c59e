//! Transaction batch types.
//!
//! A [`TransactionBatch`] is the ordered set of logical operations destined
//! for one physical transaction against one open orders account. Its
//! `digest` commits to the exact operation set, so a retry can prove it is
//! resubmitting the same intent and nothing else.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    AccountKey, Address, BatchId, CancelRequest, OrderRequest, SettleRequest, constants,
};

/// What an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Place,
    Cancel,
    Settle,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Place => write!(f, "PLACE"),
            Self::Cancel => write!(f, "CANCEL"),
            Self::Settle => write!(f, "SETTLE"),
        }
    }
}

/// One logical operation; becomes one instruction in a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Operation {
    Place(OrderRequest),
    Cancel(CancelRequest),
    Settle(SettleRequest),
}

impl Operation {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Place(_) => OperationKind::Place,
            Self::Cancel(_) => OperationKind::Cancel,
            Self::Settle(_) => OperationKind::Settle,
        }
    }

    #[must_use]
    pub fn owner(&self) -> &Address {
        match self {
            Self::Place(o) => &o.owner,
            Self::Cancel(c) => &c.owner,
            Self::Settle(s) => &s.owner,
        }
    }

    #[must_use]
    pub fn market_name(&self) -> &str {
        match self {
            Self::Place(o) => &o.market_name,
            Self::Cancel(c) => &c.market_name,
            Self::Settle(s) => &s.market_name,
        }
    }

    /// The caller-visible entity this operation reports on: the client id
    /// for places and cancels, the market name for settles.
    #[must_use]
    pub fn entity(&self) -> String {
        match self {
            Self::Place(o) => o.client_id.to_string(),
            Self::Cancel(c) => c.client_id.to_string(),
            Self::Settle(s) => s.market_name.clone(),
        }
    }

    /// Estimated compute units for this operation's instruction.
    #[must_use]
    pub fn compute_units(&self) -> u64 {
        match self {
            Self::Place(_) => constants::PLACE_COMPUTE_UNITS,
            Self::Cancel(_) => constants::CANCEL_COMPUTE_UNITS,
            Self::Settle(_) => constants::SETTLE_COMPUTE_UNITS,
        }
    }
}

/// An operation together with its position in the caller's request and the
/// account it writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Index in the original request; reports are returned in this order.
    pub position: usize,
    pub key: AccountKey,
    pub operation: Operation,
}

/// Ordered operations for one physical transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionBatch {
    pub id: BatchId,
    pub key: AccountKey,
    /// Index of this batch within its account's chain (0-based).
    pub sequence: usize,
    pub entries: Vec<BatchEntry>,
    pub compute_units: u64,
    /// SHA-256 commitment to `key` and the ordered operations.
    pub digest: [u8; 32],
}

impl TransactionBatch {
    /// Build a batch and compute its digest.
    #[must_use]
    pub fn new(key: AccountKey, sequence: usize, entries: Vec<BatchEntry>) -> Self {
        let compute_units = entries.iter().map(|e| e.operation.compute_units()).sum();
        let digest = Self::compute_digest(&key, &entries);
        Self {
            id: BatchId::new(),
            key,
            sequence,
            entries,
            compute_units,
            digest,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The operations in submission order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter().map(|e| &e.operation)
    }

    /// Hex form of the digest, for logs.
    #[must_use]
    pub fn digest_hex(&self) -> String {
        hex::encode(&self.digest[..8])
    }

    /// Check that the operations still match the digest taken at build time.
    #[must_use]
    pub fn verify_digest(&self) -> bool {
        Self::compute_digest(&self.key, &self.entries) == self.digest
    }

    /// `SHA-256(domain_sep || owner || market || count || for each op: kind || fields)`
    fn compute_digest(key: &AccountKey, entries: &[BatchEntry]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"clobgate:batch:v1:");
        hasher.update(key.owner.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(key.market.as_str().as_bytes());
        hasher.update((entries.len() as u64).to_le_bytes());

        for entry in entries {
            match &entry.operation {
                Operation::Place(o) => {
                    hasher.update([0u8]);
                    hasher.update(o.client_id.as_str().as_bytes());
                    hasher.update([0u8]);
                    hasher.update(o.side.to_string().as_bytes());
                    hasher.update(o.order_type.to_string().as_bytes());
                    hasher.update(o.price.normalize().to_string().as_bytes());
                    hasher.update([0u8]);
                    hasher.update(o.amount.normalize().to_string().as_bytes());
                }
                Operation::Cancel(c) => {
                    hasher.update([1u8]);
                    hasher.update(c.client_id.as_str().as_bytes());
                    if let Some(id) = c.exchange_id {
                        hasher.update(id.0.to_le_bytes());
                    }
                }
                Operation::Settle(s) => {
                    hasher.update([2u8]);
                    hasher.update(s.market_name.as_bytes());
                }
            }
        }

        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }
}

/// Lifecycle of one batch inside the submission engine.
///
/// `BUILT → SUBMITTED → {CONFIRMED | FAILED | AMBIGUOUS}`. A batch that
/// FAILED before inclusion may return to BUILT for a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Built,
    Submitted,
    Confirmed,
    Failed,
    Ambiguous,
}

impl BatchState {
    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Built, Self::Submitted | Self::Failed)
                | (
                    Self::Submitted,
                    Self::Confirmed | Self::Failed | Self::Ambiguous
                )
                | (Self::Failed, Self::Built)
        )
    }

    /// CONFIRMED and AMBIGUOUS never move again.
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Confirmed | Self::Ambiguous)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Built => write!(f, "BUILT"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Ambiguous => write!(f, "AMBIGUOUS"),
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl BatchEntry {
    /// A place entry for a limit buy of 1 @ `price` on a fixed account.
    pub fn dummy_place(position: usize, client_id: &str, price: i64) -> Self {
        let order = OrderRequest::dummy_limit(
            client_id,
            "SOL/USDT",
            "alice",
            crate::OrderSide::Buy,
            Decimal::new(price, 0),
            Decimal::ONE,
        );
        Self {
            position,
            key: AccountKey::new(Address::new("alice"), Address::new("mkt-sol-usdt")),
            operation: Operation::Place(order),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<BatchEntry> {
        (0..n)
            .map(|i| BatchEntry::dummy_place(i, &format!("c{i}"), 100 + i64::try_from(i).unwrap()))
            .collect()
    }

    fn key() -> AccountKey {
        AccountKey::new(Address::new("alice"), Address::new("mkt-sol-usdt"))
    }

    #[test]
    fn digest_is_deterministic() {
        let a = TransactionBatch::new(key(), 0, entries(3));
        let b = TransactionBatch::new(key(), 0, entries(3));
        assert_ne!(a.id, b.id);
        assert_eq!(a.digest, b.digest);
        assert!(a.verify_digest());
    }

    #[test]
    fn digest_depends_on_order() {
        let mut reversed = entries(3);
        reversed.reverse();
        let a = TransactionBatch::new(key(), 0, entries(3));
        let b = TransactionBatch::new(key(), 0, reversed);
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn tampered_batch_fails_verification() {
        let mut batch = TransactionBatch::new(key(), 0, entries(2));
        batch.entries.pop();
        assert!(!batch.verify_digest());
    }

    #[test]
    fn compute_units_summed() {
        let batch = TransactionBatch::new(key(), 0, entries(4));
        assert_eq!(batch.compute_units, 4 * constants::PLACE_COMPUTE_UNITS);
        assert_eq!(batch.len(), 4);
    }

    #[test]
    fn state_transitions() {
        use BatchState::*;
        assert!(Built.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Ambiguous));
        assert!(Failed.can_transition_to(Built));
        assert!(!Ambiguous.can_transition_to(Built));
        assert!(!Confirmed.can_transition_to(Submitted));
        assert!(!Built.can_transition_to(Confirmed));
        assert!(Ambiguous.is_final());
        assert!(!Failed.is_final());
    }

    #[test]
    fn operation_serde_is_tagged() {
        let entry = BatchEntry::dummy_place(0, "A", 100);
        let json = serde_json::to_value(&entry.operation).unwrap();
        assert_eq!(json["kind"], "place");
        assert_eq!(json["clientId"], "A");
    }
}
