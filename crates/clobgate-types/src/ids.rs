//! Identifiers used throughout ClobGate.
//!
//! On-chain addresses, signatures and blockhashes are carried as opaque
//! strings: this crate never interprets their encoding. Batch IDs use
//! UUIDv7 for time-ordered sorting.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// An on-chain account address (owner wallet, market, open orders, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ClientOrderId
// ---------------------------------------------------------------------------

/// Caller-chosen order identifier. Unique per owner while the order is live;
/// NOT guaranteed unique across markets unless the caller ensures it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(pub String);

impl ClientOrderId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientOrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// ExchangeOrderId
// ---------------------------------------------------------------------------

/// The order's sequence identifier assigned by the on-chain program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeOrderId(pub u128);

impl fmt::Display for ExchangeOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// Unique identifier for one transaction batch. Uses UUIDv7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TxSignature / Blockhash
// ---------------------------------------------------------------------------

/// Transaction signature; also the handle used to query confirmation status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(pub String);

impl TxSignature {
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recent blockhash. Transactions are only valid for a bounded window
/// after the blockhash they reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blockhash(pub String);

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AccountKey
// ---------------------------------------------------------------------------

/// Identifies one open orders account: the (owner, market) pair.
///
/// The remote ledger rejects concurrent transactions that write the same
/// account, so this is also the unit of serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountKey {
    pub owner: Address,
    pub market: Address,
}

impl AccountKey {
    #[must_use]
    pub fn new(owner: Address, market: Address) -> Self {
        Self { owner, market }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.owner.short(), self.market.short())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_id_uniqueness_and_ordering() {
        let a = BatchId::new();
        let b = BatchId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn address_short_handles_short_values() {
        assert_eq!(Address::new("abc").short(), "abc");
        assert_eq!(Address::new("0123456789abcdef").short(), "01234567");
    }

    #[test]
    fn blank_client_id() {
        assert!(ClientOrderId::new("  ").is_blank());
        assert!(!ClientOrderId::new("A").is_blank());
    }

    #[test]
    fn account_key_display() {
        let key = AccountKey::new(Address::new("ownerownerowner"), Address::new("marketmarket"));
        assert_eq!(key.to_string(), "ownerown@marketma");
    }

    #[test]
    fn transparent_serde() {
        let id = ClientOrderId::new("order-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"order-1\"");
        let back: ExchangeOrderId = serde_json::from_str("42").unwrap();
        assert_eq!(back, ExchangeOrderId(42));
    }
}
