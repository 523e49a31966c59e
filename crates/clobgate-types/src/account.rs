//! Open orders accounts and settlement requests.
//!
//! Every owner has one open orders account per market. It holds a fixed
//! number of order slots and the "free" balances released by fills and
//! cancels until they are settled back to the owner's wallet.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Address;

/// On-chain record for one (owner, market) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrdersAccount {
    pub address: Address,
    pub owner: Address,
    pub market: Address,
    /// Total order slots.
    pub slot_count: usize,
    /// Slots currently holding a resting order.
    pub slots_used: usize,
    pub base_free: Decimal,
    pub base_total: Decimal,
    pub quote_free: Decimal,
    pub quote_total: Decimal,
}

impl OpenOrdersAccount {
    /// Whether there is anything to settle.
    #[must_use]
    pub fn has_unsettled(&self) -> bool {
        self.base_free > Decimal::ZERO || self.quote_free > Decimal::ZERO
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.slot_count.saturating_sub(self.slots_used)
    }
}

/// A request to settle one owner's free balances on one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub market_name: String,
    pub owner: Address,
    /// Expected free balances when the request was built (informational).
    pub base_free: Decimal,
    pub quote_free: Decimal,
}
