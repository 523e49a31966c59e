//! Market descriptors and order book views.
//!
//! A [`Market`] is resolved once from the chain and then cached; it never
//! changes while cached. Order book data is always a point-in-time copy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountKey, Address, FillEvent, OnChainOrder, OrderSide};

/// On-chain descriptor of one CLOB market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    /// Configured name (e.g., "SOL/USDT").
    pub name: String,
    /// Market state account.
    pub address: Address,
    /// Program that owns the market.
    pub program_id: Address,
    pub base_symbol: String,
    pub quote_symbol: String,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Minimum size increment.
    pub lot_size: Decimal,
    pub bids: Address,
    pub asks: Address,
    pub event_queue: Address,
    /// Deprecated markets resolve by name but are excluded from "all".
    pub deprecated: bool,
}

impl Market {
    /// The open orders account key for `owner` on this market.
    #[must_use]
    pub fn account_key(&self, owner: &Address) -> AccountKey {
        AccountKey::new(owner.clone(), self.address.clone())
    }

    /// Whether `price` is a whole multiple of the tick size.
    #[must_use]
    pub fn is_price_aligned(&self, price: Decimal) -> bool {
        self.tick_size.is_zero() || (price % self.tick_size).is_zero()
    }

    /// Whether `size` is a whole multiple of the lot size.
    #[must_use]
    pub fn is_size_aligned(&self, size: Decimal) -> bool {
        self.lot_size.is_zero() || (size % self.lot_size).is_zero()
    }
}

/// Raw order book as returned by the chain: every resting order, with owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookSnapshot {
    /// Bids, best (highest) price first.
    pub bids: Vec<OnChainOrder>,
    /// Asks, best (lowest) price first.
    pub asks: Vec<OnChainOrder>,
    /// Slot the snapshot was read at.
    pub slot: u64,
}

impl OrderBookSnapshot {
    /// Iterate every resting order, bids first.
    pub fn orders(&self) -> impl Iterator<Item = &OnChainOrder> {
        self.bids.iter().chain(self.asks.iter())
    }

    /// Resting orders belonging to `owner`.
    #[must_use]
    pub fn orders_of(&self, owner: &Address) -> Vec<OnChainOrder> {
        self.orders().filter(|o| &o.owner == owner).cloned().collect()
    }
}

/// One aggregated price level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
    pub order_count: usize,
}

/// Order book view returned to callers: aggregated levels plus the raw
/// orders and, when the program exposes them, recent fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookView {
    pub market: String,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    #[serde(skip)]
    pub orders: Vec<OnChainOrder>,
    /// `None` when the program offers no event log.
    pub fills: Option<Vec<FillEvent>>,
    pub slot: u64,
    pub taken_at: DateTime<Utc>,
}

impl OrderBookView {
    /// Build a view from a raw snapshot, aggregating orders per price.
    #[must_use]
    pub fn from_snapshot(
        market: &str,
        snapshot: OrderBookSnapshot,
        fills: Option<Vec<FillEvent>>,
    ) -> Self {
        let bids = aggregate(&snapshot.bids, OrderSide::Buy);
        let asks = aggregate(&snapshot.asks, OrderSide::Sell);
        let slot = snapshot.slot;
        let orders = snapshot.bids.into_iter().chain(snapshot.asks).collect();
        Self {
            market: market.to_string(),
            bids,
            asks,
            orders,
            fills,
            slot,
            taken_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Mid price, if both sides have liquidity.
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Resting orders belonging to `owner`.
    #[must_use]
    pub fn orders_of(&self, owner: &Address) -> Vec<OnChainOrder> {
        self.orders
            .iter()
            .filter(|o| &o.owner == owner)
            .cloned()
            .collect()
    }
}

fn aggregate(orders: &[OnChainOrder], side: OrderSide) -> Vec<BookLevel> {
    let mut levels: BTreeMap<Decimal, BookLevel> = BTreeMap::new();
    for order in orders {
        let level = levels.entry(order.price).or_insert_with(|| BookLevel {
            price: order.price,
            size: Decimal::ZERO,
            order_count: 0,
        });
        level.size += order.remaining;
        level.order_count += 1;
    }
    match side {
        OrderSide::Buy => levels.into_values().rev().collect(),
        OrderSide::Sell => levels.into_values().collect(),
    }
}

/// Where a ticker price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickerSource {
    LastFill,
    MidPrice,
    None,
}

/// Latest price information for one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub market: String,
    pub price: Option<Decimal>,
    pub source: TickerSource,
    pub timestamp: DateTime<Utc>,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Market {
    /// A market whose accounts are derived from its name.
    pub fn dummy(name: &str) -> Self {
        let slug = name.replace('/', "-").to_lowercase();
        let (base, quote) = name.split_once('/').unwrap_or((name, "USDC"));
        Self {
            name: name.to_string(),
            address: Address::new(format!("mkt-{slug}")),
            program_id: Address::new("clob-program"),
            base_symbol: base.to_string(),
            quote_symbol: quote.to_string(),
            base_decimals: 9,
            quote_decimals: 6,
            tick_size: Decimal::new(1, 3),
            lot_size: Decimal::new(1, 2),
            bids: Address::new(format!("bids-{slug}")),
            asks: Address::new(format!("asks-{slug}")),
            event_queue: Address::new(format!("events-{slug}")),
            deprecated: false,
        }
    }
}
