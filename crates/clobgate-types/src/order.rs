//! Order types for the ClobGate gateway.
//!
//! [`OrderRequest`] and [`CancelRequest`] are what callers ask for; they live
//! only for the duration of one call. [`OnChainOrder`] is what the remote
//! program reports; this crate never mutates it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, ClientOrderId, ExchangeOrderId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Ioc,
    PostOnly,
    /// Executes as IOC at the given limit price.
    Market,
}

impl OrderType {
    /// Whether an order of this type can never rest on the book.
    #[must_use]
    pub fn is_immediate(self) -> bool {
        matches!(self, Self::Ioc | Self::Market)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "LIMIT"),
            Self::Ioc => write!(f, "IOC"),
            Self::PostOnly => write!(f, "POST_ONLY"),
            Self::Market => write!(f, "MARKET"),
        }
    }
}

/// Status of an order as far as this gateway can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted by this gateway, not yet visible in the book.
    Pending,
    Open,
    Filled,
    Canceled,
    /// Left the book; no evidence says whether by fill or by cancel.
    FilledOrCanceled,
    /// Its placing transaction has an unknown outcome.
    Ambiguous,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Open => write!(f, "OPEN"),
            Self::Filled => write!(f, "FILLED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::FilledOrCanceled => write!(f, "FILLED_OR_CANCELED"),
            Self::Ambiguous => write!(f, "AMBIGUOUS"),
        }
    }
}

/// A request to place one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub client_id: ClientOrderId,
    pub market_name: String,
    pub owner: Address,
    /// Token account paying for the order; defaults to the owner.
    pub payer: Address,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
}

/// A request to cancel one order, by client id or exchange id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub client_id: ClientOrderId,
    pub market_name: String,
    pub owner: Address,
    pub exchange_id: Option<ExchangeOrderId>,
}

/// An order as reported by the on-chain program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainOrder {
    pub market: String,
    pub owner: Address,
    pub exchange_id: ExchangeOrderId,
    pub client_id: Option<ClientOrderId>,
    pub side: OrderSide,
    pub price: Decimal,
    /// Original amount, when known.
    pub amount: Decimal,
    pub remaining: Decimal,
    pub filled: Decimal,
    pub status: OrderStatus,
}

impl OnChainOrder {
    /// Same order with a different status.
    #[must_use]
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether this record refers to `client_id`.
    #[must_use]
    pub fn has_client_id(&self, client_id: &ClientOrderId) -> bool {
        self.client_id.as_ref() == Some(client_id)
    }
}

/// A fill observed in the program's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillEvent {
    pub market: String,
    pub owner: Address,
    pub exchange_id: ExchangeOrderId,
    pub client_id: Option<ClientOrderId>,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub maker: bool,
    pub observed_at: DateTime<Utc>,
}

impl FillEvent {
    /// Whether this fill belongs to `order`.
    #[must_use]
    pub fn matches(&self, order: &OnChainOrder) -> bool {
        self.owner == order.owner
            && (self.exchange_id == order.exchange_id
                || (self.client_id.is_some() && self.client_id == order.client_id))
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl OrderRequest {
    /// A limit order on `market` for `owner` at `price` x `amount`.
    pub fn dummy_limit(
        client_id: &str,
        market: &str,
        owner: &str,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
    ) -> Self {
        Self {
            client_id: ClientOrderId::new(client_id),
            market_name: market.to_string(),
            owner: Address::new(owner),
            payer: Address::new(owner),
            side,
            order_type: OrderType::Limit,
            price,
            amount,
        }
    }
}
