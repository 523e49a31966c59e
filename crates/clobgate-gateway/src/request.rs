//! Caller-facing request bodies.
//!
//! Every body accepts a singular field, its plural counterpart, or neither.
//! Nothing here is validated; see [`crate::normalizer`].

use clobgate_types::{
    Address, ClientOrderId, ExchangeOrderId, GatewayError, OrderSide, OrderType, Result,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Parse a camelCase JSON body. Malformed bodies are a request-shape error.
pub fn parse<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| GatewayError::shape(e.to_string()))
}

/// Body of `get_markets`, `get_tickers` and `get_order_books`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketsRequest {
    pub market_name: Option<String>,
    pub market_names: Option<Vec<String>>,
}

impl MarketsRequest {
    #[must_use]
    pub fn one(name: &str) -> Self {
        Self {
            market_name: Some(name.to_string()),
            market_names: None,
        }
    }

    #[must_use]
    pub fn many(names: &[&str]) -> Self {
        Self {
            market_name: None,
            market_names: Some(names.iter().map(ToString::to_string).collect()),
        }
    }
}

/// Body of `cancel_open_orders` and `settle_funds`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OwnerMarketsRequest {
    pub owner: Option<Address>,
    pub market_name: Option<String>,
    pub market_names: Option<Vec<String>>,
}

impl OwnerMarketsRequest {
    /// Every active market for `owner`.
    #[must_use]
    pub fn all(owner: &Address) -> Self {
        Self {
            owner: Some(owner.clone()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn on(owner: &Address, names: &[&str]) -> Self {
        Self {
            owner: Some(owner.clone()),
            market_name: None,
            market_names: Some(names.iter().map(ToString::to_string).collect()),
        }
    }
}

/// Body of `get_orders`, `get_open_orders` and `get_filled_orders`.
/// Client ids narrow the result; without them every order is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrdersQuery {
    pub owner: Option<Address>,
    pub market_name: Option<String>,
    pub market_names: Option<Vec<String>>,
    pub client_id: Option<ClientOrderId>,
    pub client_ids: Option<Vec<ClientOrderId>>,
}

impl OrdersQuery {
    #[must_use]
    pub fn on(owner: &Address, names: &[&str]) -> Self {
        Self {
            owner: Some(owner.clone()),
            market_names: Some(names.iter().map(ToString::to_string).collect()),
            ..Self::default()
        }
    }
}

/// One order in a `create_orders` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub client_id: ClientOrderId,
    pub market_name: String,
    pub side: OrderSide,
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    /// Token account paying for the order; the owner when absent.
    #[serde(default)]
    pub payer: Option<Address>,
}

fn default_order_type() -> OrderType {
    OrderType::Limit
}

impl NewOrder {
    #[must_use]
    pub fn limit(
        client_id: &str,
        market: &str,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
    ) -> Self {
        Self {
            client_id: ClientOrderId::new(client_id),
            market_name: market.to_string(),
            side,
            order_type: OrderType::Limit,
            price,
            amount,
            payer: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateOrdersRequest {
    pub owner: Option<Address>,
    pub order: Option<NewOrder>,
    pub orders: Option<Vec<NewOrder>>,
}

impl CreateOrdersRequest {
    #[must_use]
    pub fn new(owner: &Address, orders: Vec<NewOrder>) -> Self {
        Self {
            owner: Some(owner.clone()),
            order: None,
            orders: Some(orders),
        }
    }
}

/// One order in a `cancel_orders` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub client_id: ClientOrderId,
    pub market_name: String,
    #[serde(default)]
    pub exchange_id: Option<ExchangeOrderId>,
}

impl OrderRef {
    #[must_use]
    pub fn new(client_id: &str, market: &str) -> Self {
        Self {
            client_id: ClientOrderId::new(client_id),
            market_name: market.to_string(),
            exchange_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CancelOrdersRequest {
    pub owner: Option<Address>,
    pub order: Option<OrderRef>,
    pub orders: Option<Vec<OrderRef>>,
}

impl CancelOrdersRequest {
    #[must_use]
    pub fn new(owner: &Address, orders: Vec<OrderRef>) -> Self {
        Self {
            owner: Some(owner.clone()),
            order: None,
            orders: Some(orders),
        }
    }
}
