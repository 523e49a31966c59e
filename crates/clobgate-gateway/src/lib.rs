//! # clobgate-gateway
//!
//! **Caller plane**: the uniform order-management API.
//!
//! ## Operations
//!
//! | Operation | Shape | Result |
//! |---|---|---|
//! | `get_markets` | `marketName` / `marketNames` / neither | markets |
//! | `get_tickers` | `marketName` / `marketNames` / neither | tickers |
//! | `get_order_books` | `marketName` / `marketNames` / neither | book views |
//! | `get_orders` | owner + markets + optional client ids | open and recent orders |
//! | `get_open_orders` | owner + markets + optional client ids | open orders |
//! | `get_filled_orders` | owner + markets + optional client ids | departed orders |
//! | `create_orders` | owner + `order` / `orders` | [`BatchResponse`](clobgate_types::BatchResponse) |
//! | `cancel_orders` | owner + `order` / `orders` | `BatchResponse` |
//! | `cancel_open_orders` | owner + markets | `BatchResponse` |
//! | `settle_funds` | owner + markets | `BatchResponse` |
//!
//! Request-shape errors fail the whole call with
//! `CG_ERR_100`. Everything past normalization is reported per entity.

pub mod gateway;
pub mod normalizer;
pub mod request;
pub mod telemetry;

pub use gateway::ClobGateway;
pub use normalizer::OrdersScope;
pub use request::{
    CancelOrdersRequest, CreateOrdersRequest, MarketsRequest, NewOrder, OrderRef, OrdersQuery,
    OwnerMarketsRequest,
};
