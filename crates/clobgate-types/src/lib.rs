//! # clobgate-types
//!
//! Shared types, errors, and configuration for the **ClobGate** gateway.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`ClientOrderId`], [`ExchangeOrderId`], [`BatchId`], [`TxSignature`], [`Blockhash`], [`AccountKey`]
//! - **Market model**: [`Market`], [`MarketConfig`], [`OrderBookSnapshot`], [`Ticker`]
//! - **Order model**: [`OrderRequest`], [`CancelRequest`], [`OnChainOrder`], [`OrderSide`], [`OrderType`], [`OrderStatus`], [`FillEvent`], [`OpenOrdersAccount`]
//! - **Batch model**: [`Operation`], [`TransactionBatch`], [`BatchState`]
//! - **Chain model**: [`Transaction`], [`SignedTransaction`], [`SignatureStatus`], [`InstructionOutcome`]
//! - **Outcomes**: [`SubmissionResult`], [`EntityOutcome`], [`OperationReport`], [`BatchResponse`]
//! - **Selection**: [`Selection`], the canonical "all or these" selector
//! - **Configuration**: [`GatewayConfig`] and its sections
//! - **Errors**: [`GatewayError`] with `CG_ERR_` prefix codes, [`ChainError`]
//! - **Constants**: protocol ceilings and defaults

pub mod account;
pub mod batch;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod market;
pub mod order;
pub mod outcome;
pub mod selection;

// Re-export all primary types at crate root for ergonomic imports:
//   use clobgate_types::{OrderRequest, Operation, TransactionBatch, ...};

pub use account::*;
pub use batch::*;
pub use chain::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use market::*;
pub use order::*;
pub use outcome::*;
pub use selection::*;

// Constants are accessed via `clobgate_types::constants::FOO`
// (not re-exported to avoid name collisions).
