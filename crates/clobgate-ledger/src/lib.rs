//! # clobgate-ledger
//!
//! **Collaborator plane**: the capabilities the gateway consumes but does
//! not own.
//!
//! ## Contents
//!
//! 1. **ChainClient**: blockhash, simulate, send, signature status, market
//!    and order book queries, fill events where the program exposes them
//! 2. **Wallet**: signs transactions without exposing key material;
//!    [`KeyringWallet`] is an in-memory ed25519 implementation
//! 3. **MarketSource**: supplies the market name → address table;
//!    [`StaticMarketSource`] serves it from configuration
//! 4. **SimulatedLedger** (feature `test-helpers`): an in-memory CLOB
//!    ledger with fault injection and write-conflict instrumentation

pub mod source;
pub mod traits;
pub mod wallet;

#[cfg(any(test, feature = "test-helpers"))]
pub mod simulated;

pub use source::StaticMarketSource;
pub use traits::{ChainClient, MarketSource, SharedChainClient, SharedMarketSource, SharedWallet, Wallet};
pub use wallet::KeyringWallet;

#[cfg(any(test, feature = "test-helpers"))]
pub use simulated::{LedgerStats, SimulatedLedger};
