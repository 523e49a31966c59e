//! Collaborator traits consumed by the engine.
//!
//! Abstracts the chain RPC, the wallet and the market table so the engine
//! can be driven by a simulated ledger in tests.

use std::sync::Arc;

use async_trait::async_trait;
use clobgate_types::{
    Address, Blockhash, ChainResult, FillEvent, Market, MarketConfig, OpenOrdersAccount,
    OrderBookSnapshot, Result, SignatureStatus, SignedTransaction, Transaction, TxSignature,
};

/// Chain RPC capability.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// A blockhash recent enough to build a new transaction on.
    async fn latest_blockhash(&self) -> ChainResult<Blockhash>;

    /// Dry-run a signed transaction. Errors here mean nothing was sent.
    async fn simulate_transaction(&self, tx: &SignedTransaction) -> ChainResult<()>;

    /// Forward a signed transaction. `Ok` only means the node accepted it.
    async fn send_transaction(&self, tx: &SignedTransaction) -> ChainResult<TxSignature>;

    /// What the chain currently knows about `signature`.
    async fn signature_status(&self, signature: &TxSignature) -> ChainResult<SignatureStatus>;

    /// Read the market's on-chain state. `None` if no market lives there.
    async fn market_state(&self, config: &MarketConfig) -> ChainResult<Option<Market>>;

    /// Every resting order on both sides of the book.
    async fn order_book(&self, market: &Market) -> ChainResult<OrderBookSnapshot>;

    /// The owner's open orders account on `market`, if it exists.
    async fn open_orders_account(
        &self,
        owner: &Address,
        market: &Market,
    ) -> ChainResult<Option<OpenOrdersAccount>>;

    /// Recent fills from the event log. `None` when the program does not
    /// expose one.
    async fn fills(&self, market: &Market) -> ChainResult<Option<Vec<FillEvent>>>;
}

/// Signing capability. Key material never leaves the implementation.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Sign `tx` with the key registered for `signer`.
    async fn sign(&self, tx: Transaction, signer: &Address) -> Result<SignedTransaction>;

    /// Whether a key is registered for `signer`.
    fn has_signer(&self, signer: &Address) -> bool;
}

/// Market table capability.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Load the current market name → address table.
    async fn load_markets(&self) -> Result<Vec<MarketConfig>>;
}

pub type SharedChainClient = Arc<dyn ChainClient>;
pub type SharedWallet = Arc<dyn Wallet>;
pub type SharedMarketSource = Arc<dyn MarketSource>;
