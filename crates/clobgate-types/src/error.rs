//! Error types for the ClobGate gateway.
//!
//! All errors use the `CG_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Request errors
//! - 2xx: Market errors
//! - 3xx: Account / batching errors
//! - 4xx: Submission errors
//! - 5xx: Remote ledger errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{AccountKey, BatchId, ClientOrderId, TxSignature};

/// Central error enum for all ClobGate operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    // =================================================================
    // Request Errors (1xx)
    // =================================================================
    /// The request body mixes or omits singular/plural fields incorrectly,
    /// or is missing a field the operation needs.
    #[error("CG_ERR_100: Invalid request shape: {reason}")]
    InvalidRequestShape { reason: String },

    /// A live order with this client id already exists for the owner.
    #[error("CG_ERR_101: Duplicate client order id: {0}")]
    DuplicateClientId(ClientOrderId),

    /// The order does not respect the market's tick/lot constraints.
    #[error("CG_ERR_102: Invalid order {client_id}: {reason}")]
    InvalidOrder {
        client_id: ClientOrderId,
        reason: String,
    },

    // =================================================================
    // Market Errors (2xx)
    // =================================================================
    /// The market name is not in the configured table, even after a reload.
    #[error("CG_ERR_200: Unknown market: {0}")]
    UnknownMarket(String),

    /// The market is configured but its on-chain state could not be read.
    #[error("CG_ERR_201: Market state unavailable for {market}")]
    MarketStateUnavailable { market: String },

    // =================================================================
    // Account / Batching Errors (3xx)
    // =================================================================
    /// The per-account lock was not acquired within the configured bound.
    #[error("CG_ERR_300: Account lock timeout on {key} after {waited_ms}ms")]
    AccountLockTimeout { key: AccountKey, waited_ms: u64 },

    /// A single operation needs more compute than a whole transaction allows.
    #[error("CG_ERR_301: Operation needs {compute_units} CU, budget is {budget} CU")]
    OperationTooLarge { compute_units: u64, budget: u64 },

    /// Every tracked order is still unresolved; none can be evicted.
    #[error("CG_ERR_302: Order tracker full: {capacity} unresolved orders")]
    TrackerFull { capacity: usize },

    // =================================================================
    // Submission Errors (4xx)
    // =================================================================
    /// The batch was rejected before inclusion on every allowed attempt.
    #[error("CG_ERR_400: Submission exhausted for {batch} after {attempts} attempts: {last_error}")]
    SubmissionExhausted {
        batch: BatchId,
        attempts: u32,
        last_error: String,
    },

    /// The transaction was sent but its fate could not be observed.
    #[error("CG_ERR_401: Outcome unknown for transaction {signature}")]
    Ambiguous { signature: TxSignature },

    /// The program rejected an instruction deterministically (simulation).
    #[error("CG_ERR_402: Program rejected instruction {index}: {reason}")]
    ProgramRejected { index: usize, reason: String },

    /// The transaction was included but failed on-chain.
    #[error("CG_ERR_403: Transaction {signature} failed on-chain: {reason}")]
    TransactionFailed {
        signature: TxSignature,
        reason: String,
    },

    /// The caller canceled before the batch was submitted.
    #[error("CG_ERR_404: Canceled before submission")]
    Canceled,

    /// The wallet refused or failed to sign.
    #[error("CG_ERR_405: Wallet signing failed: {reason}")]
    WalletSigning { reason: String },

    // =================================================================
    // Remote Errors (5xx)
    // =================================================================
    /// The chain RPC stayed unreachable through every backoff attempt.
    #[error("CG_ERR_500: Remote ledger unavailable: {reason}")]
    RemoteUnavailable { reason: String },

    /// The chain returned an error this gateway does not retry.
    #[error("CG_ERR_501: Remote ledger error: {0}")]
    Chain(#[source] ChainError),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CG_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CG_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("CG_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("CG_ERR_903: I/O error: {0}")]
    Io(String),
}

impl GatewayError {
    /// Shorthand for [`GatewayError::InvalidRequestShape`].
    pub fn shape(reason: impl Into<String>) -> Self {
        Self::InvalidRequestShape {
            reason: reason.into(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, GatewayError>;

// A transport failure that survived backoff is "unavailable"; anything else
// is reported as the chain's own error.
impl From<ChainError> for GatewayError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Unavailable(reason) => Self::RemoteUnavailable { reason },
            other => Self::Chain(other),
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// ChainError: what the remote ledger collaborator reports
// ---------------------------------------------------------------------------

/// Errors surfaced by a chain client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The RPC endpoint could not be reached or answered with a transport error.
    #[error("rpc unavailable: {0}")]
    Unavailable(String),

    /// The referenced blockhash is too old; nothing was applied.
    #[error("blockhash expired")]
    BlockhashExpired,

    /// Simulation failed for a transient reason (e.g. account in use).
    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    /// An instruction failed deterministically in the program.
    #[error("instruction {index} failed: {reason}")]
    InstructionError { index: usize, reason: String },

    /// The node refused the transaction before forwarding it.
    #[error("send rejected: {0}")]
    SendRejected(String),
}

impl ChainError {
    /// Whether a failed send is known not to have reached the chain, so the
    /// same operations may go out again with a fresh blockhash.
    ///
    /// A transport error proves nothing about delivery and is not
    /// retryable here; the transaction must be looked up by signature.
    #[must_use]
    pub fn is_retryable_before_inclusion(&self) -> bool {
        match self {
            Self::BlockhashExpired | Self::SimulationFailed(_) | Self::SendRejected(_) => true,
            Self::Unavailable(_) | Self::InstructionError { .. } => false,
        }
    }

    /// Whether the error only says the endpoint is unreachable.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result alias for chain collaborator calls.
pub type ChainResult<T> = std::result::Result<T, ChainError>;
