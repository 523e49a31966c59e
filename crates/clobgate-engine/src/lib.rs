//! # clobgate-engine
//!
//! **Execution plane**: turns validated operations into on-chain
//! transactions and reads order state back.
//!
//! ## Pipeline
//!
//! ```text
//! operations ─► BatchBuilder ─► per-account chains
//!                                   │  (concurrent across accounts)
//!                                   ▼
//!               AccountSerializer::with_lock (FIFO per owner/market)
//!                                   │
//!                                   ▼
//!               SubmissionEngine::submit ─► CONFIRMED | FAILED | AMBIGUOUS
//!                                   │
//!                                   ▼
//!                             OrderTracker
//! ```
//!
//! Reads go through the [`MarketResolver`] and the [`Reconciler`], which
//! merges remote book snapshots with the tracker's local state.
//! [`SettlementCoordinator`] reuses the [`Dispatcher`] for settle operations.

pub mod account_lock;
pub mod batch_builder;
pub mod dispatcher;
pub mod reconciler;
pub mod resolver;
pub mod retry;
pub mod settlement;
pub mod submission;
pub mod tracker;

pub use account_lock::{AccountSerializer, LockStats};
pub use batch_builder::{BatchBuilder, BatchChain, BatchPlan};
pub use dispatcher::Dispatcher;
pub use reconciler::{Reconciled, Reconciler};
pub use resolver::MarketResolver;
pub use settlement::SettlementCoordinator;
pub use submission::{CancelSignal, SubmissionEngine};
pub use tracker::{OrderTracker, TrackedOrder, TrackedState};
