//! System-wide constants for the ClobGate gateway.

/// Default maximum number of operations packed into one transaction.
pub const DEFAULT_MAX_OPS_PER_TX: usize = 12;

/// Default compute budget per transaction (compute units).
pub const DEFAULT_COMPUTE_BUDGET_UNITS: u64 = 1_400_000;

/// Estimated compute units consumed by a single place instruction.
pub const PLACE_COMPUTE_UNITS: u64 = 80_000;

/// Estimated compute units consumed by a single cancel instruction.
pub const CANCEL_COMPUTE_UNITS: u64 = 40_000;

/// Estimated compute units consumed by a single settle instruction.
pub const SETTLE_COMPUTE_UNITS: u64 = 60_000;

/// Default timeout for `send_transaction` in milliseconds.
pub const DEFAULT_SUBMISSION_TIMEOUT_MS: u64 = 5_000;

/// Default time to wait for confirmation after a successful send.
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 30_000;

/// Default interval between signature status polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default bound on waiting for an account lock.
pub const DEFAULT_LOCK_ACQUIRE_TIMEOUT_MS: u64 = 60_000;

/// Default interval between ambiguity re-checks.
pub const DEFAULT_STATUS_RECHECK_INTERVAL_MS: u64 = 2_000;

/// Default attempt ceiling for batches that fail before inclusion.
pub const DEFAULT_MAX_SUBMIT_ATTEMPTS: u32 = 3;

/// Default number of signature re-checks before surfacing AMBIGUOUS.
pub const DEFAULT_MAX_STATUS_RECHECKS: u32 = 5;

/// Default attempt ceiling for remote calls failing with "unavailable".
pub const DEFAULT_REMOTE_MAX_ATTEMPTS: u32 = 4;

/// Default base delay for remote-call backoff.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 200;

/// Default cap on remote-call backoff.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 5_000;

/// Fractional jitter applied to each backoff delay (±).
pub const BACKOFF_JITTER: f64 = 0.2;

/// Orders tracked per gateway before the oldest are evicted.
pub const DEFAULT_TRACKER_CAPACITY: usize = 50_000;

/// Recently observed fills/cancels kept per (owner, market).
pub const DEFAULT_HISTORY_WINDOW: usize = 256;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Gateway name.
pub const GATEWAY_NAME: &str = "ClobGate";
