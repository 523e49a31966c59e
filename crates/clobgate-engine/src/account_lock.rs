//! Per-account FIFO serializer.
//!
//! Two transactions that write the same open orders account must never be
//! in flight together: the chain would reject or reorder one of them. The
//! [`AccountSerializer`] keeps one fair async mutex per (owner, market) and
//! runs each batch's whole submit-and-confirm cycle under it. Waiters are
//! served in arrival order. Different accounts never wait on each other.
//!
//! Scope is one process. Two gateway processes sharing a wallet can still
//! race each other on-chain.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use clobgate_types::{AccountKey, GatewayError, Result};

struct LockEntry {
    mutex: Arc<tokio::sync::Mutex<()>>,
    /// Callers waiting for or holding this entry.
    refs: usize,
    /// Callers currently inside the critical section.
    holders: usize,
}

/// Counters for lock behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockStats {
    pub acquisitions: u64,
    pub timeouts: u64,
    /// Highest number of simultaneous holders seen on any single key.
    pub max_concurrent_holders: usize,
    /// Keys with at least one waiter or holder right now.
    pub live_keys: usize,
}

/// Keyed FIFO mutual exclusion for open orders accounts.
pub struct AccountSerializer {
    timeout: Duration,
    table: Mutex<HashMap<AccountKey, LockEntry>>,
    acquisitions: AtomicU64,
    timeouts: AtomicU64,
    max_holders: AtomicUsize,
}

impl AccountSerializer {
    /// Create a serializer whose acquisitions give up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            table: Mutex::new(HashMap::new()),
            acquisitions: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            max_holders: AtomicUsize::new(0),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<AccountKey, LockEntry>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `fut` with exclusive access to `key`.
    ///
    /// # Errors
    /// Returns [`GatewayError::AccountLockTimeout`] if the lock is not
    /// acquired within the configured bound; `fut` is then never polled.
    pub async fn with_lock<F, T>(&self, key: &AccountKey, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let mut ticket = self.enter(key);
        let guard = match tokio::time::timeout(self.timeout, ticket.mutex.clone().lock_owned())
            .await
        {
            Ok(guard) => guard,
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                let waited_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(account = %key, waited_ms, "Account lock timeout");
                return Err(GatewayError::AccountLockTimeout {
                    key: key.clone(),
                    waited_ms,
                });
            }
        };

        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        ticket.hold();
        let out = fut.await;
        drop(guard);
        Ok(out)
    }

    /// Register interest in `key`, creating its entry if needed.
    fn enter(&self, key: &AccountKey) -> Ticket<'_> {
        let mut table = self.table();
        let entry = table.entry(key.clone()).or_insert_with(|| LockEntry {
            mutex: Arc::new(tokio::sync::Mutex::new(())),
            refs: 0,
            holders: 0,
        });
        entry.refs += 1;
        Ticket {
            serializer: self,
            key: key.clone(),
            mutex: entry.mutex.clone(),
            holding: false,
        }
    }

    #[must_use]
    pub fn stats(&self) -> LockStats {
        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            max_concurrent_holders: self.max_holders.load(Ordering::Relaxed),
            live_keys: self.table().len(),
        }
    }
}

/// Tracks one caller's stake in a lock entry; dropping it releases the
/// stake even when the caller's future is cancelled mid-wait.
struct Ticket<'a> {
    serializer: &'a AccountSerializer,
    key: AccountKey,
    mutex: Arc<tokio::sync::Mutex<()>>,
    holding: bool,
}

impl Ticket<'_> {
    fn hold(&mut self) {
        let mut table = self.serializer.table();
        if let Some(entry) = table.get_mut(&self.key) {
            entry.holders += 1;
            self.serializer
                .max_holders
                .fetch_max(entry.holders, Ordering::Relaxed);
        }
        self.holding = true;
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        let mut table = self.serializer.table();
        let idle = match table.get_mut(&self.key) {
            Some(entry) => {
                if self.holding {
                    entry.holders = entry.holders.saturating_sub(1);
                }
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            None => false,
        };
        // Prune idle entries so the table only holds active accounts.
        if idle {
            table.remove(&self.key);
        }
    }
}
