//! Market resolver: market name → on-chain market descriptor.
//!
//! Descriptors are cached process-wide once resolved. A cache miss fetches
//! the market's on-chain state under a per-name async mutex, so concurrent
//! resolutions of the same name share one fetch: the first caller fetches,
//! the rest find the cache filled when they get the mutex. If that fetch
//! fails, each waiter tries its own fetch in turn. A name's mutex lives only
//! while someone is resolving it.
//!
//! A name missing from the configured table triggers one table reload
//! before the resolver gives up with [`GatewayError::UnknownMarket`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use clobgate_ledger::{SharedChainClient, SharedMarketSource};
use clobgate_types::{GatewayError, Market, MarketConfig, Result, RetryConfig, Selection};
use futures::future::join_all;

use crate::retry::with_remote_retry;

/// Cached name → [`Market`] resolution.
pub struct MarketResolver {
    chain: SharedChainClient,
    source: SharedMarketSource,
    retry: RetryConfig,
    /// Configured table; `None` until loaded or after `invalidate`.
    table: RwLock<Option<Vec<MarketConfig>>>,
    cache: RwLock<HashMap<String, Market>>,
    inflight: Mutex<HashMap<String, Flight>>,
    fetches: AtomicUsize,
}

struct Flight {
    gate: Arc<tokio::sync::Mutex<()>>,
    /// Resolutions waiting for or holding `gate`.
    refs: usize,
}

impl MarketResolver {
    #[must_use]
    pub fn new(chain: SharedChainClient, source: SharedMarketSource, retry: RetryConfig) -> Self {
        Self {
            chain,
            source,
            retry,
            table: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Resolve one market by name.
    pub async fn resolve(&self, name: &str) -> Result<Market> {
        if let Some(market) = self.cached(name) {
            return Ok(market);
        }

        let boarding = self.board(name);
        let _flight = boarding.gate.lock().await;
        if let Some(market) = self.cached(name) {
            return Ok(market);
        }

        let config = self.config_for(name).await?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let state = with_remote_retry(&self.retry, "market_state", || {
            self.chain.market_state(&config)
        })
        .await
        .map_err(|err| {
            tracing::warn!(market = name, error = %err, "Market state fetch failed");
            GatewayError::MarketStateUnavailable {
                market: name.to_string(),
            }
        })?;
        let market = state.ok_or_else(|| GatewayError::MarketStateUnavailable {
            market: name.to_string(),
        })?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), market.clone());
        tracing::info!(
            market = name,
            address = %market.address,
            deprecated = market.deprecated,
            "Market resolved"
        );
        Ok(market)
    }

    /// Resolve a selection concurrently. `All` means every non-deprecated
    /// configured market. Results keep selection order.
    pub async fn resolve_all(&self, selection: &Selection<String>) -> Result<Vec<Market>> {
        let names = match selection {
            Selection::All => self.active_names().await?,
            Selection::Only(names) => names.clone(),
        };
        join_all(names.iter().map(|n| self.resolve(n)))
            .await
            .into_iter()
            .collect()
    }

    /// Resolve each name independently, keeping failures per name.
    pub async fn resolve_each(&self, names: &[String]) -> Vec<Result<Market>> {
        join_all(names.iter().map(|n| self.resolve(n))).await
    }

    /// Drop every cached descriptor and the configured table; the next
    /// resolution reloads both.
    pub fn invalidate(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("Market cache invalidated");
    }

    /// Every configured market name, deprecated ones included.
    pub async fn configured_names(&self) -> Result<Vec<String>> {
        Ok(self
            .table_snapshot()
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    /// Configured names excluding deprecated markets.
    pub async fn active_names(&self) -> Result<Vec<String>> {
        Ok(self
            .table_snapshot()
            .await?
            .into_iter()
            .filter(|m| !m.deprecated)
            .map(|m| m.name)
            .collect())
    }

    /// Remote metadata fetches performed so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn cached(&self, name: &str) -> Option<Market> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Names with a resolution in progress.
    #[must_use]
    pub fn inflight_count(&self) -> usize {
        self.inflight().len()
    }

    fn inflight(&self) -> MutexGuard<'_, HashMap<String, Flight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn board(&self, name: &str) -> Boarding<'_> {
        let mut inflight = self.inflight();
        let flight = inflight.entry(name.to_string()).or_insert_with(|| Flight {
            gate: Arc::new(tokio::sync::Mutex::new(())),
            refs: 0,
        });
        flight.refs += 1;
        Boarding {
            resolver: self,
            name: name.to_string(),
            gate: flight.gate.clone(),
        }
    }

    async fn table_snapshot(&self) -> Result<Vec<MarketConfig>> {
        let loaded = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match loaded {
            Some(table) => Ok(table),
            None => self.reload_table().await,
        }
    }

    async fn reload_table(&self) -> Result<Vec<MarketConfig>> {
        let table = self.source.load_markets().await?;
        tracing::info!(markets = table.len(), "Market table loaded");
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Some(table.clone());
        Ok(table)
    }

    async fn config_for(&self, name: &str) -> Result<MarketConfig> {
        let find = |table: Vec<MarketConfig>| table.into_iter().find(|m| m.name == name);
        let first_load = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        if let Some(config) = find(self.table_snapshot().await?) {
            return Ok(config);
        }
        if !first_load {
            if let Some(config) = find(self.reload_table().await?) {
                return Ok(config);
            }
        }
        Err(GatewayError::UnknownMarket(name.to_string()))
    }
}

/// One resolution's stake in a name's gate; the last one out removes it.
struct Boarding<'a> {
    resolver: &'a MarketResolver,
    name: String,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for Boarding<'_> {
    fn drop(&mut self) {
        let mut inflight = self.resolver.inflight();
        let idle = inflight.get_mut(&self.name).is_some_and(|flight| {
            flight.refs = flight.refs.saturating_sub(1);
            flight.refs == 0
        });
        if idle {
            inflight.remove(&self.name);
        }
    }
}
