//! Market table served from configuration.

use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use clobgate_types::{GatewayError, MarketConfig, Result};

use crate::traits::MarketSource;

/// A market table held in memory; `replace` models a config reload.
#[derive(Default)]
pub struct StaticMarketSource {
    markets: RwLock<Vec<MarketConfig>>,
    loads: AtomicUsize,
}

impl StaticMarketSource {
    #[must_use]
    pub fn new(markets: Vec<MarketConfig>) -> Self {
        Self {
            markets: RwLock::new(markets),
            loads: AtomicUsize::new(0),
        }
    }

    /// Swap the whole table.
    pub fn replace(&self, markets: Vec<MarketConfig>) -> Result<()> {
        let mut guard = self
            .markets
            .write()
            .map_err(|_| GatewayError::Internal("market table lock poisoned".into()))?;
        *guard = markets;
        Ok(())
    }

    /// How many times the table has been loaded.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MarketSource for StaticMarketSource {
    async fn load_markets(&self) -> Result<Vec<MarketConfig>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let guard = self
            .markets
            .read()
            .map_err(|_| GatewayError::Internal("market table lock poisoned".into()))?;
        Ok(guard.clone())
    }
}
