//! The caller-facing facade.
//!
//! [`ClobGateway`] owns one instance of every engine component and exposes
//! the ten order-management operations. Reads go normalizer → resolver →
//! reconciler. Mutations go normalizer → resolver → per-entity checks →
//! dispatcher, and always answer with a [`BatchResponse`] carrying one
//! report per entity in request order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use clobgate_engine::{
    AccountSerializer, BatchBuilder, CancelSignal, Dispatcher, LockStats, MarketResolver,
    OrderTracker, Reconciler, SettlementCoordinator, SubmissionEngine,
};
use clobgate_ledger::{SharedChainClient, SharedMarketSource, SharedWallet, StaticMarketSource};
use clobgate_types::{
    Address, BatchEntry, BatchResponse, CancelRequest, ClientOrderId, EntityOutcome,
    GatewayConfig, GatewayError, Market, OnChainOrder, Operation, OperationKind, OperationReport,
    OrderBookView, OrderRequest, OrderStatus, Result, Ticker,
};
use futures::future::join_all;

use crate::normalizer;
use crate::request::{
    CancelOrdersRequest, CreateOrdersRequest, MarketsRequest, OrdersQuery, OwnerMarketsRequest,
};

type Resolved = HashMap<String, std::result::Result<Market, String>>;

#[derive(Debug, Clone, Copy)]
enum OrderView {
    Open,
    All,
    Filled,
}

/// Order-management gateway over one remote CLOB program.
pub struct ClobGateway {
    config: GatewayConfig,
    wallet: SharedWallet,
    resolver: MarketResolver,
    tracker: Arc<OrderTracker>,
    dispatcher: Arc<Dispatcher>,
    reconciler: Reconciler,
    settlement: SettlementCoordinator,
}

impl ClobGateway {
    /// Wire every component from `config`.
    ///
    /// # Errors
    /// Returns [`GatewayError::Configuration`] if `config` does not validate.
    pub fn new(
        config: GatewayConfig,
        chain: SharedChainClient,
        wallet: SharedWallet,
        source: SharedMarketSource,
    ) -> Result<Self> {
        config.validate()?;

        let tracker = Arc::new(OrderTracker::new(&config.tracker));
        let serializer = Arc::new(AccountSerializer::new(config.timeouts.lock_acquire()));
        let engine = Arc::new(SubmissionEngine::new(
            chain.clone(),
            wallet.clone(),
            config.timeouts.clone(),
            config.retry.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            BatchBuilder::new(config.protocol.clone()),
            serializer,
            engine,
            tracker.clone(),
        ));

        tracing::info!(
            markets = config.markets.len(),
            max_ops_per_tx = config.protocol.max_ops_per_tx,
            compute_budget = config.protocol.compute_budget_units,
            "Gateway initialised"
        );

        Ok(Self {
            resolver: MarketResolver::new(chain.clone(), source, config.retry.clone()),
            reconciler: Reconciler::new(chain.clone(), tracker.clone(), config.retry.clone()),
            settlement: SettlementCoordinator::new(chain, dispatcher.clone(), config.retry.clone()),
            config,
            wallet,
            tracker,
            dispatcher,
        })
    }

    /// Serve the market table straight from `config.markets`.
    pub fn with_static_markets(
        config: GatewayConfig,
        chain: SharedChainClient,
        wallet: SharedWallet,
    ) -> Result<Self> {
        let source = Arc::new(StaticMarketSource::new(config.markets.clone()));
        Self::new(config, chain, wallet, source)
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &MarketResolver {
        &self.resolver
    }

    #[must_use]
    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    #[must_use]
    pub fn lock_stats(&self) -> LockStats {
        self.dispatcher.serializer().stats()
    }

    /// Forget cached markets after a reconfiguration.
    pub fn reload_markets(&self) {
        self.resolver.invalidate();
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    pub async fn get_markets(&self, req: &MarketsRequest) -> Result<Vec<Market>> {
        let selection = normalizer::markets(req)?;
        self.resolver.resolve_all(&selection).await
    }

    pub async fn get_tickers(&self, req: &MarketsRequest) -> Result<Vec<Ticker>> {
        let markets = self.get_markets(req).await?;
        join_all(markets.iter().map(|m| self.reconciler.ticker(m)))
            .await
            .into_iter()
            .collect()
    }

    pub async fn get_order_books(&self, req: &MarketsRequest) -> Result<Vec<OrderBookView>> {
        let markets = self.get_markets(req).await?;
        join_all(markets.iter().map(|m| self.reconciler.snapshot(m)))
            .await
            .into_iter()
            .collect()
    }

    /// Open orders followed by recently filled or canceled ones.
    pub async fn get_orders(&self, req: &OrdersQuery) -> Result<Vec<OnChainOrder>> {
        self.read_orders(req, OrderView::All).await
    }

    /// Resting, pending and ambiguous orders.
    pub async fn get_open_orders(&self, req: &OrdersQuery) -> Result<Vec<OnChainOrder>> {
        self.read_orders(req, OrderView::Open).await
    }

    /// Orders that left the book, classified FILLED, CANCELED or
    /// FILLED_OR_CANCELED.
    pub async fn get_filled_orders(&self, req: &OrdersQuery) -> Result<Vec<OnChainOrder>> {
        self.read_orders(req, OrderView::Filled).await
    }

    async fn read_orders(&self, req: &OrdersQuery, view: OrderView) -> Result<Vec<OnChainOrder>> {
        let scope = normalizer::orders_scope(req)?;
        let markets = self.resolver.resolve_all(&scope.markets).await?;
        let per_market = join_all(
            markets
                .iter()
                .map(|m| self.read_market(&scope.owner, m, view)),
        )
        .await;

        let mut orders = Vec::new();
        for result in per_market {
            orders.extend(result?);
        }
        if let Some(ids) = scope.client_ids.items() {
            orders.retain(|o| o.client_id.as_ref().is_some_and(|c| ids.contains(c)));
        }
        Ok(orders)
    }

    async fn read_market(
        &self,
        owner: &Address,
        market: &Market,
        view: OrderView,
    ) -> Result<Vec<OnChainOrder>> {
        match view {
            OrderView::Open => self.reconciler.open_orders(owner, market).await,
            OrderView::All => self.reconciler.orders(owner, market).await,
            OrderView::Filled => self.reconciler.filled_orders(owner, market).await,
        }
    }

    // -----------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------

    /// Place orders. Unknown markets, misaligned prices or sizes, deprecated
    /// markets and client ids still live for the owner are rejected per
    /// order; the rest are batched and submitted.
    pub async fn create_orders(
        &self,
        req: &CreateOrdersRequest,
        cancel: &CancelSignal,
    ) -> Result<BatchResponse> {
        let (owner, orders) = normalizer::create_orders(req)?;
        self.ensure_signer(&owner)?;
        let markets = self
            .resolve_names(orders.iter().map(|o| o.market_name.as_str()))
            .await;

        let mut reports = Vec::new();
        let mut entries = Vec::new();
        for (position, order) in orders.into_iter().enumerate() {
            match self.admit_order(&markets, &order) {
                Ok(market) => entries.push(BatchEntry {
                    position,
                    key: market.account_key(&owner),
                    operation: Operation::Place(order),
                }),
                Err(reason) => reports.push(OperationReport {
                    position,
                    kind: OperationKind::Place,
                    entity: order.client_id.to_string(),
                    market: order.market_name.clone(),
                    outcome: EntityOutcome::rejected(reason),
                }),
            }
        }

        tracing::info!(
            owner = %owner.short(),
            orders = entries.len() + reports.len(),
            rejected_locally = reports.len(),
            "Creating orders"
        );
        reports.extend(self.dispatcher.dispatch(entries, cancel).await);
        Ok(BatchResponse::from_reports(reports))
    }

    fn admit_order(
        &self,
        markets: &Resolved,
        order: &OrderRequest,
    ) -> std::result::Result<Market, String> {
        let market = match markets.get(&order.market_name) {
            Some(Ok(market)) => market.clone(),
            Some(Err(reason)) => return Err(reason.clone()),
            None => return Err(GatewayError::UnknownMarket(order.market_name.clone()).to_string()),
        };
        let invalid = |reason: &str| {
            GatewayError::InvalidOrder {
                client_id: order.client_id.clone(),
                reason: reason.to_string(),
            }
            .to_string()
        };
        if market.deprecated {
            return Err(invalid("market is deprecated"));
        }
        if !market.is_price_aligned(order.price) {
            return Err(invalid(&format!(
                "price {} is not a multiple of tick size {}",
                order.price, market.tick_size
            )));
        }
        if !market.is_size_aligned(order.amount) {
            return Err(invalid(&format!(
                "amount {} is not a multiple of lot size {}",
                order.amount, market.lot_size
            )));
        }
        self.tracker.reserve(order).map_err(|e| e.to_string())?;
        Ok(market)
    }

    /// Cancel specific orders. A missing exchange id is filled from the
    /// tracker when this gateway placed the order.
    pub async fn cancel_orders(
        &self,
        req: &CancelOrdersRequest,
        cancel: &CancelSignal,
    ) -> Result<BatchResponse> {
        let (owner, cancels) = normalizer::cancel_orders(req)?;
        self.ensure_signer(&owner)?;
        let markets = self
            .resolve_names(cancels.iter().map(|c| c.market_name.as_str()))
            .await;

        let mut reports = Vec::new();
        let mut entries = Vec::new();
        for (position, mut request) in cancels.into_iter().enumerate() {
            match markets.get(&request.market_name) {
                Some(Ok(market)) => {
                    if request.exchange_id.is_none() {
                        request.exchange_id = self
                            .tracker
                            .get(&owner, &request.client_id)
                            .and_then(|t| t.exchange_id);
                    }
                    entries.push(BatchEntry {
                        position,
                        key: market.account_key(&owner),
                        operation: Operation::Cancel(request),
                    });
                }
                other => {
                    let reason = match other {
                        Some(Err(reason)) => reason.clone(),
                        _ => GatewayError::UnknownMarket(request.market_name.clone()).to_string(),
                    };
                    reports.push(OperationReport {
                        position,
                        kind: OperationKind::Cancel,
                        entity: request.client_id.to_string(),
                        market: request.market_name.clone(),
                        outcome: EntityOutcome::rejected(reason),
                    });
                }
            }
        }

        tracing::info!(
            owner = %owner.short(),
            cancels = entries.len() + reports.len(),
            "Canceling orders"
        );
        reports.extend(self.dispatcher.dispatch(entries, cancel).await);
        Ok(BatchResponse::from_reports(reports))
    }

    /// Cancel every resting order of the owner on the selected markets.
    /// Nothing resting is an empty success.
    pub async fn cancel_open_orders(
        &self,
        req: &OwnerMarketsRequest,
        cancel: &CancelSignal,
    ) -> Result<BatchResponse> {
        let (owner, selection) = normalizer::owner_markets(req)?;
        let markets = self.resolver.resolve_all(&selection).await?;
        let open = join_all(
            markets
                .iter()
                .map(|m| self.reconciler.open_orders(&owner, m)),
        )
        .await;

        let mut entries = Vec::new();
        for (market, orders) in markets.iter().zip(open) {
            for order in orders? {
                if order.status != OrderStatus::Open {
                    continue;
                }
                let client_id = order
                    .client_id
                    .clone()
                    .unwrap_or_else(|| ClientOrderId::new(order.exchange_id.to_string()));
                entries.push(BatchEntry {
                    position: entries.len(),
                    key: market.account_key(&owner),
                    operation: Operation::Cancel(CancelRequest {
                        client_id,
                        market_name: market.name.clone(),
                        owner: owner.clone(),
                        exchange_id: Some(order.exchange_id),
                    }),
                });
            }
        }

        if entries.is_empty() {
            tracing::debug!(owner = %owner.short(), "No open orders to cancel");
            return Ok(BatchResponse::empty());
        }
        self.ensure_signer(&owner)?;
        tracing::info!(owner = %owner.short(), cancels = entries.len(), "Canceling open orders");
        let reports = self.dispatcher.dispatch(entries, cancel).await;
        Ok(BatchResponse::from_reports(reports))
    }

    /// Settle free balances on the selected markets.
    pub async fn settle_funds(
        &self,
        req: &OwnerMarketsRequest,
        cancel: &CancelSignal,
    ) -> Result<BatchResponse> {
        let (owner, selection) = normalizer::owner_markets(req)?;
        self.ensure_signer(&owner)?;
        let markets = self.resolver.resolve_all(&selection).await?;
        let reports = self.settlement.settle(&owner, &markets, cancel).await;
        Ok(BatchResponse::from_reports(reports))
    }

    fn ensure_signer(&self, owner: &Address) -> Result<()> {
        if self.wallet.has_signer(owner) {
            Ok(())
        } else {
            Err(GatewayError::WalletSigning {
                reason: format!("no signing key for owner {owner}"),
            })
        }
    }

    /// Resolve each distinct name once, keeping failures per name.
    async fn resolve_names<'a>(&self, names: impl Iterator<Item = &'a str>) -> Resolved {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = names
            .filter(|n| seen.insert(*n))
            .map(str::to_string)
            .collect();
        let results = self.resolver.resolve_each(&distinct).await;
        distinct
            .into_iter()
            .zip(results)
            .map(|(name, result)| (name, result.map_err(|e| e.to_string())))
            .collect()
    }
}
