//! Order state reconciler.
//!
//! Merges remote order book snapshots with the local working set. The chain
//! answers "what rests now"; the tracker adds what is still in flight and
//! remembers what has left. An order that left the book is classified
//! FILLED only with fill-event evidence covering its whole size, CANCELED
//! when fill data exists without a complete fill or this gateway confirmed
//! the cancel, and FILLED_OR_CANCELED otherwise. A partly filled order
//! that left the book is CANCELED and keeps its filled size.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use clobgate_ledger::SharedChainClient;
use clobgate_types::{
    Address, ClientOrderId, FillEvent, Market, OnChainOrder, OrderBookView, OrderStatus, Result,
    RetryConfig, Ticker, TickerSource,
};
use rust_decimal::Decimal;

use crate::retry::with_remote_retry;
use crate::tracker::{OrderTracker, TrackedState};

/// The owner's orders on one market after reconciliation.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    /// Resting orders plus pending and ambiguous ones.
    pub open: Vec<OnChainOrder>,
    /// Recently departed orders, classified, oldest first.
    pub history: Vec<OnChainOrder>,
}

/// Reads order state from the chain and merges it with local state.
pub struct Reconciler {
    chain: SharedChainClient,
    tracker: Arc<OrderTracker>,
    retry: RetryConfig,
}

impl Reconciler {
    #[must_use]
    pub fn new(chain: SharedChainClient, tracker: Arc<OrderTracker>, retry: RetryConfig) -> Self {
        Self {
            chain,
            tracker,
            retry,
        }
    }

    /// Point-in-time order book view, with fills when the program exposes
    /// them.
    pub async fn snapshot(&self, market: &Market) -> Result<OrderBookView> {
        let book = with_remote_retry(&self.retry, "order_book", || self.chain.order_book(market))
            .await?;
        let fills = with_remote_retry(&self.retry, "fills", || self.chain.fills(market)).await?;
        Ok(OrderBookView::from_snapshot(&market.name, book, fills))
    }

    /// Last fill price, else mid price, else no price.
    pub async fn ticker(&self, market: &Market) -> Result<Ticker> {
        let view = self.snapshot(market).await?;
        let last_fill = view
            .fills
            .as_ref()
            .and_then(|f| f.iter().max_by_key(|e| e.observed_at))
            .map(|e| e.price);
        let (price, source) = match (last_fill, view.mid_price()) {
            (Some(p), _) => (Some(p), TickerSource::LastFill),
            (None, Some(mid)) => (Some(mid), TickerSource::MidPrice),
            (None, None) => (None, TickerSource::None),
        };
        Ok(Ticker {
            market: market.name.clone(),
            price,
            source,
            timestamp: Utc::now(),
        })
    }

    /// The owner's live orders, including pending and ambiguous ones.
    pub async fn open_orders(&self, owner: &Address, market: &Market) -> Result<Vec<OnChainOrder>> {
        Ok(self.reconcile(owner, market).await?.open)
    }

    /// Open orders followed by recently departed ones.
    pub async fn orders(&self, owner: &Address, market: &Market) -> Result<Vec<OnChainOrder>> {
        let Reconciled { mut open, history } = self.reconcile(owner, market).await?;
        open.extend(history);
        Ok(open)
    }

    /// Orders that have left the book, classified.
    pub async fn filled_orders(&self, owner: &Address, market: &Market) -> Result<Vec<OnChainOrder>> {
        Ok(self.reconcile(owner, market).await?.history)
    }

    /// Take a snapshot, update the owner's last-seen set and history window,
    /// and merge in local state.
    pub async fn reconcile(&self, owner: &Address, market: &Market) -> Result<Reconciled> {
        let view = self.snapshot(market).await?;
        let resting: Vec<OnChainOrder> = view
            .orders_of(owner)
            .into_iter()
            .map(|o| o.with_status(OrderStatus::Open))
            .collect();

        let departed = self.tracker.observe_book(owner, &market.name, &resting);
        if !departed.is_empty() {
            let classified: Vec<OnChainOrder> = departed
                .into_iter()
                .map(|o| self.classify(owner, o, view.fills.as_deref()))
                .collect();
            tracing::debug!(
                owner = %owner.short(),
                market = %market.name,
                departed = classified.len(),
                "Orders left the book"
            );
            self.tracker.record_history(owner, &market.name, classified);
        }

        let visible: HashSet<ClientOrderId> =
            resting.iter().filter_map(|o| o.client_id.clone()).collect();
        let mut open = resting;
        for tracked in self.tracker.unresolved(owner, &market.name) {
            if visible.contains(&tracked.client_id) {
                continue;
            }
            let status = match tracked.state {
                TrackedState::Ambiguous => OrderStatus::Ambiguous,
                _ => OrderStatus::Pending,
            };
            open.push(tracked.to_order(status));
        }

        Ok(Reconciled {
            open,
            history: self.tracker.history(owner, &market.name),
        })
    }

    fn classify(
        &self,
        owner: &Address,
        mut order: OnChainOrder,
        fills: Option<&[FillEvent]>,
    ) -> OnChainOrder {
        let filled: Decimal = fills
            .unwrap_or_default()
            .iter()
            .filter(|f| f.matches(&order))
            .map(|f| f.size)
            .sum();
        let cancel_confirmed = order
            .client_id
            .as_ref()
            .is_some_and(|c| self.tracker.is_cancel_confirmed(owner, c));

        if filled > Decimal::ZERO {
            order.filled = filled.min(order.amount);
            order.remaining = order.amount - order.filled;
        }

        order.status = if filled >= order.amount {
            OrderStatus::Filled
        } else if cancel_confirmed || fills.is_some() {
            OrderStatus::Canceled
        } else {
            OrderStatus::FilledOrCanceled
        };
        order
    }
}
