//! Local working set of orders this gateway has submitted.
//!
//! The chain is the source of truth for resting orders, but it says nothing
//! about orders still in flight, orders whose placing transaction is
//! ambiguous, or how an order left the book. The [`OrderTracker`] keeps
//! just enough local state to answer those questions:
//!
//! - tracked orders keyed by (owner, client id), bounded with
//!   oldest-first eviction of settled entries; pending and ambiguous
//!   orders are never evicted
//! - client ids whose cancel this gateway saw confirmed
//! - the last set of resting orders seen per (owner, market)
//! - a bounded window of recently departed orders per (owner, market)
//!
//! A client id may only be reused by the same owner once its previous
//! order is no longer live.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use clobgate_types::{
    Address, ClientOrderId, ExchangeOrderId, GatewayError, OnChainOrder, OrderRequest,
    OrderSide, OrderStatus, Result, TrackerConfig, TxSignature,
};
use rust_decimal::Decimal;

type OrderKey = (Address, ClientOrderId);
type BookKey = (Address, String);

/// Where a tracked order stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedState {
    /// Reserved; its transaction has not resolved yet.
    Pending,
    /// Confirmed placed.
    Live,
    /// Its placing transaction has an unknown outcome.
    Ambiguous,
    /// This gateway saw its cancel confirmed.
    CancelConfirmed,
    /// Left the book and has been classified.
    Closed,
}

/// One order known to this gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedOrder {
    pub owner: Address,
    pub market: String,
    pub client_id: ClientOrderId,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub state: TrackedState,
    pub exchange_id: Option<ExchangeOrderId>,
    pub signature: Option<TxSignature>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedOrder {
    fn from_request(req: &OrderRequest) -> Self {
        Self {
            owner: req.owner.clone(),
            market: req.market_name.clone(),
            client_id: req.client_id.clone(),
            side: req.side,
            price: req.price,
            amount: req.amount,
            state: TrackedState::Pending,
            exchange_id: None,
            signature: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether the client id is still taken.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            TrackedState::Pending | TrackedState::Live | TrackedState::Ambiguous
        )
    }

    /// Render as an order record with `status`. Orders the chain has not
    /// acknowledged yet carry exchange id 0.
    #[must_use]
    pub fn to_order(&self, status: OrderStatus) -> OnChainOrder {
        OnChainOrder {
            market: self.market.clone(),
            owner: self.owner.clone(),
            exchange_id: self.exchange_id.unwrap_or(ExchangeOrderId(0)),
            client_id: Some(self.client_id.clone()),
            side: self.side,
            price: self.price,
            amount: self.amount,
            remaining: self.amount,
            filled: Decimal::ZERO,
            status,
        }
    }

    fn touch(&mut self, state: TrackedState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

struct TrackerInner {
    orders: HashMap<OrderKey, TrackedOrder>,
    /// Insertion order for eviction (front = oldest).
    arrival: VecDeque<OrderKey>,
    capacity: usize,
    cancels: HashSet<OrderKey>,
    cancel_arrival: VecDeque<OrderKey>,
    last_seen: HashMap<BookKey, Vec<OnChainOrder>>,
    history: HashMap<BookKey, VecDeque<OnChainOrder>>,
    history_window: usize,
}

impl TrackerInner {
    /// Oldest settled entry, else oldest live one. Pending and ambiguous
    /// orders only leave through confirmation or reconciliation.
    fn eviction_candidate(&self) -> Option<OrderKey> {
        let oldest_in = |states: &[TrackedState]| {
            self.arrival
                .iter()
                .find(|k| self.orders.get(*k).is_some_and(|o| states.contains(&o.state)))
                .cloned()
        };
        oldest_in(&[TrackedState::Closed, TrackedState::CancelConfirmed])
            .or_else(|| oldest_in(&[TrackedState::Live]))
    }
}

/// Bounded, thread-safe order working set.
pub struct OrderTracker {
    inner: Mutex<TrackerInner>,
}

impl OrderTracker {
    #[must_use]
    pub fn new(config: &TrackerConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            inner: Mutex::new(TrackerInner {
                orders: HashMap::new(),
                arrival: VecDeque::new(),
                capacity,
                cancels: HashSet::new(),
                cancel_arrival: VecDeque::new(),
                last_seen: HashMap::new(),
                history: HashMap::new(),
                history_window: config.history_window.max(1),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `req.client_id` for its owner as a pending order.
    ///
    /// # Errors
    /// Returns [`GatewayError::DuplicateClientId`] if the owner already has a
    /// live order with this client id, and [`GatewayError::TrackerFull`] if
    /// the tracker is at capacity with nothing it may evict.
    pub fn reserve(&self, req: &OrderRequest) -> Result<()> {
        let mut inner = self.inner();
        let key = (req.owner.clone(), req.client_id.clone());
        if let Some(existing) = inner.orders.get(&key) {
            if existing.is_live() {
                return Err(GatewayError::DuplicateClientId(req.client_id.clone()));
            }
            inner.orders.remove(&key);
            inner.arrival.retain(|k| k != &key);
        }

        while inner.orders.len() >= inner.capacity {
            let Some(victim) = inner.eviction_candidate() else {
                tracing::warn!(
                    capacity = inner.capacity,
                    client_id = %req.client_id,
                    "Order tracker full of unresolved orders"
                );
                return Err(GatewayError::TrackerFull {
                    capacity: inner.capacity,
                });
            };
            inner.arrival.retain(|k| k != &victim);
            inner.orders.remove(&victim);
        }

        inner.arrival.push_back(key.clone());
        inner.orders.insert(key, TrackedOrder::from_request(req));
        Ok(())
    }

    /// Drop a reservation whose place was definitively rejected.
    pub fn release(&self, owner: &Address, client_id: &ClientOrderId) {
        let mut inner = self.inner();
        let key = (owner.clone(), client_id.clone());
        if inner
            .orders
            .get(&key)
            .is_some_and(|o| o.state == TrackedState::Pending)
        {
            inner.orders.remove(&key);
            inner.arrival.retain(|k| k != &key);
        }
    }

    /// Record a confirmed place.
    pub fn mark_live(
        &self,
        owner: &Address,
        client_id: &ClientOrderId,
        exchange_id: Option<ExchangeOrderId>,
        signature: &TxSignature,
    ) {
        let mut inner = self.inner();
        if let Some(order) = inner.orders.get_mut(&(owner.clone(), client_id.clone())) {
            order.exchange_id = exchange_id;
            order.signature = Some(signature.clone());
            order.touch(TrackedState::Live);
        }
    }

    /// Record a place whose transaction outcome is unknown.
    pub fn mark_ambiguous(
        &self,
        owner: &Address,
        client_id: &ClientOrderId,
        signature: Option<&TxSignature>,
    ) {
        let mut inner = self.inner();
        if let Some(order) = inner.orders.get_mut(&(owner.clone(), client_id.clone())) {
            order.signature = signature.cloned();
            order.touch(TrackedState::Ambiguous);
        }
    }

    /// Record a confirmed cancel.
    pub fn mark_cancel_confirmed(&self, owner: &Address, client_id: &ClientOrderId) {
        let mut inner = self.inner();
        let key = (owner.clone(), client_id.clone());
        if let Some(order) = inner.orders.get_mut(&key) {
            order.touch(TrackedState::CancelConfirmed);
        }
        if inner.cancels.insert(key.clone()) {
            inner.cancel_arrival.push_back(key);
            while inner.cancel_arrival.len() > inner.capacity {
                if let Some(oldest) = inner.cancel_arrival.pop_front() {
                    inner.cancels.remove(&oldest);
                }
            }
        }
    }

    #[must_use]
    pub fn is_cancel_confirmed(&self, owner: &Address, client_id: &ClientOrderId) -> bool {
        self.inner()
            .cancels
            .contains(&(owner.clone(), client_id.clone()))
    }

    #[must_use]
    pub fn is_live(&self, owner: &Address, client_id: &ClientOrderId) -> bool {
        self.inner()
            .orders
            .get(&(owner.clone(), client_id.clone()))
            .is_some_and(TrackedOrder::is_live)
    }

    #[must_use]
    pub fn get(&self, owner: &Address, client_id: &ClientOrderId) -> Option<TrackedOrder> {
        self.inner()
            .orders
            .get(&(owner.clone(), client_id.clone()))
            .cloned()
    }

    /// Pending and ambiguous orders for (owner, market), oldest first.
    #[must_use]
    pub fn unresolved(&self, owner: &Address, market: &str) -> Vec<TrackedOrder> {
        let inner = self.inner();
        inner
            .arrival
            .iter()
            .filter_map(|k| inner.orders.get(k))
            .filter(|o| {
                &o.owner == owner
                    && o.market == market
                    && matches!(o.state, TrackedState::Pending | TrackedState::Ambiguous)
            })
            .cloned()
            .collect()
    }

    /// Compare the owner's resting orders against what was known before and
    /// return the orders that have left the book since.
    ///
    /// Departures are orders in the previous snapshot, or tracked as placed,
    /// that are missing from `resting`. Tracked orders that show up in
    /// `resting` become live; departed ones become closed.
    pub fn observe_book(
        &self,
        owner: &Address,
        market: &str,
        resting: &[OnChainOrder],
    ) -> Vec<OnChainOrder> {
        let mut inner = self.inner();
        let book_key = (owner.clone(), market.to_string());
        let present: HashSet<ExchangeOrderId> = resting.iter().map(|o| o.exchange_id).collect();

        for order in resting {
            let Some(client_id) = &order.client_id else {
                continue;
            };
            if let Some(tracked) = inner.orders.get_mut(&(owner.clone(), client_id.clone())) {
                if matches!(tracked.state, TrackedState::Pending | TrackedState::Ambiguous) {
                    tracked.exchange_id = Some(order.exchange_id);
                    tracked.touch(TrackedState::Live);
                }
            }
        }

        let mut departed: Vec<OnChainOrder> = inner
            .last_seen
            .get(&book_key)
            .map(|prev| {
                prev.iter()
                    .filter(|o| !present.contains(&o.exchange_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let known: HashSet<ExchangeOrderId> = departed.iter().map(|o| o.exchange_id).collect();
        let tracked_gone: Vec<OnChainOrder> = inner
            .arrival
            .iter()
            .filter_map(|k| inner.orders.get(k))
            .filter(|o| {
                &o.owner == owner
                    && o.market == market
                    && matches!(o.state, TrackedState::Live | TrackedState::CancelConfirmed)
                    && o
                        .exchange_id
                        .is_some_and(|id| !present.contains(&id) && !known.contains(&id))
            })
            .map(|o| o.to_order(OrderStatus::Open))
            .collect();
        departed.extend(tracked_gone);

        for order in &departed {
            if let Some(client_id) = &order.client_id {
                if let Some(tracked) = inner.orders.get_mut(&(owner.clone(), client_id.clone())) {
                    tracked.touch(TrackedState::Closed);
                }
            }
        }

        inner.last_seen.insert(book_key, resting.to_vec());
        departed
    }

    /// Append classified departures to the (owner, market) history window.
    pub fn record_history(&self, owner: &Address, market: &str, orders: Vec<OnChainOrder>) {
        if orders.is_empty() {
            return;
        }
        let mut inner = self.inner();
        let window = inner.history_window;
        let history = inner
            .history
            .entry((owner.clone(), market.to_string()))
            .or_default();
        for order in orders {
            history.retain(|o| o.exchange_id != order.exchange_id);
            history.push_back(order);
        }
        while history.len() > window {
            history.pop_front();
        }
    }

    /// Recently departed orders for (owner, market), oldest first.
    #[must_use]
    pub fn history(&self, owner: &Address, market: &str) -> Vec<OnChainOrder> {
        self.inner()
            .history
            .get(&(owner.clone(), market.to_string()))
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tracked orders currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner().orders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner().orders.is_empty()
    }
}
