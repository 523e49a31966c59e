//! In-memory simulated CLOB ledger.
//!
//! Applies place/cancel/settle instructions to per-market books and open
//! orders accounts, with knobs to inject the failure modes the engine must
//! survive: stale blockhash rejections, RPC outages, dropped sends, slow
//! responses and confirmations that stay hidden for a number of polls.
//!
//! It also records write conflicts: a send that touches an account while a
//! previous transaction on the same account has not been observed
//! confirmed yet.
//!
//! No matching happens here. Resting orders only leave the book through a
//! cancel instruction or the [`SimulatedLedger::fill_order`],
//! [`SimulatedLedger::fill_partial`] and [`SimulatedLedger::remove_order`]
//! helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clobgate_types::{
    AccountKey, Address, Blockhash, ChainError, ChainResult, ClientOrderId, ExchangeOrderId,
    FillEvent, InstructionOutcome, Market, MarketConfig, OnChainOrder, OpenOrdersAccount,
    Operation, OrderBookSnapshot, OrderSide, OrderStatus, SignatureStatus, SignedTransaction,
    Transaction, TxSignature,
};
use rust_decimal::Decimal;

use crate::traits::ChainClient;

/// Order slots per simulated open orders account.
const SLOT_COUNT: usize = 128;

/// Counters exposed for assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// `send_transaction` calls, including rejected ones.
    pub sends: usize,
    /// Transactions actually applied to state.
    pub applied: usize,
    pub blockhash_fetches: usize,
    pub status_queries: usize,
    pub market_fetches: usize,
    /// Sends that hit an account with an unconfirmed transaction in flight.
    pub write_conflicts: usize,
}

#[derive(Default)]
struct Faults {
    stale_sends: u32,
    blockhash_outages: u32,
    status_outages: u32,
    market_outages: u32,
    book_outages: u32,
    dropped_sends: u32,
    lost_acks: u32,
    hidden_polls: u32,
    simulation_errors: VecDeque<ChainError>,
    send_delay: Duration,
}

struct LedgerTx {
    key: Option<AccountKey>,
    status: SignatureStatus,
    hidden_polls: u32,
    open: bool,
}

#[derive(Default)]
struct LedgerState {
    markets: HashMap<Address, Market>,
    names: HashMap<String, Address>,
    books: HashMap<Address, Vec<OnChainOrder>>,
    accounts: HashMap<AccountKey, OpenOrdersAccount>,
    fills: HashMap<Address, Vec<FillEvent>>,
    fills_supported: bool,
    txs: HashMap<TxSignature, LedgerTx>,
    blockhash_seq: u64,
    next_exchange_id: u128,
    slot: u64,
    faults: Faults,
    in_flight: HashMap<AccountKey, usize>,
    stats: LedgerStats,
}

/// In-memory ledger implementing [`ChainClient`].
#[derive(Default)]
pub struct SimulatedLedger {
    state: Mutex<LedgerState>,
}

impl SimulatedLedger {
    #[must_use]
    pub fn new() -> Self {
        let ledger = Self::default();
        ledger.state().fills_supported = true;
        ledger
    }

    /// A ledger that already hosts `markets`.
    #[must_use]
    pub fn with_markets(markets: &[Market]) -> Self {
        let ledger = Self::new();
        for market in markets {
            ledger.add_market(market.clone());
        }
        ledger
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_market(&self, market: Market) {
        let mut st = self.state();
        st.names.insert(market.name.clone(), market.address.clone());
        st.markets.insert(market.address.clone(), market);
    }

    /// Whether `fills` answers with the event log or with `None`.
    pub fn set_fills_supported(&self, supported: bool) {
        self.state().fills_supported = supported;
    }

    // =================================================================
    // Fault injection
    // =================================================================

    /// The next `n` sends fail with [`ChainError::BlockhashExpired`].
    pub fn inject_stale_sends(&self, n: u32) {
        self.state().faults.stale_sends += n;
    }

    /// The next `n` blockhash fetches fail with [`ChainError::Unavailable`].
    pub fn inject_blockhash_outages(&self, n: u32) {
        self.state().faults.blockhash_outages += n;
    }

    /// The next `n` status queries fail with [`ChainError::Unavailable`].
    pub fn inject_status_outages(&self, n: u32) {
        self.state().faults.status_outages += n;
    }

    /// The next `n` market state reads fail with [`ChainError::Unavailable`].
    pub fn inject_market_outages(&self, n: u32) {
        self.state().faults.market_outages += n;
    }

    /// The next `n` order book reads fail with [`ChainError::Unavailable`].
    pub fn inject_book_outages(&self, n: u32) {
        self.state().faults.book_outages += n;
    }

    /// The next `n` sends are acknowledged but never land.
    pub fn drop_next_sends(&self, n: u32) {
        self.state().faults.dropped_sends += n;
    }

    /// The next `n` sends land on chain, but the caller sees a transport
    /// error instead of the acknowledgement.
    pub fn lose_next_send_acks(&self, n: u32) {
        self.state().faults.lost_acks += n;
    }

    /// The next applied transaction reports `Processed` for `polls` queries
    /// before revealing its real status.
    pub fn hide_next_confirmation(&self, polls: u32) {
        self.state().faults.hidden_polls = polls;
    }

    /// The next simulation fails with `err`.
    pub fn push_simulation_error(&self, err: ChainError) {
        self.state().faults.simulation_errors.push_back(err);
    }

    /// Sends apply immediately but answer only after `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        self.state().faults.send_delay = delay;
    }

    // =================================================================
    // Book manipulation
    // =================================================================

    /// Fully fill the owner's resting order `client_id`, crediting the free
    /// balances and recording a fill event.
    pub fn fill_order(&self, market_name: &str, owner: &Address, client_id: &str) -> bool {
        let mut st = self.state();
        let Some(order) = st.take_order(market_name, owner, client_id) else {
            return false;
        };
        st.release_funds(&order, true);
        let fill = FillEvent {
            market: order.market.clone(),
            owner: order.owner.clone(),
            exchange_id: order.exchange_id,
            client_id: order.client_id.clone(),
            side: order.side,
            price: order.price,
            size: order.remaining,
            maker: true,
            observed_at: Utc::now(),
        };
        if let Some(address) = st.names.get(market_name).cloned() {
            st.fills.entry(address).or_default().push(fill);
        }
        true
    }

    /// Fill `size` of the owner's resting order `client_id`, leaving the
    /// rest on the book. A fill that reaches the order's size removes it.
    pub fn fill_partial(
        &self,
        market_name: &str,
        owner: &Address,
        client_id: &str,
        size: Decimal,
    ) -> bool {
        let mut guard = self.state();
        let st = &mut *guard;
        let Some(address) = st.names.get(market_name).cloned() else {
            return false;
        };
        let Some(book) = st.books.get_mut(&address) else {
            return false;
        };
        let Some(idx) = book.iter().position(|o| {
            &o.owner == owner && o.client_id.as_ref().is_some_and(|c| c.as_str() == client_id)
        }) else {
            return false;
        };
        let order = &mut book[idx];
        let size = size.min(order.remaining);
        order.remaining -= size;
        order.filled += size;
        let snapshot = order.clone();
        if snapshot.remaining.is_zero() {
            book.remove(idx);
        }

        let key = AccountKey::new(owner.clone(), address.clone());
        let notional = snapshot.price * size;
        let account = st.account_mut(&key);
        if snapshot.remaining.is_zero() {
            account.slots_used = account.slots_used.saturating_sub(1);
        }
        match snapshot.side {
            OrderSide::Buy => {
                account.quote_total -= notional;
                account.base_total += size;
                account.base_free += size;
            }
            OrderSide::Sell => {
                account.base_total -= size;
                account.quote_total += notional;
                account.quote_free += notional;
            }
        }
        st.fills.entry(address).or_default().push(FillEvent {
            market: snapshot.market.clone(),
            owner: snapshot.owner.clone(),
            exchange_id: snapshot.exchange_id,
            client_id: snapshot.client_id.clone(),
            side: snapshot.side,
            price: snapshot.price,
            size,
            maker: true,
            observed_at: Utc::now(),
        });
        true
    }

    /// Remove a resting order without a fill event (canceled elsewhere).
    pub fn remove_order(&self, market_name: &str, owner: &Address, client_id: &str) -> bool {
        let mut st = self.state();
        let Some(order) = st.take_order(market_name, owner, client_id) else {
            return false;
        };
        st.release_funds(&order, false);
        true
    }

    /// Overwrite the owner's free balances, creating the account if needed.
    pub fn set_free_balance(
        &self,
        owner: &Address,
        market_name: &str,
        base_free: Decimal,
        quote_free: Decimal,
    ) {
        let mut st = self.state();
        let Some(address) = st.names.get(market_name).cloned() else {
            return;
        };
        let key = AccountKey::new(owner.clone(), address);
        let account = st.account_mut(&key);
        account.base_total += base_free - account.base_free;
        account.quote_total += quote_free - account.quote_free;
        account.base_free = base_free;
        account.quote_free = quote_free;
    }

    // =================================================================
    // Inspection
    // =================================================================

    #[must_use]
    pub fn stats(&self) -> LedgerStats {
        self.state().stats.clone()
    }

    /// Resting orders on `market_name`, bids first.
    #[must_use]
    pub fn resting_orders(&self, market_name: &str) -> Vec<OnChainOrder> {
        let st = self.state();
        st.names
            .get(market_name)
            .and_then(|a| st.books.get(a))
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn account(&self, owner: &Address, market_name: &str) -> Option<OpenOrdersAccount> {
        let st = self.state();
        let address = st.names.get(market_name)?;
        st.accounts
            .get(&AccountKey::new(owner.clone(), address.clone()))
            .cloned()
    }
}

impl LedgerState {
    fn account_key_of(&self, tx: &Transaction) -> Option<AccountKey> {
        let market = tx.instructions.first()?.market_name();
        let address = self.names.get(market)?;
        Some(AccountKey::new(tx.fee_payer.clone(), address.clone()))
    }

    fn account_mut(&mut self, key: &AccountKey) -> &mut OpenOrdersAccount {
        self.accounts
            .entry(key.clone())
            .or_insert_with(|| OpenOrdersAccount {
                address: Address::new(format!("oo-{}-{}", key.owner.short(), key.market.short())),
                owner: key.owner.clone(),
                market: key.market.clone(),
                slot_count: SLOT_COUNT,
                slots_used: 0,
                base_free: Decimal::ZERO,
                base_total: Decimal::ZERO,
                quote_free: Decimal::ZERO,
                quote_total: Decimal::ZERO,
            })
    }

    fn take_order(
        &mut self,
        market_name: &str,
        owner: &Address,
        client_id: &str,
    ) -> Option<OnChainOrder> {
        let address = self.names.get(market_name)?.clone();
        let book = self.books.get_mut(&address)?;
        let idx = book.iter().position(|o| {
            &o.owner == owner && o.client_id.as_ref().is_some_and(|c| c.as_str() == client_id)
        })?;
        Some(book.remove(idx))
    }

    /// Move a removed order's locked funds into free balances. A fill
    /// releases the proceeds; a cancel releases the original lock.
    fn release_funds(&mut self, order: &OnChainOrder, filled: bool) {
        let Some(address) = self.names.get(&order.market).cloned() else {
            return;
        };
        let key = AccountKey::new(order.owner.clone(), address);
        let notional = order.price * order.remaining;
        let account = self.account_mut(&key);
        account.slots_used = account.slots_used.saturating_sub(1);
        match (order.side, filled) {
            (OrderSide::Buy, true) => {
                account.quote_total -= notional;
                account.base_total += order.remaining;
                account.base_free += order.remaining;
            }
            (OrderSide::Sell, true) => {
                account.base_total -= order.remaining;
                account.quote_total += notional;
                account.quote_free += notional;
            }
            (OrderSide::Buy, false) => account.quote_free += notional,
            (OrderSide::Sell, false) => account.base_free += order.remaining,
        }
    }

    fn apply(&mut self, tx: &Transaction) -> Vec<InstructionOutcome> {
        tx.instructions
            .iter()
            .map(|op| self.apply_instruction(&tx.fee_payer, op))
            .collect()
    }

    fn apply_instruction(&mut self, payer: &Address, op: &Operation) -> InstructionOutcome {
        let Some(address) = self.names.get(op.market_name()).cloned() else {
            return InstructionOutcome::Rejected {
                reason: "unknown market".into(),
            };
        };
        if op.owner() != payer {
            return InstructionOutcome::Rejected {
                reason: "owner did not sign".into(),
            };
        }
        let key = AccountKey::new(op.owner().clone(), address.clone());

        match op {
            Operation::Place(order) => {
                let duplicate = self.books.get(&address).is_some_and(|book| {
                    book.iter()
                        .any(|o| o.owner == order.owner && o.has_client_id(&order.client_id))
                });
                if duplicate {
                    return InstructionOutcome::Rejected {
                        reason: "duplicate client id".into(),
                    };
                }
                let account = self.account_mut(&key);
                if account.free_slots() == 0 {
                    return InstructionOutcome::Rejected {
                        reason: "no free order slots".into(),
                    };
                }
                self.next_exchange_id += 1;
                let exchange_id = ExchangeOrderId(self.next_exchange_id);
                if order.order_type.is_immediate() {
                    return InstructionOutcome::Placed {
                        exchange_id,
                        resting: false,
                    };
                }
                let account = self.account_mut(&key);
                account.slots_used += 1;
                match order.side {
                    OrderSide::Buy => account.quote_total += order.price * order.amount,
                    OrderSide::Sell => account.base_total += order.amount,
                }
                let resting = OnChainOrder {
                    market: order.market_name.clone(),
                    owner: order.owner.clone(),
                    exchange_id,
                    client_id: Some(order.client_id.clone()),
                    side: order.side,
                    price: order.price,
                    amount: order.amount,
                    remaining: order.amount,
                    filled: Decimal::ZERO,
                    status: OrderStatus::Open,
                };
                let book = self.books.entry(address).or_default();
                book.push(resting);
                book.sort_by(|a, b| match (a.side, b.side) {
                    (OrderSide::Buy, OrderSide::Sell) => std::cmp::Ordering::Less,
                    (OrderSide::Sell, OrderSide::Buy) => std::cmp::Ordering::Greater,
                    (OrderSide::Buy, OrderSide::Buy) => b
                        .price
                        .cmp(&a.price)
                        .then(a.exchange_id.cmp(&b.exchange_id)),
                    (OrderSide::Sell, OrderSide::Sell) => a
                        .price
                        .cmp(&b.price)
                        .then(a.exchange_id.cmp(&b.exchange_id)),
                });
                InstructionOutcome::Placed {
                    exchange_id,
                    resting: true,
                }
            }
            Operation::Cancel(cancel) => {
                let position = self.books.get(&address).and_then(|book| {
                    book.iter().position(|o| {
                        o.owner == cancel.owner
                            && match cancel.exchange_id {
                                Some(id) => o.exchange_id == id,
                                None => o.has_client_id(&cancel.client_id),
                            }
                    })
                });
                let Some(idx) = position else {
                    return InstructionOutcome::Rejected {
                        reason: "order not found".into(),
                    };
                };
                let removed = self
                    .books
                    .get_mut(&address)
                    .map(|book| book.remove(idx));
                if let Some(order) = removed {
                    self.release_funds(&order, false);
                }
                InstructionOutcome::Canceled
            }
            Operation::Settle(_) => {
                let Some(account) = self.accounts.get_mut(&key) else {
                    return InstructionOutcome::Rejected {
                        reason: "no open orders account".into(),
                    };
                };
                let base = account.base_free;
                let quote = account.quote_free;
                account.base_total -= base;
                account.quote_total -= quote;
                account.base_free = Decimal::ZERO;
                account.quote_free = Decimal::ZERO;
                InstructionOutcome::Settled { base, quote }
            }
        }
    }

    fn release_in_flight(&mut self, key: Option<&AccountKey>) {
        if let Some(key) = key {
            if let Some(count) = self.in_flight.get_mut(key) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

#[async_trait]
impl ChainClient for SimulatedLedger {
    async fn latest_blockhash(&self) -> ChainResult<Blockhash> {
        let mut st = self.state();
        st.stats.blockhash_fetches += 1;
        if st.faults.blockhash_outages > 0 {
            st.faults.blockhash_outages -= 1;
            return Err(ChainError::Unavailable("connection refused".into()));
        }
        st.blockhash_seq += 1;
        Ok(Blockhash(format!("bh-{}", st.blockhash_seq)))
    }

    async fn simulate_transaction(&self, _tx: &SignedTransaction) -> ChainResult<()> {
        match self.state().faults.simulation_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn send_transaction(&self, tx: &SignedTransaction) -> ChainResult<TxSignature> {
        let delay = {
            let mut guard = self.state();
            let st = &mut *guard;
            st.stats.sends += 1;
            if st.faults.stale_sends > 0 {
                st.faults.stale_sends -= 1;
                return Err(ChainError::BlockhashExpired);
            }
            if st.txs.contains_key(&tx.signature) {
                return Ok(tx.signature.clone());
            }
            if st.faults.dropped_sends > 0 {
                st.faults.dropped_sends -= 1;
                return Ok(tx.signature.clone());
            }

            let key = st.account_key_of(&tx.transaction);
            if let Some(key) = &key {
                let count = st.in_flight.entry(key.clone()).or_insert(0);
                if *count > 0 {
                    st.stats.write_conflicts += 1;
                }
                *count += 1;
            }

            let logs = st.apply(&tx.transaction);
            st.slot += 1;
            st.stats.applied += 1;
            let hidden_polls = std::mem::take(&mut st.faults.hidden_polls);
            let slot = st.slot;
            tracing::debug!(
                signature = %tx.signature.short(),
                instructions = logs.len(),
                slot,
                "Simulated ledger applied transaction"
            );
            st.txs.insert(
                tx.signature.clone(),
                LedgerTx {
                    key,
                    status: SignatureStatus::Confirmed { slot, logs },
                    hidden_polls,
                    open: true,
                },
            );
            let lost_ack = st.faults.lost_acks > 0;
            if lost_ack {
                st.faults.lost_acks -= 1;
                return Err(ChainError::Unavailable("connection reset".into()));
            }
            st.faults.send_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(tx.signature.clone())
    }

    async fn signature_status(&self, signature: &TxSignature) -> ChainResult<SignatureStatus> {
        let mut st = self.state();
        st.stats.status_queries += 1;
        if st.faults.status_outages > 0 {
            st.faults.status_outages -= 1;
            return Err(ChainError::Unavailable("status endpoint down".into()));
        }
        let Some(entry) = st.txs.get_mut(signature) else {
            return Ok(SignatureStatus::NotFound);
        };
        if entry.hidden_polls > 0 {
            entry.hidden_polls -= 1;
            return Ok(SignatureStatus::Processed);
        }
        let status = entry.status.clone();
        let released = if entry.open {
            entry.open = false;
            entry.key.clone()
        } else {
            None
        };
        st.release_in_flight(released.as_ref());
        Ok(status)
    }

    async fn market_state(&self, config: &MarketConfig) -> ChainResult<Option<Market>> {
        let mut st = self.state();
        st.stats.market_fetches += 1;
        if st.faults.market_outages > 0 {
            st.faults.market_outages -= 1;
            return Err(ChainError::Unavailable("account fetch failed".into()));
        }
        Ok(st.markets.get(&config.address).map(|m| {
            let mut market = m.clone();
            market.name.clone_from(&config.name);
            market.program_id = config.program_id.clone();
            market.deprecated = config.deprecated;
            market
        }))
    }

    async fn order_book(&self, market: &Market) -> ChainResult<OrderBookSnapshot> {
        let mut st = self.state();
        if st.faults.book_outages > 0 {
            st.faults.book_outages -= 1;
            return Err(ChainError::Unavailable("book fetch failed".into()));
        }
        let orders = st.books.get(&market.address).cloned().unwrap_or_default();
        let (bids, asks) = orders.into_iter().partition(|o| o.side == OrderSide::Buy);
        Ok(OrderBookSnapshot {
            bids,
            asks,
            slot: st.slot,
        })
    }

    async fn open_orders_account(
        &self,
        owner: &Address,
        market: &Market,
    ) -> ChainResult<Option<OpenOrdersAccount>> {
        let st = self.state();
        Ok(st
            .accounts
            .get(&AccountKey::new(owner.clone(), market.address.clone()))
            .cloned())
    }

    async fn fills(&self, market: &Market) -> ChainResult<Option<Vec<FillEvent>>> {
        let st = self.state();
        if !st.fills_supported {
            return Ok(None);
        }
        Ok(Some(st.fills.get(&market.address).cloned().unwrap_or_default()))
    }
}

/// Convenience for tests holding a client id as `&str`.
#[must_use]
pub fn client_id(value: &str) -> ClientOrderId {
    ClientOrderId::new(value)
}
