//! End-to-end tests through the caller-facing gateway.
//!
//! Every test drives `ClobGateway` against the simulated ledger:
//! request body -> normalizer -> resolver -> dispatcher -> ledger, and back
//! through the reconciler for reads. They cover batching under the
//! per-transaction ceiling, per-account serialization under concurrent
//! load, idempotent retry, ambiguous outcomes, and settlement.

use std::sync::Arc;
use std::time::Duration;

use clobgate_engine::CancelSignal;
use clobgate_gateway::{
    CancelOrdersRequest, ClobGateway, CreateOrdersRequest, MarketsRequest, NewOrder, OrderRef,
    OrdersQuery, OwnerMarketsRequest, request,
};
use clobgate_ledger::{KeyringWallet, SimulatedLedger};
use clobgate_types::*;
use futures::future::join_all;
use rust_decimal::Decimal;

/// Helper: gateway over a simulated ledger hosting three markets.
/// "RAY/USDC" is configured as deprecated.
struct Harness {
    ledger: Arc<SimulatedLedger>,
    gateway: ClobGateway,
    alice: Address,
    bob: Address,
}

impl Harness {
    fn new() -> Self {
        Self::with(|_| {})
    }

    fn with(tweak: impl FnOnce(&mut GatewayConfig)) -> Self {
        let markets = [
            Market::dummy("SOL/USDT"),
            Market::dummy("SRM/SOL"),
            Market::dummy("RAY/USDC"),
        ];
        let ledger = Arc::new(SimulatedLedger::with_markets(&markets));
        let mut config = GatewayConfig {
            markets: markets
                .iter()
                .map(|m| MarketConfig {
                    name: m.name.clone(),
                    address: m.address.clone(),
                    program_id: m.program_id.clone(),
                    deprecated: m.name == "RAY/USDC",
                })
                .collect(),
            ..GatewayConfig::default()
        };
        tweak(&mut config);

        let mut wallet = KeyringWallet::new();
        let alice = wallet.generate();
        let bob = wallet.generate();
        let gateway =
            ClobGateway::with_static_markets(config, ledger.clone(), Arc::new(wallet)).unwrap();
        Self {
            ledger,
            gateway,
            alice,
            bob,
        }
    }

    async fn create(&self, owner: &Address, orders: Vec<NewOrder>) -> BatchResponse {
        self.gateway
            .create_orders(
                &CreateOrdersRequest::new(owner, orders),
                &CancelSignal::new(),
            )
            .await
            .unwrap()
    }

    async fn open(&self, owner: &Address, market: &str) -> Vec<OnChainOrder> {
        self.gateway
            .get_open_orders(&OrdersQuery::on(owner, &[market]))
            .await
            .unwrap()
    }
}

fn bid(id: &str, market: &str, price: i64) -> NewOrder {
    NewOrder::limit(id, market, OrderSide::Buy, Decimal::new(price, 0), Decimal::ONE)
}

fn ask(id: &str, market: &str, price: i64) -> NewOrder {
    NewOrder::limit(id, market, OrderSide::Sell, Decimal::new(price, 0), Decimal::ONE)
}

fn reason(report: &OperationReport) -> &str {
    match &report.outcome {
        EntityOutcome::Rejected { reason } => reason,
        other => panic!("expected rejection, got {other:?}"),
    }
}

fn exchange_id(report: &OperationReport) -> ExchangeOrderId {
    match &report.outcome {
        EntityOutcome::Accepted {
            exchange_id: Some(id),
            ..
        } => *id,
        other => panic!("expected accepted place, got {other:?}"),
    }
}

fn signature(report: &OperationReport) -> &TxSignature {
    match &report.outcome {
        EntityOutcome::Accepted { signature, .. } => signature,
        other => panic!("expected accepted, got {other:?}"),
    }
}

// =============================================================================
// Test: Market table, single-flight cache, deprecation
// =============================================================================
#[tokio::test]
async fn e2e_markets_resolve_and_cache() {
    let h = Harness::new();

    let all = h.gateway.get_markets(&MarketsRequest::default()).await.unwrap();
    let names: Vec<&str> = all.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["SOL/USDT", "SRM/SOL"]);

    let ray = h.gateway.get_markets(&MarketsRequest::one("RAY/USDC")).await.unwrap();
    assert!(ray[0].deprecated);

    // Cached: no further fetches.
    h.gateway.get_markets(&MarketsRequest::default()).await.unwrap();
    assert_eq!(h.ledger.stats().market_fetches, 3);

    let err = h
        .gateway
        .get_markets(&MarketsRequest::one("BTC/USDC"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnknownMarket(_)));

    h.gateway.reload_markets();
    h.gateway.get_markets(&MarketsRequest::one("SOL/USDT")).await.unwrap();
    assert_eq!(h.ledger.stats().market_fetches, 4);
}

#[tokio::test]
async fn e2e_conflicting_market_fields_fail_whole_call() {
    let h = Harness::new();
    let req: MarketsRequest =
        request::parse(r#"{"marketName": "SOL/USDT", "marketNames": ["SRM/SOL"]}"#).unwrap();
    let err = h.gateway.get_tickers(&req).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequestShape { .. }));

    // Singular contained in the plural list: the list wins.
    let req: MarketsRequest =
        request::parse(r#"{"marketName": "SOL/USDT", "marketNames": ["SRM/SOL", "SOL/USDT"]}"#)
            .unwrap();
    assert_eq!(h.gateway.get_markets(&req).await.unwrap().len(), 2);
}

// =============================================================================
// Test: {orders: [A, B, C]} with maxOpsPerTx = 2 -> [A, B] then [C]
// =============================================================================
#[tokio::test(start_paused = true)]
async fn e2e_three_orders_two_per_transaction() {
    let h = Harness::with(|c| c.protocol.max_ops_per_tx = 2);
    let resp = h
        .create(
            &h.alice,
            vec![
                bid("A", "SOL/USDT", 100),
                bid("B", "SOL/USDT", 99),
                bid("C", "SOL/USDT", 98),
            ],
        )
        .await;

    assert_eq!(resp.status, ResponseStatus::Success);
    let entities: Vec<&str> = resp.reports.iter().map(|r| r.entity.as_str()).collect();
    assert_eq!(entities, vec!["A", "B", "C"]);

    let stats = h.ledger.stats();
    assert_eq!((stats.sends, stats.applied), (2, 2));
    assert_eq!(stats.write_conflicts, 0);

    // A and B share the first transaction, C lands strictly after.
    let [a, b, c] = [&resp.reports[0], &resp.reports[1], &resp.reports[2]];
    assert_eq!(signature(a), signature(b));
    assert_ne!(signature(a), signature(c));
    assert!(exchange_id(a) < exchange_id(b));
    assert!(exchange_id(b) < exchange_id(c));
    assert_eq!(h.gateway.lock_stats().max_concurrent_holders, 1);
}

#[tokio::test(start_paused = true)]
async fn e2e_many_orders_pack_under_ceiling() {
    let h = Harness::with(|c| c.protocol.max_ops_per_tx = 4);
    let orders = (0..10)
        .map(|i| bid(&format!("o{i}"), "SOL/USDT", 100 - i))
        .collect();
    let resp = h.create(&h.alice, orders).await;
    assert_eq!(resp.accepted(), 10);
    // ceil(10 / 4)
    assert_eq!(h.ledger.stats().applied, 3);
    assert_eq!(h.open(&h.alice, "SOL/USDT").await.len(), 10);
}

// =============================================================================
// Test: Per-entity rejections do not sink the rest of the request
// =============================================================================
#[tokio::test(start_paused = true)]
async fn e2e_per_entity_rejections() {
    let h = Harness::new();
    let misaligned = NewOrder::limit(
        "C",
        "SOL/USDT",
        OrderSide::Buy,
        Decimal::new(10_005, 4),
        Decimal::ONE,
    );
    let resp = h
        .create(
            &h.alice,
            vec![
                bid("A", "SOL/USDT", 100),
                bid("B", "BTC/USDC", 100),
                misaligned,
                bid("D", "RAY/USDC", 100),
            ],
        )
        .await;

    assert_eq!(resp.status, ResponseStatus::Partial);
    assert!(resp.reports[0].outcome.is_accepted());
    assert!(reason(&resp.reports[1]).starts_with("CG_ERR_200"));
    assert!(reason(&resp.reports[2]).contains("tick size"));
    assert!(reason(&resp.reports[3]).contains("deprecated"));
    assert_eq!(h.ledger.stats().sends, 1);

    // Rejected client ids are free to reuse.
    assert!(!h.gateway.tracker().is_live(&h.alice, &"C".into()));
}

#[tokio::test(start_paused = true)]
async fn e2e_live_client_id_cannot_be_reused() {
    let h = Harness::new();
    h.create(&h.alice, vec![bid("A", "SOL/USDT", 100)]).await;
    let resp = h.create(&h.alice, vec![bid("A", "SOL/USDT", 101)]).await;
    assert_eq!(resp.status, ResponseStatus::Failure);
    assert!(reason(&resp.reports[0]).starts_with("CG_ERR_101"));
    assert_eq!(h.ledger.stats().sends, 1);

    // Another owner may use the same client id.
    let resp = h.create(&h.bob, vec![bid("A", "SOL/USDT", 100)]).await;
    assert_eq!(resp.status, ResponseStatus::Success);
}

#[tokio::test]
async fn e2e_request_shape_errors_fail_whole_call() {
    let h = Harness::new();
    let cancel = CancelSignal::new();

    let conflicting = CreateOrdersRequest {
        owner: Some(h.alice.clone()),
        order: Some(bid("X", "SOL/USDT", 100)),
        orders: Some(vec![bid("A", "SOL/USDT", 100)]),
    };
    let no_owner = CreateOrdersRequest {
        owner: None,
        ..CreateOrdersRequest::new(&h.alice, vec![bid("A", "SOL/USDT", 100)])
    };
    let duplicate = CreateOrdersRequest::new(
        &h.alice,
        vec![bid("A", "SOL/USDT", 100), bid("A", "SRM/SOL", 1)],
    );
    let empty = CreateOrdersRequest::new(&h.alice, vec![]);

    for req in [conflicting, no_owner, duplicate, empty] {
        let err = h.gateway.create_orders(&req, &cancel).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequestShape { .. }), "{err}");
    }
    assert_eq!(h.ledger.stats().sends, 0);
}

#[tokio::test]
async fn e2e_owner_without_signer_is_refused() {
    let h = Harness::new();
    let mallory = Address::new("mallory");
    let err = h
        .gateway
        .create_orders(
            &CreateOrdersRequest::new(&mallory, vec![bid("A", "SOL/USDT", 100)]),
            &CancelSignal::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::WalletSigning { .. }));
    assert_eq!(h.ledger.stats().sends, 0);
}

// =============================================================================
// Test: Idempotent retry and timeouts
// =============================================================================
#[tokio::test(start_paused = true)]
async fn e2e_stale_blockhash_retry_applies_once() {
    let h = Harness::new();
    h.ledger.inject_stale_sends(2);
    let resp = h.create(&h.alice, vec![bid("A", "SOL/USDT", 100)]).await;

    assert_eq!(resp.status, ResponseStatus::Success);
    let stats = h.ledger.stats();
    assert_eq!((stats.sends, stats.applied), (3, 1));
    assert_eq!(h.ledger.resting_orders("SOL/USDT").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn e2e_confirmation_timeout_resolved_by_signature() {
    let h = Harness::with(|c| {
        c.timeouts.confirmation_ms = 1_000;
        c.timeouts.poll_interval_ms = 250;
    });
    h.ledger.hide_next_confirmation(6);
    let resp = h.create(&h.alice, vec![bid("A", "SOL/USDT", 100)]).await;

    assert_eq!(resp.status, ResponseStatus::Success);
    assert_eq!(h.ledger.stats().sends, 1);
    assert!(h.gateway.tracker().is_live(&h.alice, &"A".into()));
}

#[tokio::test(start_paused = true)]
async fn e2e_lost_transaction_is_ambiguous_and_reserved() {
    let h = Harness::with(|c| {
        c.timeouts.confirmation_ms = 1_000;
        c.retry.max_status_rechecks = 2;
    });
    h.ledger.drop_next_sends(1);
    let resp = h.create(&h.alice, vec![bid("A", "SOL/USDT", 100)]).await;

    assert_eq!(resp.status, ResponseStatus::Partial);
    assert_eq!(resp.ambiguous(), 1);
    assert_eq!(h.ledger.stats().sends, 1);

    let open = h.open(&h.alice, "SOL/USDT").await;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].status, OrderStatus::Ambiguous);

    // Never resubmitted under the same client id while unresolved.
    let retry = h.create(&h.alice, vec![bid("A", "SOL/USDT", 100)]).await;
    assert!(reason(&retry.reports[0]).starts_with("CG_ERR_101"));
}

#[tokio::test(start_paused = true)]
async fn e2e_canceled_signal_sends_nothing() {
    let h = Harness::new();
    let cancel = CancelSignal::new();
    cancel.cancel();
    let resp = h
        .gateway
        .create_orders(
            &CreateOrdersRequest::new(&h.alice, vec![bid("A", "SOL/USDT", 100)]),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(resp.status, ResponseStatus::Failure);
    assert_eq!(h.ledger.stats().sends, 0);
    assert!(!h.gateway.tracker().is_live(&h.alice, &"A".into()));
}

// =============================================================================
// Test: At most one in-flight transaction per account under concurrent load
// =============================================================================
#[tokio::test(start_paused = true)]
async fn e2e_concurrent_requests_serialize_per_account() {
    let h = Harness::with(|c| c.protocol.max_ops_per_tx = 2);
    h.ledger.set_send_delay(Duration::from_millis(20));

    let requests: Vec<CreateOrdersRequest> = (0..6)
        .map(|r| {
            CreateOrdersRequest::new(
                &h.alice,
                vec![
                    bid(&format!("r{r}-a"), "SOL/USDT", 100),
                    bid(&format!("r{r}-b"), "SOL/USDT", 99),
                    bid(&format!("r{r}-c"), "SOL/USDT", 98),
                ],
            )
        })
        .collect();
    let cancel = CancelSignal::new();
    let responses = join_all(
        requests
            .iter()
            .map(|req| h.gateway.create_orders(req, &cancel)),
    )
    .await;

    for resp in responses {
        assert_eq!(resp.unwrap().accepted(), 3);
    }
    assert_eq!(h.ledger.stats().applied, 12);
    assert_eq!(h.ledger.stats().write_conflicts, 0);
    assert_eq!(h.gateway.lock_stats().max_concurrent_holders, 1);
    assert_eq!(h.gateway.lock_stats().timeouts, 0);
}

// =============================================================================
// Test: Reads and reconciliation
// =============================================================================
#[tokio::test(start_paused = true)]
async fn e2e_tickers_and_order_books() {
    let h = Harness::new();
    let req = MarketsRequest::many(&["SOL/USDT", "SRM/SOL"]);

    let tickers = h.gateway.get_tickers(&req).await.unwrap();
    assert!(tickers.iter().all(|t| t.source == TickerSource::None));

    h.create(&h.alice, vec![bid("A", "SOL/USDT", 99), ask("B", "SOL/USDT", 101)])
        .await;
    let tickers = h.gateway.get_tickers(&req).await.unwrap();
    assert_eq!(tickers[0].price, Some(Decimal::new(100, 0)));
    assert_eq!(tickers[0].source, TickerSource::MidPrice);
    assert_eq!(tickers[1].price, None);

    h.ledger.fill_order("SOL/USDT", &h.alice, "B");
    let tickers = h.gateway.get_tickers(&MarketsRequest::one("SOL/USDT")).await.unwrap();
    assert_eq!(tickers[0].price, Some(Decimal::new(101, 0)));
    assert_eq!(tickers[0].source, TickerSource::LastFill);

    let books = h
        .gateway
        .get_order_books(&MarketsRequest::one("SOL/USDT"))
        .await
        .unwrap();
    assert_eq!(books[0].best_bid(), Some(Decimal::new(99, 0)));
    assert_eq!(books[0].best_ask(), None);
}

#[tokio::test(start_paused = true)]
async fn e2e_cancel_then_fill_are_classified() {
    let h = Harness::new();
    h.create(&h.alice, vec![bid("A", "SOL/USDT", 100), bid("B", "SOL/USDT", 99)])
        .await;

    let resp = h
        .gateway
        .cancel_orders(
            &CancelOrdersRequest::new(&h.alice, vec![OrderRef::new("A", "SOL/USDT")]),
            &CancelSignal::new(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status, ResponseStatus::Success);

    let open = h.open(&h.alice, "SOL/USDT").await;
    assert_eq!(open.len(), 1);
    assert!(open[0].has_client_id(&"B".into()));

    h.ledger.fill_order("SOL/USDT", &h.alice, "B");
    let filled = h
        .gateway
        .get_filled_orders(&OrdersQuery::on(&h.alice, &["SOL/USDT"]))
        .await
        .unwrap();
    let statuses: Vec<(Option<&str>, OrderStatus)> = filled
        .iter()
        .map(|o| (o.client_id.as_ref().map(ClientOrderId::as_str), o.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (Some("A"), OrderStatus::Canceled),
            (Some("B"), OrderStatus::Filled),
        ]
    );

    // get_orders = open + history, narrowed by client id.
    let query = OrdersQuery {
        client_id: Some("B".into()),
        ..OrdersQuery::on(&h.alice, &["SOL/USDT"])
    };
    let orders = h.gateway.get_orders(&query).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Filled);
}

#[tokio::test(start_paused = true)]
async fn e2e_departure_without_fill_data_is_unknown() {
    let h = Harness::new();
    h.ledger.set_fills_supported(false);
    h.create(&h.alice, vec![bid("A", "SOL/USDT", 100)]).await;
    h.open(&h.alice, "SOL/USDT").await;
    h.ledger.fill_order("SOL/USDT", &h.alice, "A");

    let filled = h
        .gateway
        .get_filled_orders(&OrdersQuery::on(&h.alice, &["SOL/USDT"]))
        .await
        .unwrap();
    assert_eq!(filled[0].status, OrderStatus::FilledOrCanceled);
}

// =============================================================================
// Test: cancel_open_orders
// =============================================================================
#[tokio::test(start_paused = true)]
async fn e2e_cancel_open_orders_with_nothing_open_is_empty_success() {
    let h = Harness::new();
    let resp = h
        .gateway
        .cancel_open_orders(&OwnerMarketsRequest::all(&h.bob), &CancelSignal::new())
        .await
        .unwrap();
    assert_eq!(resp.status, ResponseStatus::Success);
    assert!(resp.reports.is_empty());
    assert_eq!(h.ledger.stats().sends, 0);
}

#[tokio::test(start_paused = true)]
async fn e2e_cancel_open_orders_across_markets() {
    let h = Harness::new();
    h.create(
        &h.alice,
        vec![
            bid("A", "SOL/USDT", 100),
            bid("B", "SRM/SOL", 1),
            ask("C", "SOL/USDT", 120),
        ],
    )
    .await;
    h.create(&h.bob, vec![bid("A", "SOL/USDT", 90)]).await;
    assert_eq!(h.ledger.stats().applied, 3);

    let resp = h
        .gateway
        .cancel_open_orders(&OwnerMarketsRequest::all(&h.alice), &CancelSignal::new())
        .await
        .unwrap();
    assert_eq!(resp.status, ResponseStatus::Success);
    assert_eq!(resp.accepted(), 3);
    // One cancel transaction per market account.
    assert_eq!(h.ledger.stats().applied, 5);

    // Bob's order is untouched.
    let remaining = h.ledger.resting_orders("SOL/USDT");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].owner, h.bob);
}

// =============================================================================
// Test: settle_funds
// =============================================================================
#[tokio::test(start_paused = true)]
async fn e2e_settle_skips_zero_balance_market() {
    let h = Harness::new();
    h.ledger
        .set_free_balance(&h.alice, "SOL/USDT", Decimal::new(5, 0), Decimal::new(250, 0));
    h.ledger
        .set_free_balance(&h.alice, "SRM/SOL", Decimal::ZERO, Decimal::ZERO);

    let resp = h
        .gateway
        .settle_funds(
            &OwnerMarketsRequest::on(&h.alice, &["SOL/USDT", "SRM/SOL"]),
            &CancelSignal::new(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status, ResponseStatus::Success);
    let sol = resp.report("SOL/USDT").unwrap();
    let srm = resp.report("SRM/SOL").unwrap();
    assert!(sol.outcome.is_accepted());
    assert!(matches!(srm.outcome, EntityOutcome::Skipped { .. }));
    assert_eq!(h.ledger.stats().sends, 1);
    assert!(!h.ledger.account(&h.alice, "SOL/USDT").unwrap().has_unsettled());
}

#[tokio::test(start_paused = true)]
async fn e2e_fill_then_settle_releases_proceeds() {
    let h = Harness::new();
    h.create(&h.alice, vec![ask("A", "SOL/USDT", 100)]).await;
    h.ledger.fill_order("SOL/USDT", &h.alice, "A");
    assert!(h.ledger.account(&h.alice, "SOL/USDT").unwrap().has_unsettled());

    let resp = h
        .gateway
        .settle_funds(&OwnerMarketsRequest::all(&h.alice), &CancelSignal::new())
        .await
        .unwrap();
    assert_eq!(resp.accepted(), 1);
    // SRM/SOL has no open orders account at all.
    assert_eq!(resp.reports.len(), 2);
    assert!(!h.ledger.account(&h.alice, "SOL/USDT").unwrap().has_unsettled());
}

// =============================================================================
// Test: Configuration
// =============================================================================
#[tokio::test(start_paused = true)]
async fn e2e_gateway_from_json_config() {
    let config = GatewayConfig::from_json_str(
        r#"{
            "markets": [
                {"name": "SOL/USDT", "address": "mkt-sol-usdt", "programId": "clob-program"}
            ],
            "protocol": {"maxOpsPerTx": 1}
        }"#,
    )
    .unwrap();
    let ledger = Arc::new(SimulatedLedger::with_markets(&[Market::dummy("SOL/USDT")]));
    let mut wallet = KeyringWallet::new();
    let owner = wallet.generate();
    let gateway =
        ClobGateway::with_static_markets(config, ledger.clone(), Arc::new(wallet)).unwrap();

    let body = format!(
        r#"{{"owner": "{owner}", "orders": [
            {{"clientId": "A", "marketName": "SOL/USDT", "side": "BUY", "price": "10", "amount": "1"}},
            {{"clientId": "B", "marketName": "SOL/USDT", "side": "SELL", "orderType": "POST_ONLY", "price": "11", "amount": "1"}}
        ]}}"#
    );
    let req: CreateOrdersRequest = request::parse(&body).unwrap();
    let resp = gateway.create_orders(&req, &CancelSignal::new()).await.unwrap();
    assert_eq!(resp.accepted(), 2);
    assert_eq!(ledger.stats().applied, 2);
}

#[test]
fn e2e_invalid_config_is_refused() {
    let config = GatewayConfig {
        protocol: ProtocolLimits {
            max_ops_per_tx: 0,
            ..ProtocolLimits::default()
        },
        ..GatewayConfig::default()
    };
    let ledger = Arc::new(SimulatedLedger::new());
    let result = ClobGateway::with_static_markets(config, ledger, Arc::new(KeyringWallet::new()));
    assert!(matches!(result, Err(GatewayError::Configuration(_))));
}
