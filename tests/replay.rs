use std::path::Path;

use matchbook::engine::MatchingEngine;
use matchbook::models::{ErrorCode, OrderRequest, OrderStatus, OrderType, Side, PRICE_SCALE};
use matchbook::persistence::event_log::EventLog;
use matchbook::persistence::snapshot::SnapshotManager;
use matchbook::risk::RiskChecker;

fn engine_at(log: &Path, snapshots: &Path, interval: u64) -> MatchingEngine {
    MatchingEngine::new(
        EventLog::open(log).unwrap(),
        SnapshotManager::open(snapshots, interval).unwrap(),
        RiskChecker::default(),
    )
}

fn limit(account: &str, side: Side, price: i64, quantity: i64) -> OrderRequest {
    OrderRequest {
        account_id: account.to_string(),
        symbol: "BTC-USD".to_string(),
        side,
        order_type: OrderType::Limit,
        price,
        quantity,
        idempotency_key: None,
        client_order_id: None,
    }
}

fn market(account: &str, side: Side, quantity: i64) -> OrderRequest {
    OrderRequest {
        account_id: account.to_string(),
        symbol: "BTC-USD".to_string(),
        side,
        order_type: OrderType::Market,
        price: 0,
        quantity,
        idempotency_key: None,
        client_order_id: None,
    }
}

#[test]
fn replay_rebuilds_partial_fill_state() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("events.jsonl");
    let snaps = dir.path().join("snapshots");

    {
        let mut engine = engine_at(&log, &snaps, 1_000);
        engine
            .place_order(limit("seller", Side::Sell, 10_000 * PRICE_SCALE, 100))
            .unwrap();
        let buy = engine
            .place_order(limit("buyer", Side::Buy, 10_000 * PRICE_SCALE, 40))
            .unwrap();
        assert_eq!(buy.trades.len(), 1);
    }

    let mut engine = engine_at(&log, &snaps, 1_000);
    assert!(engine.recover().unwrap());

    let trades = engine.get_trades("BTC-USD", 10);
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, 40);

    let resting = engine.get_order(1).unwrap();
    assert_eq!(resting.remaining_qty, 60);
    assert_eq!(resting.status, OrderStatus::Partial);
    assert_eq!(engine.get_order(2).unwrap().status, OrderStatus::Filled);

    let (bids, asks) = engine.book_levels("BTC-USD", 10);
    assert!(bids.is_empty());
    assert_eq!(asks.len(), 1);
    assert_eq!(asks[0].price, 10_000 * PRICE_SCALE);
    assert_eq!(asks[0].quantity, 60);
    assert_eq!(asks[0].order_count, 1);
}

#[test]
fn recover_with_nothing_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_at(
        &dir.path().join("events.jsonl"),
        &dir.path().join("snapshots"),
        1_000,
    );
    assert!(!engine.recover().unwrap());
}

#[test]
fn snapshot_plus_tail_replay() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("events.jsonl");
    let snaps = dir.path().join("snapshots");

    {
        let mut engine = engine_at(&log, &snaps, 1_000);
        engine
            .place_order(limit("s1", Side::Sell, 100 * PRICE_SCALE, 50))
            .unwrap();
        engine
            .place_order(limit("s2", Side::Sell, 110 * PRICE_SCALE, 50))
            .unwrap();
        engine.save_snapshot().unwrap();
        // tail after the snapshot: one sweep of the best level
        let buy = engine
            .place_order(limit("buyer", Side::Buy, 100 * PRICE_SCALE, 50))
            .unwrap();
        assert_eq!(buy.trades.len(), 1);
    }

    let mut engine = engine_at(&log, &snaps, 1_000);
    assert!(engine.recover().unwrap());

    assert_eq!(engine.get_order(1).unwrap().status, OrderStatus::Filled);
    assert_eq!(engine.get_order(2).unwrap().remaining_qty, 50);
    assert_eq!(engine.get_order(3).unwrap().status, OrderStatus::Filled);
    let (_, asks) = engine.book_levels("BTC-USD", 10);
    assert_eq!(asks.len(), 1);
    assert_eq!(asks[0].price, 110 * PRICE_SCALE);

    // tail trades are replayed
    assert_eq!(engine.get_trades("BTC-USD", 10).len(), 1);

    // id counters continue where the run left off
    let next = engine
        .place_order(limit("late", Side::Buy, 90 * PRICE_SCALE, 5))
        .unwrap();
    assert_eq!(next.order.unwrap().id, 4);
}

#[test]
fn rejected_market_order_replays_as_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("events.jsonl");
    let snaps = dir.path().join("snapshots");

    {
        let mut engine = engine_at(&log, &snaps, 1_000);
        let result = engine.place_order(market("buyer", Side::Buy, 10)).unwrap();
        assert_eq!(result.error_code, ErrorCode::NoLiquidity);
    }

    let mut engine = engine_at(&log, &snaps, 1_000);
    assert!(engine.recover().unwrap());
    let order = engine.get_order(1).unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    let (bids, asks) = engine.book_levels("BTC-USD", 10);
    assert!(bids.is_empty());
    assert!(asks.is_empty());
}

#[test]
fn self_trade_reject_replays_without_ghost_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("events.jsonl");
    let snaps = dir.path().join("snapshots");

    {
        let mut engine = engine_at(&log, &snaps, 1_000);
        engine
            .place_order(limit("acct", Side::Sell, 100 * PRICE_SCALE, 50))
            .unwrap();
        let buy = engine
            .place_order(limit("acct", Side::Buy, 100 * PRICE_SCALE, 30))
            .unwrap();
        assert_eq!(buy.error_code, ErrorCode::SelfTradePrevented);
    }

    let mut engine = engine_at(&log, &snaps, 1_000);
    assert!(engine.recover().unwrap());

    assert_eq!(engine.get_order(2).unwrap().status, OrderStatus::Rejected);
    let book = engine.book("BTC-USD").unwrap();
    assert!(!book.contains(2));
    assert_eq!(book.best_bid(), None);
    assert_eq!(book.best_ask(), Some(100 * PRICE_SCALE));
    assert!(!book.is_crossed());
}

#[test]
fn idempotency_keys_survive_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("events.jsonl");
    let snaps = dir.path().join("snapshots");

    {
        let mut engine = engine_at(&log, &snaps, 1_000);
        let mut request = limit("trader", Side::Buy, 100 * PRICE_SCALE, 10);
        request.idempotency_key = Some("k1".to_string());
        assert!(engine.place_order(request).unwrap().success);
    }

    let mut engine = engine_at(&log, &snaps, 1_000);
    assert!(engine.recover().unwrap());
    let mut request = limit("trader", Side::Buy, 100 * PRICE_SCALE, 10);
    request.idempotency_key = Some("k1".to_string());
    let duplicate = engine.place_order(request).unwrap();
    assert_eq!(duplicate.error_code, ErrorCode::DuplicateIdempotencyKey);
}

#[test]
fn sequences_continue_after_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("events.jsonl");
    let snaps = dir.path().join("snapshots");

    {
        let mut engine = engine_at(&log, &snaps, 1_000);
        engine
            .place_order(limit("s", Side::Sell, 100 * PRICE_SCALE, 10))
            .unwrap();
        engine
            .place_order(limit("b", Side::Buy, 100 * PRICE_SCALE, 10))
            .unwrap();
    }

    {
        let mut engine = engine_at(&log, &snaps, 1_000);
        assert!(engine.recover().unwrap());
        engine
            .place_order(limit("late", Side::Sell, 120 * PRICE_SCALE, 5))
            .unwrap();
    }

    let reader = EventLog::open(&log).unwrap();
    let events = reader.read_all().unwrap();
    // 2 ORDER_PLACED + 1 TRADE_EXECUTED + 1 ORDER_PLACED after recovery
    assert_eq!(events.len(), 4);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, i as u64 + 1);
    }
}

#[test]
fn replay_is_deterministic_for_mixed_streams() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("events.jsonl");
    let snaps = dir.path().join("snapshots");

    let live = {
        let mut engine = engine_at(&log, &snaps, 1_000);
        engine
            .place_order(limit("a", Side::Sell, 100 * PRICE_SCALE, 50))
            .unwrap();
        engine
            .place_order(limit("b", Side::Sell, 110 * PRICE_SCALE, 20))
            .unwrap();
        engine
            .place_order(limit("c", Side::Buy, 105 * PRICE_SCALE, 60))
            .unwrap();
        engine.place_order(market("d", Side::Sell, 5)).unwrap();
        engine
            .place_order(limit("a", Side::Buy, 110 * PRICE_SCALE, 30))
            .unwrap();
        assert!(engine.cancel_order(3).unwrap().success);
        engine.place_order(market("e", Side::Buy, 1_000)).unwrap();

        let mut orders: Vec<_> = engine.orders().cloned().collect();
        orders.sort_by_key(|o| o.id);
        (orders, engine.trades().to_vec(), engine.create_snapshot())
    };

    let mut recovered = engine_at(&log, &snaps, 1_000);
    assert!(recovered.recover().unwrap());

    let mut orders: Vec<_> = recovered.orders().cloned().collect();
    orders.sort_by_key(|o| o.id);
    assert_eq!(orders, live.0);
    assert_eq!(recovered.trades(), live.1.as_slice());

    let snapshot = recovered.create_snapshot();
    assert_eq!(snapshot.sequence, live.2.sequence);
    assert_eq!(snapshot.next_order_id, live.2.next_order_id);
    assert_eq!(snapshot.next_trade_id, live.2.next_trade_id);
    assert_eq!(snapshot.orders, live.2.orders);
}
