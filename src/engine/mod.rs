use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::matching::orderbook::OrderBook;
use crate::models::{
    now_ns, BookLevel, ErrorCode, Event, EventKind, Order, OrderId, OrderRequest, OrderStatus,
    OrderType, Side, Trade, TradeId,
};
use crate::persistence::event_log::EventLog;
use crate::persistence::snapshot::{Snapshot, SnapshotManager};
use crate::risk::RiskChecker;

/// Running counters plus the current event-log sequence.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStats {
    pub total_orders: u64,
    pub total_trades: u64,
    pub total_cancels: u64,
    pub total_rejects: u64,
    pub event_sequence: u64,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderResult {
    pub success: bool,
    pub error_code: ErrorCode,
    pub order: Option<Order>,
    pub trades: Vec<Trade>,
}

impl PlaceOrderResult {
    fn rejected(error_code: ErrorCode) -> Self {
        Self {
            success: false,
            error_code,
            order: None,
            trades: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelOrderResult {
    pub success: bool,
    pub error_code: ErrorCode,
    pub order: Option<Order>,
}

/// Single-threaded matching core. Owns every order ever accepted, one book
/// per symbol, the executed-trade list, the consumed idempotency keys, and
/// the id counters. All state changes are appended to the event log before
/// the enclosing command returns.
pub struct MatchingEngine {
    books: HashMap<String, OrderBook>,
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
    idempotency_keys: HashSet<String>,
    next_order_id: OrderId,
    next_trade_id: TradeId,
    event_log: EventLog,
    snapshots: SnapshotManager,
    risk: RiskChecker,
    stats: EngineStats,
}

impl MatchingEngine {
    pub fn new(event_log: EventLog, snapshots: SnapshotManager, risk: RiskChecker) -> Self {
        Self {
            books: HashMap::new(),
            orders: HashMap::new(),
            trades: Vec::new(),
            idempotency_keys: HashSet::new(),
            next_order_id: 1,
            next_trade_id: 1,
            event_log,
            snapshots,
            risk,
            stats: EngineStats::default(),
        }
    }

    /// Validate, admit, and match one incoming order.
    ///
    /// Idempotency and risk failures return before any id is assigned or
    /// event written. Post-match failures (no liquidity for a market order,
    /// a limit order that could only rest crossed after self-trade
    /// prevention) happen after ORDER_PLACED is durable; they append an
    /// ORDER_REJECTED event so replay converges on the same state.
    pub fn place_order(&mut self, request: OrderRequest) -> anyhow::Result<PlaceOrderResult> {
        if let Some(key) = &request.idempotency_key {
            if !key.is_empty() && self.idempotency_keys.contains(key) {
                self.stats.total_rejects += 1;
                return Ok(PlaceOrderResult::rejected(ErrorCode::DuplicateIdempotencyKey));
            }
        }
        if let Err(code) = self.risk.check(&request) {
            self.stats.total_rejects += 1;
            return Ok(PlaceOrderResult::rejected(code));
        }

        let id = self.next_order_id;
        self.next_order_id += 1;
        let order = Order {
            id,
            account_id: request.account_id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            quantity: request.quantity,
            remaining_qty: request.quantity,
            timestamp_ns: now_ns(),
            status: OrderStatus::New,
            idempotency_key: request.idempotency_key,
            client_order_id: request.client_order_id,
        };
        if let Some(key) = &order.idempotency_key {
            if !key.is_empty() {
                self.idempotency_keys.insert(key.clone());
            }
        }

        let symbol = order.symbol.clone();
        let side = order.side;
        let order_type = order.order_type;
        let price = order.price;

        self.orders.insert(id, order.clone());
        self.log_event(EventKind::OrderPlaced(order))?;
        self.stats.total_orders += 1;

        let trades = self.run_matching(id)?;

        let remaining = self.orders.get(&id).map(|o| o.remaining_qty).unwrap_or(0);
        if remaining == 0 {
            if let Some(order) = self.orders.get_mut(&id) {
                order.status = OrderStatus::Filled;
            }
        } else if order_type == OrderType::Market {
            if trades.is_empty() {
                return self.reject_placed(id, ErrorCode::NoLiquidity, trades);
            }
            // market orders never rest; the remainder is abandoned
            if let Some(order) = self.orders.get_mut(&id) {
                order.status = OrderStatus::Partial;
            }
        } else {
            let would_cross = {
                let book = self
                    .books
                    .entry(symbol.clone())
                    .or_insert_with(|| OrderBook::new(symbol.clone()));
                match side {
                    Side::Buy => book.best_ask().is_some_and(|ask| price >= ask),
                    Side::Sell => book.best_bid().is_some_and(|bid| price <= bid),
                }
            };
            if would_cross {
                // only reachable when matching stopped on a self-trade
                return self.reject_placed(id, ErrorCode::SelfTradePrevented, trades);
            }
            if !trades.is_empty() {
                if let Some(order) = self.orders.get_mut(&id) {
                    order.status = OrderStatus::Partial;
                }
            }
            if let Some(order) = self.orders.get(&id).cloned() {
                if let Some(book) = self.books.get_mut(&symbol) {
                    book.add(&order);
                }
            }
        }

        Ok(PlaceOrderResult {
            success: true,
            error_code: ErrorCode::None,
            order: self.orders.get(&id).cloned(),
            trades,
        })
    }

    fn reject_placed(
        &mut self,
        id: OrderId,
        code: ErrorCode,
        trades: Vec<Trade>,
    ) -> anyhow::Result<PlaceOrderResult> {
        if let Some(order) = self.orders.get_mut(&id) {
            order.status = OrderStatus::Rejected;
        }
        self.log_event(EventKind::OrderRejected { order_id: id, code })?;
        self.stats.total_rejects += 1;
        Ok(PlaceOrderResult {
            success: false,
            error_code: code,
            order: self.orders.get(&id).cloned(),
            trades,
        })
    }

    /// Match the incoming order against the opposite side's best level until
    /// it is filled, the book runs out, prices stop crossing, or a resting
    /// order from the same account is reached (cancel-new policy: the loop
    /// stops entirely rather than skipping past the self-order).
    fn run_matching(&mut self, taker_id: OrderId) -> anyhow::Result<Vec<Trade>> {
        let (symbol, taker_side, taker_type, taker_price, taker_account) = {
            let Some(taker) = self.orders.get(&taker_id) else {
                return Ok(Vec::new());
            };
            (
                taker.symbol.clone(),
                taker.side,
                taker.order_type,
                taker.price,
                taker.account_id.clone(),
            )
        };

        let mut executed = Vec::new();
        loop {
            let taker_remaining = match self.orders.get(&taker_id) {
                Some(taker) if taker.remaining_qty > 0 => taker.remaining_qty,
                _ => break,
            };
            let Some(maker_id) = self
                .books
                .get(&symbol)
                .and_then(|book| book.front_at_best(taker_side.opposite()))
            else {
                break;
            };
            let Some((maker_price, maker_remaining, maker_account)) = self
                .orders
                .get(&maker_id)
                .map(|maker| (maker.price, maker.remaining_qty, maker.account_id.clone()))
            else {
                break;
            };

            if taker_type == OrderType::Limit {
                let crosses = match taker_side {
                    Side::Buy => maker_price <= taker_price,
                    Side::Sell => maker_price >= taker_price,
                };
                if !crosses {
                    break;
                }
            }
            if maker_account == taker_account {
                break;
            }

            let quantity = taker_remaining.min(maker_remaining);
            let (buy_order_id, sell_order_id, buyer_account_id, seller_account_id) =
                match taker_side {
                    Side::Buy => (taker_id, maker_id, taker_account.clone(), maker_account),
                    Side::Sell => (maker_id, taker_id, maker_account, taker_account.clone()),
                };
            let trade = Trade {
                id: self.next_trade_id,
                buy_order_id,
                sell_order_id,
                symbol: symbol.clone(),
                // maker-price rule: the resting order dictates the print
                price: maker_price,
                quantity,
                timestamp_ns: now_ns(),
                buyer_account_id,
                seller_account_id,
            };
            self.next_trade_id += 1;

            self.trades.push(trade.clone());
            self.log_event(EventKind::TradeExecuted(trade.clone()))?;
            self.stats.total_trades += 1;
            debug!(
                trade_id = trade.id,
                price = trade.price,
                quantity = trade.quantity,
                "trade executed"
            );

            if let Some(taker) = self.orders.get_mut(&taker_id) {
                taker.remaining_qty -= quantity;
            }
            if let Some(book) = self.books.get_mut(&symbol) {
                book.update_remaining(maker_id, maker_remaining - quantity, &mut self.orders);
            }
            executed.push(trade);
        }
        Ok(executed)
    }

    /// Cancel a live order. Terminal orders (FILLED/CANCELLED/REJECTED) and
    /// unknown ids both report ORDER_NOT_FOUND.
    pub fn cancel_order(&mut self, order_id: OrderId) -> anyhow::Result<CancelOrderResult> {
        let Some(order) = self.orders.get(&order_id) else {
            return Ok(CancelOrderResult {
                success: false,
                error_code: ErrorCode::OrderNotFound,
                order: None,
            });
        };
        if !order.is_active() {
            return Ok(CancelOrderResult {
                success: false,
                error_code: ErrorCode::OrderNotFound,
                order: Some(order.clone()),
            });
        }
        let symbol = order.symbol.clone();
        if let Some(book) = self.books.get_mut(&symbol) {
            book.remove(order_id);
        }
        if let Some(order) = self.orders.get_mut(&order_id) {
            order.status = OrderStatus::Cancelled;
        }
        self.log_event(EventKind::OrderCancelled { order_id })?;
        self.stats.total_cancels += 1;
        Ok(CancelOrderResult {
            success: true,
            error_code: ErrorCode::None,
            order: self.orders.get(&order_id).cloned(),
        })
    }

    pub fn get_order(&self, order_id: OrderId) -> Option<Order> {
        self.orders.get(&order_id).cloned()
    }

    pub fn book(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    /// Aggregated (bids, asks) levels from best outward; empty for an
    /// unknown symbol.
    pub fn book_levels(&self, symbol: &str, depth: usize) -> (Vec<BookLevel>, Vec<BookLevel>) {
        match self.books.get(symbol) {
            Some(book) => (
                book.levels(Side::Buy, depth, &self.orders),
                book.levels(Side::Sell, depth, &self.orders),
            ),
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Up to `limit` most recent trades for `symbol`, oldest of the selected
    /// window first.
    pub fn get_trades(&self, symbol: &str, limit: usize) -> Vec<Trade> {
        if limit == 0 {
            return Vec::new();
        }
        let mut out: Vec<Trade> = self
            .trades
            .iter()
            .rev()
            .filter(|trade| trade.symbol == symbol)
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        out
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            event_sequence: self.event_log.current_sequence(),
            ..self.stats
        }
    }

    /// Capture the active order set and id counters at the current sequence.
    /// Orders are sorted by id so the file content is deterministic.
    pub fn create_snapshot(&self) -> Snapshot {
        let mut orders: Vec<Order> = self
            .orders
            .values()
            .filter(|order| order.is_active())
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id);
        Snapshot {
            sequence: self.event_log.current_sequence(),
            timestamp_ns: now_ns(),
            next_order_id: self.next_order_id,
            next_trade_id: self.next_trade_id,
            orders,
        }
    }

    pub fn should_snapshot(&self) -> bool {
        self.snapshots.should_snapshot(self.event_log.current_sequence())
    }

    pub fn save_snapshot(&mut self) -> anyhow::Result<()> {
        let snapshot = self.create_snapshot();
        self.snapshots.save(&snapshot)
    }

    /// Rebuild state from the newest snapshot plus the event tail, or from
    /// the full event log when no snapshot exists. Returns whether any
    /// recovery happened.
    pub fn recover(&mut self) -> anyhow::Result<bool> {
        if let Some(snapshot) = self.snapshots.load_latest()? {
            self.books.clear();
            self.orders.clear();
            self.trades.clear();
            self.idempotency_keys.clear();
            for order in snapshot.orders {
                self.install_order(&order);
                self.orders.insert(order.id, order);
            }
            self.next_order_id = snapshot.next_order_id;
            self.next_trade_id = snapshot.next_trade_id;
            self.event_log.advance_to(snapshot.sequence);
            let events = self.event_log.read_from(snapshot.sequence + 1)?;
            self.replay_events(&events);
            info!(
                snapshot_sequence = snapshot.sequence,
                replayed = events.len(),
                orders = self.orders.len(),
                "recovered from snapshot and event tail"
            );
            return Ok(true);
        }
        let events = self.event_log.read_all()?;
        if events.is_empty() {
            return Ok(false);
        }
        self.replay_events(&events);
        info!(replayed = events.len(), orders = self.orders.len(), "recovered from event log");
        Ok(true)
    }

    /// Book an active limit order and record its idempotency key. Shared by
    /// snapshot load and ORDER_PLACED replay; does not insert into the
    /// orders map.
    fn install_order(&mut self, order: &Order) {
        if order.is_active() && order.order_type == OrderType::Limit && order.remaining_qty > 0 {
            self.books
                .entry(order.symbol.clone())
                .or_insert_with(|| OrderBook::new(order.symbol.clone()))
                .add(order);
        }
        if let Some(key) = &order.idempotency_key {
            if !key.is_empty() {
                self.idempotency_keys.insert(key.clone());
            }
        }
    }

    /// Apply events in sequence order without re-running matching. Replay is
    /// idempotent with respect to orders already installed from a snapshot.
    fn replay_events(&mut self, events: &[Event]) {
        for event in events {
            self.event_log.advance_to(event.sequence);
            match &event.kind {
                EventKind::OrderPlaced(order) => {
                    if self.orders.contains_key(&order.id) {
                        continue;
                    }
                    self.install_order(order);
                    self.next_order_id = self.next_order_id.max(order.id + 1);
                    self.orders.insert(order.id, order.clone());
                }
                EventKind::OrderCancelled { order_id } => {
                    if let Some(order) = self.orders.get_mut(order_id) {
                        order.status = OrderStatus::Cancelled;
                        let symbol = order.symbol.clone();
                        if let Some(book) = self.books.get_mut(&symbol) {
                            book.remove(*order_id);
                        }
                    }
                }
                EventKind::TradeExecuted(trade) => {
                    self.next_trade_id = self.next_trade_id.max(trade.id + 1);
                    self.trades.push(trade.clone());
                    self.deduct_replayed_fill(trade.buy_order_id, trade.quantity);
                    self.deduct_replayed_fill(trade.sell_order_id, trade.quantity);
                }
                EventKind::OrderRejected { order_id, .. } => {
                    if let Some(order) = self.orders.get_mut(order_id) {
                        order.status = OrderStatus::Rejected;
                        let symbol = order.symbol.clone();
                        if let Some(book) = self.books.get_mut(&symbol) {
                            book.remove(*order_id);
                        }
                    }
                }
                EventKind::SnapshotMarker(_) => {}
            }
        }
    }

    fn deduct_replayed_fill(&mut self, order_id: OrderId, quantity: i64) {
        let Some(order) = self.orders.get_mut(&order_id) else {
            return;
        };
        order.remaining_qty -= quantity;
        if order.remaining_qty <= 0 {
            order.remaining_qty = 0;
            order.status = OrderStatus::Filled;
            let symbol = order.symbol.clone();
            if let Some(book) = self.books.get_mut(&symbol) {
                book.remove(order_id);
            }
        } else {
            order.status = OrderStatus::Partial;
        }
    }

    fn log_event(&mut self, kind: EventKind) -> anyhow::Result<()> {
        let event = Event {
            sequence: self.event_log.next_sequence(),
            timestamp_ns: now_ns(),
            kind,
        };
        self.event_log.append(&event)
    }
}
