use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::models::{BookLevel, Order, OrderId, OrderStatus, Price, Quantity, Side};

/// Price-time priority book for a single symbol.
///
/// The engine owns the order records in an id-keyed map; the book stores ids
/// only and resolves them through that map when aggregate views are needed.
/// Within a price level ids queue FIFO by insertion. A side-partitioned
/// id → price index gives O(1) membership checks and O(level) removal.
#[derive(Debug, Default)]
pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<Price, VecDeque<OrderId>>,
    asks: BTreeMap<Price, VecDeque<OrderId>>,
    bid_index: HashMap<OrderId, Price>,
    ask_index: HashMap<OrderId, Price>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Append a resting limit order at the tail of its price level.
    /// Callers guarantee remaining > 0 and type LIMIT.
    pub fn add(&mut self, order: &Order) {
        match order.side {
            Side::Buy => {
                self.bids.entry(order.price).or_default().push_back(order.id);
                self.bid_index.insert(order.id, order.price);
            }
            Side::Sell => {
                self.asks.entry(order.price).or_default().push_back(order.id);
                self.ask_index.insert(order.id, order.price);
            }
        }
    }

    /// Remove an order from its level, dropping the level once empty.
    /// Returns whether the order was found on either side.
    pub fn remove(&mut self, order_id: OrderId) -> bool {
        if let Some(price) = self.bid_index.remove(&order_id) {
            Self::remove_from_level(&mut self.bids, price, order_id);
            return true;
        }
        if let Some(price) = self.ask_index.remove(&order_id) {
            Self::remove_from_level(&mut self.asks, price, order_id);
            return true;
        }
        false
    }

    fn remove_from_level(
        levels: &mut BTreeMap<Price, VecDeque<OrderId>>,
        price: Price,
        order_id: OrderId,
    ) {
        if let Some(queue) = levels.get_mut(&price) {
            queue.retain(|&id| id != order_id);
            if queue.is_empty() {
                levels.remove(&price);
            }
        }
    }

    /// Write a new remaining quantity through to the underlying order.
    /// Zero remaining fills the order and removes it from the book.
    pub fn update_remaining(
        &mut self,
        order_id: OrderId,
        new_qty: Quantity,
        orders: &mut HashMap<OrderId, Order>,
    ) {
        let Some(order) = orders.get_mut(&order_id) else {
            return;
        };
        order.remaining_qty = new_qty;
        if new_qty == 0 {
            order.status = OrderStatus::Filled;
            self.remove(order_id);
        } else {
            order.status = OrderStatus::Partial;
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.last_key_value().map(|(&price, _)| price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(&price, _)| price)
    }

    /// Head of the FIFO queue at the current best price for a side.
    pub fn front_at_best(&self, side: Side) -> Option<OrderId> {
        match side {
            Side::Buy => self.bids.last_key_value().and_then(|(_, q)| q.front().copied()),
            Side::Sell => self.asks.first_key_value().and_then(|(_, q)| q.front().copied()),
        }
    }

    /// FIFO order ids at the current best price for a side.
    pub fn orders_at_best(&self, side: Side) -> Vec<OrderId> {
        let queue = match side {
            Side::Buy => self.bids.last_key_value().map(|(_, q)| q),
            Side::Sell => self.asks.first_key_value().map(|(_, q)| q),
        };
        queue.map(|q| q.iter().copied().collect()).unwrap_or_default()
    }

    /// Up to `depth` aggregated levels from best outward.
    pub fn levels(
        &self,
        side: Side,
        depth: usize,
        orders: &HashMap<OrderId, Order>,
    ) -> Vec<BookLevel> {
        let iter: Box<dyn Iterator<Item = (&Price, &VecDeque<OrderId>)>> = match side {
            Side::Buy => Box::new(self.bids.iter().rev()),
            Side::Sell => Box::new(self.asks.iter()),
        };
        iter.take(depth)
            .map(|(&price, queue)| BookLevel {
                price,
                quantity: queue
                    .iter()
                    .filter_map(|id| orders.get(id))
                    .map(|o| o.remaining_qty)
                    .sum(),
                order_count: queue.len(),
            })
            .collect()
    }

    /// Crossed means best bid meets or exceeds best ask; the engine never
    /// leaves a book in this state between commands.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.bid_index.contains_key(&order_id) || self.ask_index.contains_key(&order_id)
    }

    pub fn bid_count(&self) -> usize {
        self.bid_index.len()
    }

    pub fn ask_count(&self) -> usize {
        self.ask_index.len()
    }
}
