use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Fixed-point scale: 1e8 units = 1.0. Prices and quantities are integers in
/// units of 10^-8; notional math widens to i128 instead of rounding.
pub const PRICE_SCALE: i64 = 100_000_000;

pub type OrderId = u64;
pub type TradeId = u64;
pub type Price = i64;
pub type Quantity = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    #[default]
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    New,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

/// Closed error taxonomy for engine and protocol responses. The display
/// string is the fixed human-readable message sent to clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    #[error("Success")]
    None,
    #[error("Quantity must be positive")]
    InvalidQuantity,
    #[error("Price must be positive for limit orders")]
    InvalidPrice,
    #[error("Unknown or invalid symbol")]
    InvalidSymbol,
    #[error("Side must be BUY or SELL")]
    InvalidSide,
    #[error("Order type must be LIMIT or MARKET")]
    InvalidOrderType,
    #[error("Order not found")]
    OrderNotFound,
    #[error("Insufficient account balance")]
    InsufficientBalance,
    #[error("Order size exceeds maximum allowed")]
    MaxOrderSizeExceeded,
    #[error("Order notional value exceeds maximum allowed")]
    MaxNotionalExceeded,
    #[error("Order would result in self-trade")]
    SelfTradePrevented,
    #[error("No liquidity available for market order")]
    NoLiquidity,
    #[error("Duplicate idempotency key")]
    DuplicateIdempotencyKey,
    #[error("Internal engine error")]
    InternalError,
}

impl ErrorCode {
    /// Wire spelling of the code, as serialized into responses and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::InvalidPrice => "INVALID_PRICE",
            Self::InvalidSymbol => "INVALID_SYMBOL",
            Self::InvalidSide => "INVALID_SIDE",
            Self::InvalidOrderType => "INVALID_ORDER_TYPE",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::MaxOrderSizeExceeded => "MAX_ORDER_SIZE_EXCEEDED",
            Self::MaxNotionalExceeded => "MAX_NOTIONAL_EXCEEDED",
            Self::SelfTradePrevented => "SELF_TRADE_PREVENTED",
            Self::NoLiquidity => "NO_LIQUIDITY",
            Self::DuplicateIdempotencyKey => "DUPLICATE_IDEMPOTENCY_KEY",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Client-supplied order fields, before the engine assigns an identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderRequest {
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type", default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Price,
    pub quantity: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

/// Full order record as held by the engine and written to the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    #[serde(default)]
    pub id: OrderId,
    pub account_id: String,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type", default)]
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Price,
    pub quantity: Quantity,
    #[serde(default)]
    pub remaining_qty: Quantity,
    #[serde(default)]
    pub timestamp_ns: u64,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl Order {
    /// An active order is live on or eligible for the book.
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::New | OrderStatus::Partial)
    }

    pub fn filled_qty(&self) -> Quantity {
        self.quantity - self.remaining_qty
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub symbol: String,
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp_ns: u64,
    pub buyer_account_id: String,
    pub seller_account_id: String,
}

/// Aggregate view of one price level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Event payloads, adjacently tagged so each log line carries its own
/// `type`/`payload` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    OrderPlaced(Order),
    OrderCancelled { order_id: OrderId },
    TradeExecuted(Trade),
    OrderRejected { order_id: OrderId, code: ErrorCode },
    SnapshotMarker(serde_json::Value),
}

/// One record of the append-only audit trail. `sequence` is the single
/// source of temporal truth for replay; timestamps are advisory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub sequence: u64,
    pub timestamp_ns: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Current wall-clock timestamp in nanoseconds.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
