pub mod config;
pub mod engine;
pub mod matching;
pub mod models;
pub mod persistence;
pub mod protocol;
pub mod risk;

pub use engine::{CancelOrderResult, EngineStats, MatchingEngine, PlaceOrderResult};
pub use models::{
    ErrorCode, Order, OrderId, OrderRequest, OrderStatus, OrderType, Side, Trade, TradeId,
    PRICE_SCALE,
};
