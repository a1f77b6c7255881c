use serde::Deserialize;

use crate::models::{ErrorCode, OrderRequest, OrderType, PRICE_SCALE};

/// Pre-trade limits. Deserializable so a settings file can override any
/// subset of the defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskLimits {
    #[serde(default = "default_max_order_size")]
    pub max_order_size: i64,
    #[serde(default = "default_max_notional")]
    pub max_notional: i64,
    #[serde(default = "default_allowed_symbols")]
    pub allowed_symbols: Vec<String>,
}

fn default_max_order_size() -> i64 {
    1_000 * PRICE_SCALE
}

fn default_max_notional() -> i64 {
    10_000_000 * PRICE_SCALE
}

fn default_allowed_symbols() -> Vec<String> {
    vec!["BTC-USD".to_string(), "ETH-USD".to_string()]
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_order_size: default_max_order_size(),
            max_notional: default_max_notional(),
            allowed_symbols: default_allowed_symbols(),
        }
    }
}

/// Stateless pre-trade validator. Checks run in a fixed order; the first
/// failure wins.
#[derive(Debug, Default)]
pub struct RiskChecker {
    limits: RiskLimits,
}

impl RiskChecker {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn check(&self, request: &OrderRequest) -> Result<(), ErrorCode> {
        if request.quantity <= 0 {
            return Err(ErrorCode::InvalidQuantity);
        }
        if request.order_type == OrderType::Limit && request.price <= 0 {
            return Err(ErrorCode::InvalidPrice);
        }
        if !self.is_valid_symbol(&request.symbol) {
            return Err(ErrorCode::InvalidSymbol);
        }
        if request.quantity > self.limits.max_order_size {
            return Err(ErrorCode::MaxOrderSizeExceeded);
        }
        if request.order_type == OrderType::Limit {
            let notional =
                request.price as i128 * request.quantity as i128 / PRICE_SCALE as i128;
            if notional > self.limits.max_notional as i128 {
                return Err(ErrorCode::MaxNotionalExceeded);
            }
        }
        Ok(())
    }

    pub fn is_valid_symbol(&self, symbol: &str) -> bool {
        self.limits.allowed_symbols.iter().any(|s| s == symbol)
    }
}
