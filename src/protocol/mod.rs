use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::engine::MatchingEngine;
use crate::models::{now_ns, ErrorCode, OrderRequest};

/// Line-framed JSON command dispatcher over the matching engine.
///
/// One request object in, one response object out. Malformed input never
/// escapes as a panic: bad JSON or missing fields become PARSE_ERROR, an
/// unrecognized `cmd` becomes UNKNOWN_COMMAND, and engine I/O failures
/// surface as INTERNAL_ERROR.
pub struct ProtocolHandler {
    engine: MatchingEngine,
}

/// A serialized response line plus whether the driver should stop.
pub struct Reply {
    pub line: String,
    pub shutdown: bool,
}

#[derive(Debug, Serialize)]
struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    req_id: Option<String>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

enum Outcome {
    Data(Value),
    Engine(ErrorCode),
    Protocol { code: &'static str, message: String },
}

impl ProtocolHandler {
    pub fn new(engine: MatchingEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut MatchingEngine {
        &mut self.engine
    }

    pub fn handle(&mut self, line: &str) -> Reply {
        let request: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                let response = Response {
                    req_id: None,
                    success: false,
                    data: None,
                    error: Some(ErrorBody {
                        code: "PARSE_ERROR".to_string(),
                        message: format!("JSON parse error: {err}"),
                    }),
                };
                return Reply {
                    line: render(response),
                    shutdown: false,
                };
            }
        };

        let req_id = request
            .get("req_id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let cmd = request
            .get("cmd")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let shutdown = matches!(cmd.as_str(), "shutdown" | "exit" | "quit");

        let outcome = self.dispatch(&cmd, &request);
        self.maybe_snapshot();

        let response = match outcome {
            Outcome::Data(data) => Response {
                req_id,
                success: true,
                data: Some(data),
                error: None,
            },
            Outcome::Engine(code) => Response {
                req_id,
                success: false,
                data: None,
                error: Some(ErrorBody {
                    code: code.as_str().to_string(),
                    message: code.to_string(),
                }),
            },
            Outcome::Protocol { code, message } => Response {
                req_id,
                success: false,
                data: None,
                error: Some(ErrorBody {
                    code: code.to_string(),
                    message,
                }),
            },
        };
        Reply {
            line: render(response),
            shutdown,
        }
    }

    fn dispatch(&mut self, cmd: &str, request: &Value) -> Outcome {
        match cmd {
            "place_order" => {
                let Some(order_value) = request.get("order") else {
                    return parse_error("missing field: order");
                };
                let order: OrderRequest = match serde_json::from_value(order_value.clone()) {
                    Ok(order) => order,
                    Err(err) => return parse_error(format!("invalid order: {err}")),
                };
                match self.engine.place_order(order) {
                    Ok(result) if result.success => Outcome::Data(json!({
                        "order": result.order,
                        "trades": result.trades,
                    })),
                    Ok(result) => Outcome::Engine(result.error_code),
                    Err(err) => internal_error(err),
                }
            }
            "cancel_order" => {
                let Some(order_id) = request.get("order_id").and_then(Value::as_u64) else {
                    return parse_error("missing or invalid field: order_id");
                };
                match self.engine.cancel_order(order_id) {
                    Ok(result) if result.success => Outcome::Data(json!({ "order": result.order })),
                    Ok(result) => Outcome::Engine(result.error_code),
                    Err(err) => internal_error(err),
                }
            }
            "get_order" => {
                let Some(order_id) = request.get("order_id").and_then(Value::as_u64) else {
                    return parse_error("missing or invalid field: order_id");
                };
                match self.engine.get_order(order_id) {
                    Some(order) => Outcome::Data(json!({ "order": order })),
                    None => Outcome::Engine(ErrorCode::OrderNotFound),
                }
            }
            "get_book" => {
                let Some(symbol) = request.get("symbol").and_then(Value::as_str) else {
                    return parse_error("missing or invalid field: symbol");
                };
                let depth = request
                    .get("depth")
                    .and_then(Value::as_u64)
                    .unwrap_or(10) as usize;
                let (bids, asks) = self.engine.book_levels(symbol, depth);
                Outcome::Data(json!({
                    "symbol": symbol,
                    "bids": bids,
                    "asks": asks,
                }))
            }
            "get_trades" => {
                let Some(symbol) = request.get("symbol").and_then(Value::as_str) else {
                    return parse_error("missing or invalid field: symbol");
                };
                let limit = request
                    .get("limit")
                    .and_then(Value::as_u64)
                    .unwrap_or(100) as usize;
                let trades = self.engine.get_trades(symbol, limit);
                Outcome::Data(json!({
                    "symbol": symbol,
                    "trades": trades,
                }))
            }
            "get_stats" => match serde_json::to_value(self.engine.stats()) {
                Ok(stats) => Outcome::Data(stats),
                Err(err) => internal_error(err.into()),
            },
            "health" => Outcome::Data(json!({
                "status": "healthy",
                "timestamp_ns": now_ns(),
            })),
            "shutdown" | "exit" | "quit" => Outcome::Data(json!({
                "status": "shutting_down",
            })),
            other => Outcome::Protocol {
                code: "UNKNOWN_COMMAND",
                message: format!("Unknown command: {other}"),
            },
        }
    }

    fn maybe_snapshot(&mut self) {
        if self.engine.should_snapshot() {
            if let Err(err) = self.engine.save_snapshot() {
                warn!(error = %err, "snapshot save failed");
            }
        }
    }
}

fn parse_error(message: impl Into<String>) -> Outcome {
    Outcome::Protocol {
        code: "PARSE_ERROR",
        message: message.into(),
    }
}

fn internal_error(err: anyhow::Error) -> Outcome {
    Outcome::Protocol {
        code: "INTERNAL_ERROR",
        message: format!("Internal error: {err}"),
    }
}

fn render(response: Response) -> String {
    serde_json::to_string(&response).unwrap_or_else(|_| {
        r#"{"success":false,"error":{"code":"INTERNAL_ERROR","message":"response serialization failed"}}"#
            .to_string()
    })
}
