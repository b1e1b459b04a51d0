//! Minimal oracle: echoes a value or derives a price from a symbol and a round.

use async_trait::async_trait;
use quorum_core::application::{App, AppCallContext};
use quorum_core::domain::{AppMethod, AppRequest, MemWrite, TypedValue};
use quorum_core::foundation::ThresholdError;
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};

pub const SIMPLE_ORACLE_NAME: &str = "simple_oracle";

const PRICE_MODULUS: u64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimpleOracleMethod {
    Echo,
    Quote,
}

impl AppMethod for SimpleOracleMethod {
    const ALL: &'static [Self] = &[Self::Echo, Self::Quote];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Quote => "quote",
        }
    }
}

/// Price every node derives for `symbol` in `round`: `keccak(symbol || round) mod 1e6 + 1`.
pub fn quote_price(symbol: &str, round: u64) -> u64 {
    let mut hasher = Keccak256::new();
    hasher.update(symbol.as_bytes());
    hasher.update(round.to_be_bytes());
    let digest = hasher.finalize();
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[24..32]);
    u64::from_be_bytes(tail) % PRICE_MODULUS + 1
}

pub fn last_quote_key(symbol: &str) -> String {
    format!("{}:quote:{}", SIMPLE_ORACLE_NAME, symbol)
}

fn invalid(key: &str, details: &str) -> ThresholdError {
    ThresholdError::ValidationError(format!("param {}: {}", key, details))
}

fn symbol_of(request: &AppRequest) -> Result<&str, ThresholdError> {
    request.param_str("symbol").filter(|s| !s.trim().is_empty()).ok_or_else(|| invalid("symbol", "missing"))
}

fn round_of(request: &AppRequest) -> Result<u64, ThresholdError> {
    match request.param("round") {
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| invalid("round", "expected an unsigned integer")),
        Some(Value::String(s)) => s.parse().map_err(|_| invalid("round", "expected an unsigned integer")),
        _ => Err(invalid("round", "missing")),
    }
}

pub struct SimpleOracle;

#[async_trait]
impl App for SimpleOracle {
    type Method = SimpleOracleMethod;

    const NAME: &'static str = SIMPLE_ORACLE_NAME;

    async fn validate_request(&self, _ctx: &AppCallContext<'_>, method: SimpleOracleMethod, request: &AppRequest) -> Result<(), ThresholdError> {
        match method {
            SimpleOracleMethod::Echo => request.param_str("value").map(|_| ()).ok_or_else(|| invalid("value", "missing")),
            SimpleOracleMethod::Quote => {
                symbol_of(request)?;
                round_of(request)?;
                Ok(())
            }
        }
    }

    async fn on_request(&self, _ctx: &AppCallContext<'_>, method: SimpleOracleMethod, request: &AppRequest) -> Result<Value, ThresholdError> {
        match method {
            SimpleOracleMethod::Echo => Ok(json!({ "value": request.param_str("value").unwrap_or_default() })),
            SimpleOracleMethod::Quote => {
                let symbol = symbol_of(request)?;
                let round = round_of(request)?;
                Ok(json!({ "symbol": symbol, "round": round, "price": quote_price(symbol, round) }))
            }
        }
    }

    fn sign_params(&self, method: SimpleOracleMethod, _request: &AppRequest, result: &Value) -> Result<Vec<TypedValue>, ThresholdError> {
        let field = |key: &str| result.get(key).ok_or_else(|| ThresholdError::app(SIMPLE_ORACLE_NAME, format!("result has no {}", key)));
        match method {
            SimpleOracleMethod::Echo => Ok(vec![TypedValue::string(field("value")?.as_str().unwrap_or_default())]),
            SimpleOracleMethod::Quote => {
                let symbol = field("symbol")?.as_str().unwrap_or_default();
                let round = field("round")?.as_u64().unwrap_or_default();
                let price = field("price")?.as_u64().unwrap_or_default();
                Ok(vec![TypedValue::string(symbol), TypedValue::uint(round), TypedValue::uint(price)])
            }
        }
    }

    fn on_mem_write(&self, method: SimpleOracleMethod, request: &AppRequest) -> Result<Vec<MemWrite>, ThresholdError> {
        if method != SimpleOracleMethod::Quote {
            return Ok(Vec::new());
        }
        let symbol = request.data.result.get("symbol").and_then(Value::as_str).unwrap_or_default();
        Ok(vec![MemWrite { key: last_quote_key(symbol), data: request.data.result.clone(), ttl: None }])
    }
}
