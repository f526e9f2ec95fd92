// Convert wire values into exact decimals.
// Binance sends prices/sizes as strings, Bitfinex as JSON numbers.

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::market_data::adapters::ParseError;

pub fn decimal_from_str(field: &'static str, s: &str) -> Result<Decimal, ParseError> {
    Decimal::from_str(s.trim())
        .or_else(|_| Decimal::from_scientific(s.trim()))
        .map_err(|_| ParseError::BadNumber { field, value: s.to_string() })
}

pub fn decimal_from_value(field: &'static str, v: &Value) -> Result<Decimal, ParseError> {
    match v {
        Value::String(s) => decimal_from_str(field, s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Decimal::from(u))
            } else {
                // from_f64 rounds to the shortest representation the float round-trips through
                n.as_f64()
                    .and_then(Decimal::from_f64)
                    .ok_or_else(|| ParseError::BadNumber { field, value: n.to_string() })
            }
        }
        other => Err(ParseError::WrongShape { expected: "number", found: shape(other) }),
    }
}

pub fn u64_from_value(field: &'static str, v: &Value) -> Result<u64, ParseError> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| ParseError::BadNumber { field, value: n.to_string() }),
        Value::String(s) => s
            .parse::<u64>()
            .map_err(|_| ParseError::BadNumber { field, value: s.clone() }),
        other => Err(ParseError::WrongShape { expected: "integer", found: shape(other) }),
    }
}

pub fn shape(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
