//! Output formatting at the serialization boundary
//!
//! Analytics run at full precision; numbers are rounded only when a
//! response body is produced.

use serde::Serialize;
use serde_json::{Number, Value};

/// Serialize `data` and round every non-integer number to `precision` places
pub fn to_rounded_value<T: Serialize>(data: &T, precision: u32) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(data)?;
    round_numbers(&mut value, precision);
    Ok(value)
}

/// Round floating-point numbers in place; integers are left untouched
pub fn round_numbers(value: &mut Value, precision: u32) {
    match value {
        Value::Number(n) if n.is_f64() => {
            if let Some(rounded) = n.as_f64().map(|f| round_to(f, precision)).and_then(Number::from_f64) {
                *n = rounded;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| round_numbers(v, precision)),
        Value::Object(map) => map.values_mut().for_each(|v| round_numbers(v, precision)),
        _ => {}
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    let rounded = (value * factor).round() / factor;
    // Very large magnitudes overflow the scaled value; keep them as they are
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}
