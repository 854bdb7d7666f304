//! Loose semantic equality between a desired value and a decoded stored value.
//!
//! Stored values come back as text, so `2` and `"2"` must compare equal or
//! every count record would be rewritten on each save. Numeric comparison
//! only applies when one side is a real number: two strings compare as text,
//! so `"007"` against a stored `"7"` is a change.

use serde_json::Value;

const MAX_COMPARE_DEPTH: usize = 100;

/// Check whether two values are the same once stored.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    values_equal_at(a, b, 0)
}

fn values_equal_at(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_COMPARE_DEPTH {
        return a == b;
    }

    match (a, b) {
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(x, y)| values_equal_at(x, y, depth + 1))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| match ys.get(k) {
                    Some(y) => values_equal_at(x, y, depth + 1),
                    None => false,
                })
        }
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => false,
        _ => scalars_equal(a, b),
    }
}

fn scalars_equal(a: &Value, b: &Value) -> bool {
    if a.is_number() || b.is_number() {
        if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
            return x == y;
        }
    }
    scalar_text(a) == scalar_text(b)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                t.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        _ => None,
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => v.to_string(),
    }
}
