use serde_json::{Number, Value};

use crate::{ErrorKind, Result};

/// Copy a json value, normalising numeric representations on the way.
///
/// Devices hand back numbers as floats while submitted configs often carry
/// integers; comparisons must treat `1` and `1.0` as the same value, so
/// every number is re-expressed as f64 before use.
pub fn deep_copy(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64().and_then(Number::from_f64) {
            Some(f) => Value::Number(f),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(deep_copy).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), deep_copy(v))).collect()),
        other => other.clone(),
    }
}

/// Structural equality after numeric normalisation.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    deep_copy(a) == deep_copy(b)
}

/// Is every field of `fields` present and equal in `expected`?
///
/// For objects this is subset equality: `expected` may carry extra keys.
/// Any other json type requires full structural equality. Mismatched types
/// compare false; two nulls compare true. `fields` being a lower bound is
/// what lets the diff engine skip updates the device already satisfies.
pub fn fields_is_expected(fields: &Value, expected: &Value) -> bool {
    if std::mem::discriminant(fields) != std::mem::discriminant(expected) {
        return false;
    }
    match (fields, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Object(fs), Value::Object(es)) => fs.iter().all(|(k, v)| match es.get(k) {
            Some(e) => deep_equal(v, e),
            None => false,
        }),
        _ => deep_equal(fields, expected),
    }
}

/// Join the non-empty parts with `/` to form a resource key.
pub fn keyname(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("/")
}

/// Chunk `s` into `size`-byte blocks.
///
/// A zero size is a caller error; sizes at or above the input length yield
/// the input unsplit.
pub fn split_blocks(s: &str, size: usize) -> Result<Vec<String>> {
    if size == 0 {
        return Err(ErrorKind::BlockSize.into());
    }
    if size >= s.len() {
        return Ok(vec![s.to_string()]);
    }
    Ok(s.as_bytes()
        .chunks(size)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect())
}

/// Order-preserving dedup.
pub fn unified(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for i in items {
        if seen.insert(i.clone()) {
            out.push(i);
        }
    }
    out
}

/// Compare two name lists: returns (only in `b`, only in `a`, in both).
pub fn diff_strings(a: &[String], b: &[String]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut remaining: std::collections::BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let mut created = Vec::new();
    let mut unchanged = Vec::new();
    for n in b {
        if remaining.remove(n.as_str()) {
            unchanged.push(n.clone());
        } else {
            created.push(n.clone());
        }
    }
    let deleted = remaining.into_iter().map(String::from).collect();
    (created, deleted, unchanged)
}
