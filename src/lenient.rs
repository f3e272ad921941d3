//! Forgiving field decoders for request and model JSON.
//!
//! Browser clients and language models both send loosely typed JSON. These
//! helpers are used with `#[serde(deserialize_with = "...")]` so that a field
//! of the wrong type degrades to its empty value instead of rejecting the
//! whole payload:
//!   - strings: anything but a string becomes `""`
//!   - string lists: anything but an array becomes `[]`; non-string items are dropped
//!   - numbers: anything non-numeric becomes `None`

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::String(s) => s,
    _ => String::new(),
  })
}

pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::Array(items) => items
      .into_iter()
      .filter_map(|v| match v {
        Value::String(s) => Some(s),
        _ => None,
      })
      .collect(),
    _ => Vec::new(),
  })
}

pub fn boolean<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
  Ok(match Value::deserialize(d)? {
    Value::Bool(b) => b,
    _ => false,
  })
}

/// Integer from a JSON number or a numeric string; fractions are truncated.
pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
  Ok(int_from_value(&Value::deserialize(d)?))
}

/// Non-negative counter. Only real JSON numbers count; everything else is 0.
pub fn counter<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
  let v = Value::deserialize(d)?;
  let n = match &v {
    Value::Number(_) => int_from_value(&v).unwrap_or(0),
    _ => 0,
  };
  Ok(n.clamp(0, u32::MAX as i64) as u32)
}

/// Any nested object: `null` or a value of the wrong shape becomes `T::default()`.
pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned + Default,
{
  let v = Value::deserialize(d)?;
  Ok(serde_json::from_value(v).unwrap_or_default())
}

/// Optional nested object: anything that is not a decodable object is `None`.
pub fn opt_object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  Ok(match Value::deserialize(d)? {
    v @ Value::Object(_) => serde_json::from_value(v).ok(),
    _ => None,
  })
}

/// List of nested objects; entries that fail to decode are skipped.
pub fn object_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  Ok(match Value::deserialize(d)? {
    Value::Array(items) => items
      .into_iter()
      .filter(|v| v.is_object())
      .filter_map(|v| serde_json::from_value(v).ok())
      .collect(),
    _ => Vec::new(),
  })
}

fn int_from_value(v: &Value) -> Option<i64> {
  match v {
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
    }
    _ => None,
  }
}
