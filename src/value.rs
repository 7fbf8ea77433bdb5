//! value.rs
//! Loosely-typed attribute values as delivered by the front-end.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One raw attribute map, keyed by field name. Input order is preserved so the
/// extension bag can replay unknown attributes in the order they arrived.
pub type RawAttrs = IndexMap<String, AttrValue>;

/// The atomic unit of attribute data.
///
/// Deserializes untagged: JSON integers become `Int`, any other number becomes
/// `Float`. Maps are sorted so every rendering of a value is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    /// Short name of the variant, used in type mismatch messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
            AttrValue::List(_) => "sequence",
            AttrValue::Map(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, AttrValue::Null) }

    pub fn as_int(&self) -> Option<i64> {
        match self { AttrValue::Int(i) => Some(*i), _ => None }
    }

    /// Numeric view used for range checks. Booleans are not numbers here.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { AttrValue::Str(s) => Some(s), _ => None }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self { AttrValue::List(l) => Some(l), _ => None }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self { AttrValue::Map(m) => Some(m), _ => None }
    }

    /// Collects a list of strings; `None` if this is not a list or any element
    /// is not a string.
    pub fn as_str_list(&self) -> Option<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn as_int_list(&self) -> Option<Vec<i64>> {
        self.as_list()?.iter().map(AttrValue::as_int).collect()
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self { AttrValue::Int(v) }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self { AttrValue::Float(v) }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self { AttrValue::Bool(v) }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self { AttrValue::Str(v.to_string()) }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self { AttrValue::Str(v) }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(v: Vec<T>) -> Self { AttrValue::List(v.into_iter().map(Into::into).collect()) }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => write!(f, "null"),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            // Debug keeps a trailing ".0" so floats never print like ints.
            AttrValue::Float(x) => write!(f, "{:?}", x),
            AttrValue::Str(s) => write!(f, "{:?}", s),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            AttrValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Builds a `RawAttrs` from `(name, value)` pairs. Handy for front-ends and tests.
pub fn attrs<I, K, V>(pairs: I) -> RawAttrs
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<AttrValue>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Builds an `AttrValue::Map` from `(name, value)` pairs.
pub fn map<I, K, V>(pairs: I) -> AttrValue
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<AttrValue>,
{
    AttrValue::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_numbers_keep_their_kind() {
        let v: AttrValue = serde_json::from_str(r#"{"a": 1, "b": 1.0, "c": 1e-5}"#).unwrap();
        let m = v.as_map().unwrap();
        assert_eq!(m["a"], AttrValue::Int(1));
        assert_eq!(m["b"], AttrValue::Float(1.0));
        assert_eq!(m["c"], AttrValue::Float(1e-5));
    }

    #[test]
    fn test_display_is_sorted_and_typed() {
        let v = map([("z", AttrValue::Int(1)), ("a", AttrValue::Float(2.0))]);
        assert_eq!(v.to_string(), "{a=2.0, z=1}");
        assert_eq!(AttrValue::from(vec![1i64, 2]).to_string(), "[1, 2]");
    }
}
