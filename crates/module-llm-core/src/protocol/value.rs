//! Typed option values
//!
//! Capability configs carry open-ended tuning options as plain strings. Before
//! they go on the wire each string is turned into a typed JSON value using a
//! fixed heuristic:
//!
//! 1. `bool_true` / `bool_false` become booleans
//! 2. anything containing `.` that parses as a float becomes a float
//! 3. anything starting with a digit or `-` that parses as an integer becomes an integer
//! 4. everything else is sent as text, unchanged
//!
//! A plain `"true"` stays text; booleans must use the sentinel form.
//! Decoding never fails, malformed numbers such as `"1.2.3"` degrade to text.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel string for a boolean `true` option
pub const BOOL_TRUE: &str = "bool_true";

/// Sentinel string for a boolean `false` option
pub const BOOL_FALSE: &str = "bool_false";

/// A decoded option value
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// From `bool_true` / `bool_false`
    Boolean(bool),
    /// Whole number
    Integer(i64),
    /// Number written with a decimal point
    Float(f64),
    /// Anything else, passed through unchanged
    Text(String),
}

impl OptionValue {
    /// Convert into the JSON value sent to the module
    pub fn to_json(&self) -> Value {
        match self {
            OptionValue::Boolean(b) => Value::Bool(*b),
            OptionValue::Integer(n) => Value::Number((*n).into()),
            OptionValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            OptionValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<OptionValue> for Value {
    fn from(value: OptionValue) -> Self {
        value.to_json()
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Boolean(true) => f.write_str(BOOL_TRUE),
            OptionValue::Boolean(false) => f.write_str(BOOL_FALSE),
            OptionValue::Integer(n) => write!(f, "{}", n),
            OptionValue::Float(v) => write!(f, "{:.6}", v),
            OptionValue::Text(s) => f.write_str(s),
        }
    }
}

/// Decode a single raw option string
pub fn decode_option(raw: &str) -> OptionValue {
    if raw == BOOL_TRUE {
        return OptionValue::Boolean(true);
    }
    if raw == BOOL_FALSE {
        return OptionValue::Boolean(false);
    }

    if raw.contains('.') {
        // Non-finite results cannot be represented in JSON, keep those as text
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return OptionValue::Float(f);
            }
        }
    } else if raw.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        if let Ok(n) = raw.parse::<i64>() {
            return OptionValue::Integer(n);
        }
    }

    OptionValue::Text(raw.to_string())
}

/// Decode every option and merge it into `data`, overwriting same-named fields
pub fn encode_options<'a, I>(data: &mut Map<String, Value>, options: I)
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    for (key, raw) in options {
        data.insert(key.clone(), decode_option(raw).to_json());
    }
}

/// Open-ended capability tuning options, kept as raw strings until encoding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraParams {
    params: BTreeMap<String, String>,
}

impl ExtraParams {
    /// No options
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw option string as-is
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Store a boolean using the sentinel encoding
    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        let raw = if value { BOOL_TRUE } else { BOOL_FALSE };
        self.set_str(key, raw)
    }

    /// Store an integer
    pub fn set_int(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.set_str(key, value.to_string())
    }

    /// Store a float rendered with six decimals, so it always decodes as a float
    pub fn set_float(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.set_str(key, format!("{:.6}", value))
    }

    /// Raw string stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Remove an option, returning its raw string
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.params.remove(key)
    }

    /// True when no options are set
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of options
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Options in key order, as raw strings
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.params.iter()
    }

    /// Decode all options into typed values
    pub fn decoded(&self) -> BTreeMap<String, OptionValue> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), decode_option(v)))
            .collect()
    }
}

impl<'a> IntoIterator for &'a ExtraParams {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
