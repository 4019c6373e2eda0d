//! The keyed dataset both engines read from.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{QuarryError, Result};

/// Unique entry ids mapped to arbitrary nested JSON records. Ids iterate in
/// sorted order, which keeps query evaluation deterministic.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: BTreeMap<String, Value>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }
    /// Accepts a top-level JSON object whose keys are the entry ids.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                records: map.into_iter().collect(),
            }),
            other => Err(QuarryError::Config(format!(
                "a dataset is a JSON object keyed by id, found {}",
                kind(&other)
            ))),
        }
    }
    pub fn from_records<I, K>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            records: records.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
    pub fn insert(&mut self, id: impl Into<String>, record: Value) {
        self.records.insert(id.into(), record);
    }
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.records.get(id)
    }
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
