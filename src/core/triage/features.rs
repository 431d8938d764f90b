//! Per-format feature records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single named attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<u64> for FeatureValue {
    fn from(v: u64) -> Self {
        FeatureValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<u32> for FeatureValue {
    fn from(v: u32) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<u16> for FeatureValue {
    fn from(v: u16) -> Self {
        FeatureValue::Int(v as i64)
    }
}

impl From<usize> for FeatureValue {
    fn from(v: usize) -> Self {
        FeatureValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<Vec<String>> for FeatureValue {
    fn from(v: Vec<String>) -> Self {
        FeatureValue::List(v)
    }
}

impl FeatureValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FeatureValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FeatureValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FeatureValue::List(v) => Some(v),
            _ => None,
        }
    }
}

/// Ordered attribute map, so serialized records are stable.
pub type FeatureMap = BTreeMap<String, FeatureValue>;

/// Features produced by exactly one extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "attributes")]
pub enum FeatureRecord {
    Executable(FeatureMap),
    Office(FeatureMap),
    Document(FeatureMap),
}

impl FeatureRecord {
    pub fn attributes(&self) -> &FeatureMap {
        match self {
            FeatureRecord::Executable(m) | FeatureRecord::Office(m) | FeatureRecord::Document(m) => m,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.attributes().get(key)
    }
}
