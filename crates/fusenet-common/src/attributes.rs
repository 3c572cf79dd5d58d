//! Operator attribute dictionary.
//!
//! Nodes arrive with their attributes as a flat string-keyed map. Fused
//! subgraphs may namespace a node's attributes with a prefix, so every
//! lookup goes through an [`AttributeReader`] that prepends it.

use std::collections::HashMap;

use crate::ConfigError;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f32),
    String(String),
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(v: Vec<i64>) -> Self {
        AttributeValue::Ints(v)
    }
}

impl From<&[i64]> for AttributeValue {
    fn from(v: &[i64]) -> Self {
        AttributeValue::Ints(v.to_vec())
    }
}

impl From<f32> for AttributeValue {
    fn from(v: f32) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

/// String-keyed attribute map of one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAttributes {
    values: HashMap<String, AttributeValue>,
}

impl NodeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reader over the attributes whose keys start with `prefix`.
    pub fn reader<'a>(&'a self, prefix: &'a str) -> AttributeReader<'a> {
        AttributeReader { attrs: self, prefix }
    }
}

/// Typed, prefix-aware view of a [`NodeAttributes`] map.
///
/// Every getter returns `Ok(None)` for an absent key and
/// [`ConfigError::AttributeType`] when the key holds a different type.
#[derive(Debug, Clone, Copy)]
pub struct AttributeReader<'a> {
    attrs: &'a NodeAttributes,
    prefix: &'a str,
}

impl<'a> AttributeReader<'a> {
    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn lookup(&self, name: &str) -> Option<&'a AttributeValue> {
        self.attrs.get(&self.key(name))
    }

    fn type_error(&self, name: &str, expected: &'static str) -> ConfigError {
        ConfigError::AttributeType { name: self.key(name), expected }
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, ConfigError> {
        match self.lookup(name) {
            None => Ok(None),
            Some(AttributeValue::Int(v)) => Ok(Some(*v)),
            Some(_) => Err(self.type_error(name, "int")),
        }
    }

    pub fn ints(&self, name: &str) -> Result<Option<&'a [i64]>, ConfigError> {
        match self.lookup(name) {
            None => Ok(None),
            Some(AttributeValue::Ints(v)) => Ok(Some(v.as_slice())),
            Some(_) => Err(self.type_error(name, "ints")),
        }
    }

    pub fn string(&self, name: &str) -> Result<Option<&'a str>, ConfigError> {
        match self.lookup(name) {
            None => Ok(None),
            Some(AttributeValue::String(v)) => Ok(Some(v.as_str())),
            Some(_) => Err(self.type_error(name, "string")),
        }
    }

    /// Non-negative integer list; negative entries are a configuration error.
    pub fn usizes(&self, name: &str) -> Result<Option<Vec<usize>>, ConfigError> {
        let Some(values) = self.ints(name)? else {
            return Ok(None);
        };
        values
            .iter()
            .map(|&v| {
                usize::try_from(v).map_err(|_| ConfigError::NegativeValue { name: self.key(name), value: v })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}
