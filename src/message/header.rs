//! NATS header multimap.
//!
//! Keys are case-sensitive; each key maps to an ordered sequence of string
//! values. `get` returns the first value, `values` the full sequence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Case-sensitive header multimap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    entries: HashMap<String, Vec<String>>,
}

impl Header {
    /// Creates an empty header map
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to the given key, preserving value order
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Replaces all values for the given key with a single value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), vec![value.into()]);
    }

    /// Returns the first value associated with the key, if any
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns all values associated with the key, or an empty slice
    pub fn values(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns true if no keys are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over all (key, values) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }
}
