//! A point-in-time sample: measurement-channel name → value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One atomic sample from a measurement source.
///
/// Ordered by channel name so log output and persistence order are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading(BTreeMap<String, f64>);

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    /// A reading holding a single scalar channel.
    pub fn single(channel: impl Into<String>, value: f64) -> Self {
        let mut r = Self::new();
        r.insert(channel, value);
        r
    }

    pub fn insert(&mut self, channel: impl Into<String>, value: f64) {
        self.0.insert(channel.into(), value);
    }

    pub fn get(&self, channel: &str) -> Option<f64> {
        self.0.get(channel).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Reading {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
