use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A measurement that applies to the device.
///
/// `Unknown` means "applicable but no trustworthy value this poll". A sensor
/// that does not apply at all is simply not in the map; zero is a real
/// reading ("no flow").
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SensorValue {
    Value(f64),
    Unknown,
}

impl SensorValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(*v),
            Self::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<f64> for SensorValue {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

impl From<Option<f64>> for SensorValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Unknown, Self::Value)
    }
}

impl Serialize for SensorValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::Unknown => serializer.serialize_none(),
        }
    }
}

// CanonicalSensorMap {{{
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalSensorMap(BTreeMap<String, SensorValue>);

impl CanonicalSensorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<SensorValue>,
    {
        self.0.insert(key.into(), value.into());
    }

    pub fn set_unknown<K: Into<String>>(&mut self, key: K) {
        self.0.insert(key.into(), SensorValue::Unknown);
    }

    pub fn get(&self, key: &str) -> Option<SensorValue> {
        self.0.get(key).copied()
    }

    /// The numeric value, if the key is present and known.
    pub fn value(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.value())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_unknown(&self, key: &str) -> bool {
        matches!(self.get(key), Some(SensorValue::Unknown))
    }

    pub fn remove(&mut self, key: &str) -> Option<SensorValue> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SensorValue)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `other` over this map.
    pub fn extend(&mut self, other: CanonicalSensorMap) {
        self.0.extend(other.0);
    }

    /// Copy entries of `other` whose key is not in this map yet, or is
    /// `Unknown` here but known there.
    pub fn fill_from(&mut self, other: &CanonicalSensorMap) {
        for (key, value) in other.iter() {
            match self.get(key) {
                None => self.insert(key, value),
                Some(SensorValue::Unknown) if !value.is_unknown() => self.insert(key, value),
                Some(_) => {}
            }
        }
    }
} // }}}

impl FromIterator<(String, SensorValue)> for CanonicalSensorMap {
    fn from_iter<I: IntoIterator<Item = (String, SensorValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
