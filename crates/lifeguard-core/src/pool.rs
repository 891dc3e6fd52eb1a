//! Pool, container and property records returned to the web client.
//!
//! Field names are serialized in the PascalCase form the web UI consumes;
//! they are part of the API contract and must stay stable.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Aggregate status of one storage pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pool {
    pub name: String,
    /// Pool-wide state (`ONLINE`, `DEGRADED`, `FAULTED`, ...).
    pub state: String,
    pub status: String,
    pub action: String,
    /// Reference URL for the current status, empty when none.
    pub see: String,
    pub scan: String,
    /// Scan progress in percent, `0.0` when no scan is running.
    pub scanned: f64,
    pub scan_paused: bool,
    pub errors: String,
    /// Unmodified tool output the record was parsed from.
    pub raw: String,
    /// Device tree in source order; `level` encodes the hierarchy.
    pub containers: Vec<Container>,
    pub datasets: Vec<PropertyRow>,
    pub snapshots: Vec<PropertyRow>,
    pub properties: PropertyRow,
}

/// One row of the device tree (pool root, vdev or vdev member).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Container {
    pub name: String,
    pub state: String,
    // Error counters stay strings: the tool prints placeholders like `-`
    // and abbreviations like `11.7K`.
    pub read: String,
    pub write: String,
    pub cksum: String,
    /// Trailing free text such as `(resilvering)`.
    pub status: String,
    /// Nesting depth, `0` for the pool's own row.
    pub level: usize,
}

/// A single named property value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Property {
    pub name: String,
    /// Value exactly as printed by the tool.
    pub value: String,
    /// Vault token, present only for identifier-bearing properties.
    #[serde(rename = "HMAC")]
    pub token: Option<String>,
}

/// The properties of one listed object, in the order they were requested.
///
/// Serializes as a JSON object keyed by property name, preserving order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyRow(Vec<Property>);

impl PropertyRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property, replacing an earlier one with the same name.
    pub fn push(&mut self, property: Property) {
        match self.0.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.0.push(property),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.iter().find(|p| p.name == name)
    }

    /// Shorthand for the value of `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Property> for PropertyRow {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        let mut row = Self::new();
        for property in iter {
            row.push(property);
        }
        row
    }
}

impl<'a> IntoIterator for &'a PropertyRow {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for PropertyRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for property in &self.0 {
            map.serialize_entry(&property.name, property)?;
        }
        map.end()
    }
}

/// Detail view of a dataset or snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataInfo {
    pub name: String,
    /// `filesystem`, `volume` or `snapshot`.
    #[serde(rename = "Type")]
    pub kind: String,
    pub properties: PropertyRow,
    /// Properties the UI uses for decisions but does not display
    /// (e.g. `keylocation`).
    pub internal: PropertyRow,
}
