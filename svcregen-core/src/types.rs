//! Domain types for the service registry.
//!
//! A registry document is a YAML mapping from service name to an open-ended
//! mapping of fields. Only two field names are reserved:
//! [`STATUS_KEY`] and [`CONFFILES_KEY`]. Everything else is carried through
//! as [`FieldValue`] without inspection.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

/// Field whose presence advertises a status capability.
pub const STATUS_KEY: &str = "status";

/// Owner-managed sub-mapping that must survive every baseline merge.
pub const CONFFILES_KEY: &str = "conffiles";

/// A single field value: scalar, sequence or nested mapping.
pub type FieldValue = Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a service entry in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(pub String);

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// ServiceEntry
// ---------------------------------------------------------------------------

/// Field mapping for one service. Field order is preserved on write.
///
/// A `null` entry in a current registry document loads as an empty entry,
/// which the reconciler treats the same as a missing service.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ServiceEntry(Mapping);

impl<'de> Deserialize<'de> for ServiceEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default()))
    }
}

impl ServiceEntry {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Insert or overwrite a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(Value::String(field.into()), value)
    }

    /// Remove a field, keeping the order of the remaining fields.
    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.0.shift_remove(field)
    }

    /// Iterate fields in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &FieldValue)> {
        self.0.iter()
    }

    /// Shallow merge: every field of `other` overwrites the same-named field
    /// here; fields only present here are kept.
    pub fn merge_from(&mut self, other: &ServiceEntry) {
        for (key, value) in other.0.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Names of the fields in `other` whose value differs from (or is
    /// missing in) this entry.
    pub fn differing_fields(&self, other: &ServiceEntry) -> Vec<String> {
        other
            .0
            .iter()
            .filter(|(key, value)| self.0.get(*key) != Some(*value))
            .map(|(key, _)| field_label(key))
            .collect()
    }

    /// Detach `conffiles`, returning an empty mapping when absent.
    pub fn take_conffiles(&mut self) -> FieldValue {
        self.remove(CONFFILES_KEY)
            .unwrap_or_else(|| Value::Mapping(Mapping::new()))
    }

    /// Reattach a previously detached `conffiles` value unless it is empty.
    pub fn set_conffiles(&mut self, conffiles: FieldValue) {
        if is_truthy(&conffiles) {
            self.insert(CONFFILES_KEY, conffiles);
        }
    }
}

/// YAML truthiness: null, `false`, zero, and empty strings / sequences /
/// mappings are all falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => is_truthy(&tagged.value),
    }
}

fn field_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_else(|_| format!("{other:?}")),
    }
}

// ---------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------

/// The live catalog of managed services, in document order.
pub type ServiceRegistry = IndexMap<ServiceName, ServiceEntry>;

/// Baseline catalog shipped with the installed software version.
///
/// `None` or an empty entry marks removal intent: the service must not
/// survive reconciliation.
pub type BaselineRegistry = IndexMap<ServiceName, Option<ServiceEntry>>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
