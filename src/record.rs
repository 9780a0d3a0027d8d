//! Records, the in-memory document table, and identifier generation.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Field every stored record carries its identifier in.
pub const ID_FIELD: &str = "_id";

/// Length of generated identifiers.
pub const ID_LEN: usize = 16;

/// A stored document: an arbitrary JSON object with at least one key.
pub type Record = Map<String, Value>;

/// Fresh random identifier: [`ID_LEN`] lowercase hex characters.
#[must_use]
pub fn new_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

/// Convert anything serializable into a record, rejecting non-objects and
/// empty objects. `what` names the input in the error message.
pub fn to_record<T: Serialize>(doc: T, what: &str) -> Result<Record> {
    let value = serde_json::to_value(doc).map_err(|e| Error::Serialize(e.to_string()))?;
    into_record(value, what)
}

/// Unwrap a JSON value into a record, with the same rules as [`to_record`].
pub fn into_record(value: Value, what: &str) -> Result<Record> {
    match value {
        Value::Object(map) if map.is_empty() => Err(Error::Validation(format!(
            "{what} must not be an empty object"
        ))),
        Value::Object(map) => Ok(map),
        _ => Err(Error::Validation(format!("{what} must be an object"))),
    }
}

/// The caller-supplied identifier of `record`, if any. Missing, `null`, and
/// empty-string `_id` all count as "no identifier".
pub fn supplied_id(record: &Record) -> Result<Option<String>> {
    match record.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::Validation(format!("`{ID_FIELD}` must be a string"))),
    }
}

/// Identifier → record mapping, kept in insertion order.
///
/// Every value is a JSON object; [`Table::from_map`] enforces that on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Table {
    docs: Map<String, Value>,
}

impl Table {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a parsed JSON object, rejecting non-object entries.
    pub fn from_map(docs: Map<String, Value>) -> Result<Self> {
        if let Some((id, _)) = docs.iter().find(|(_, v)| !v.is_object()) {
            return Err(Error::Format(format!("entry {id:?} is not an object")));
        }
        Ok(Self { docs })
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// `true` when the table holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// `true` if a record is stored under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Record stored under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.docs.get(id).and_then(Value::as_object)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.docs.get_mut(id).and_then(Value::as_object_mut)
    }

    /// Store `record` under `id`. An existing entry keeps its position.
    pub fn insert(&mut self, id: String, record: Record) -> Option<Record> {
        self.docs
            .insert(id, Value::Object(record))
            .and_then(|prev| match prev {
                Value::Object(map) => Some(map),
                _ => None,
            })
    }

    /// Remove and return the record under `id`, keeping the order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<Record> {
        match self.docs.shift_remove(id) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Records in table order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.docs.values().filter_map(Value::as_object)
    }

    /// `(id, record)` pairs in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Record)> + '_ {
        self.docs
            .iter()
            .filter_map(|(id, v)| v.as_object().map(|r| (id, r)))
    }

    /// A generated identifier not already present in the table.
    #[must_use]
    pub fn fresh_id(&self) -> String {
        loop {
            let id = new_id();
            if !self.contains(&id) {
                return id;
            }
        }
    }
}
