//! Record selectors and partial updates.
//!
//! A [`Filter`] picks records by identifier, by a set of field values, or by an
//! arbitrary predicate. A [`Patch`] describes an edit: fields to set and fields
//! to remove.

use crate::error::{Error, Result};
use crate::record::{to_record, Record, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Predicate over a record, shareable with the queue worker thread.
pub type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Options for field matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Compare strings exactly. Off by default, which makes string fields
    /// match case-insensitively.
    #[serde(default)]
    pub strict: bool,
}

/// Selects records in the store.
#[derive(Clone)]
pub enum Filter {
    /// Exactly the record stored under this identifier.
    ById(String),
    /// Every record whose fields match all of `fields`.
    ByFields {
        /// Key/value pairs a record must carry.
        fields: Record,
        /// Comparison options.
        options: FilterOptions,
    },
    /// Every record the predicate accepts.
    ByPredicate(Predicate),
}

impl Filter {
    /// Select by identifier.
    pub fn id(id: impl Into<String>) -> Self {
        Filter::ById(id.into())
    }

    /// Select by field values. `fields` must serialize to a JSON object.
    pub fn fields<T: Serialize>(fields: T) -> Result<Self> {
        let fields = match serde_json::to_value(fields)? {
            Value::Object(map) => map,
            _ => return Err(Error::Validation("filter must be an object".into())),
        };
        Ok(Filter::ByFields {
            fields,
            options: FilterOptions::default(),
        })
    }

    /// Select with a closure.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Filter::ByPredicate(Arc::new(f))
    }

    /// Switch a field filter to exact string comparison. No effect on the
    /// other variants.
    #[must_use]
    pub fn strict(mut self) -> Self {
        if let Filter::ByFields { options, .. } = &mut self {
            options.strict = true;
        }
        self
    }

    /// `true` if the record stored under `id` is selected.
    #[must_use]
    pub fn matches(&self, id: &str, record: &Record) -> bool {
        match self {
            Filter::ById(want) => want == id,
            Filter::ByFields { fields, options } => matches_fields(record, fields, *options),
            Filter::ByPredicate(pred) => pred(record),
        }
    }
}

impl From<&str> for Filter {
    fn from(id: &str) -> Self {
        Filter::ById(id.to_owned())
    }
}

impl From<String> for Filter {
    fn from(id: String) -> Self {
        Filter::ById(id)
    }
}

impl From<&String> for Filter {
    fn from(id: &String) -> Self {
        Filter::ById(id.clone())
    }
}

impl From<Record> for Filter {
    fn from(fields: Record) -> Self {
        Filter::ByFields {
            fields,
            options: FilterOptions::default(),
        }
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::ById(id) => f.debug_tuple("ById").field(id).finish(),
            Filter::ByFields { fields, options } => f
                .debug_struct("ByFields")
                .field("fields", fields)
                .field("options", options)
                .finish(),
            Filter::ByPredicate(_) => f.write_str("ByPredicate(..)"),
        }
    }
}

/// `true` when `record` carries every key in `fields` with a matching value.
///
/// Strings compare case-insensitively unless `options.strict` is set; every
/// other value compares by JSON equality. An empty `fields` matches everything.
#[must_use]
pub fn matches_fields(record: &Record, fields: &Record, options: FilterOptions) -> bool {
    fields.iter().all(|(key, want)| match record.get(key) {
        Some(have) => values_match(have, want, options.strict),
        None => false,
    })
}

fn values_match(have: &Value, want: &Value, strict: bool) -> bool {
    match (have, want) {
        (Value::String(a), Value::String(b)) if !strict => a.to_lowercase() == b.to_lowercase(),
        _ => have == want,
    }
}

/// A partial update for [`Store::edit`](crate::Store::edit).
///
/// Keys not mentioned are left alone. The `_id` field is never touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<(String, Option<Value>)>,
}

impl Patch {
    /// Empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push((key.into(), Some(value.into())));
        self
    }

    /// Remove `key` from the record.
    #[must_use]
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.ops.push((key.into(), None));
        self
    }

    /// Patch that sets every field of `fields`, which must serialize to a
    /// JSON object.
    pub fn from_fields<T: Serialize>(fields: T) -> Result<Self> {
        Ok(to_record(fields, "patch")?.into())
    }

    /// `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply in order: later operations on the same key win.
    pub fn apply(&self, record: &mut Record) {
        for (key, op) in &self.ops {
            if key == ID_FIELD {
                continue;
            }
            match op {
                Some(value) => {
                    record.insert(key.clone(), value.clone());
                }
                None => {
                    record.shift_remove(key);
                }
            }
        }
    }

    /// The record a patch produces when applied to nothing.
    #[must_use]
    pub fn to_new_record(&self) -> Record {
        let mut record = Record::new();
        self.apply(&mut record);
        record
    }
}

impl From<Record> for Patch {
    fn from(fields: Record) -> Self {
        Self {
            ops: fields.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }
}
