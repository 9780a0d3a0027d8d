//! Serialization layer. Defaults to JSON via serde_json.
//!
//! Implement [`Serializer`] if the table should be written differently
//! (sorted keys, a different indent, etc.). The on-disk shape must stay a
//! single JSON object keyed by record identifier.

use crate::error::{Error, Result};
use crate::record::Table;
use serde_json::{Map, Value};

/// Converts a document table to/from bytes for persistence.
pub trait Serializer: Send + Sync {
    /// Encode a table to bytes.
    fn serialize(&self, table: &Table) -> Result<Vec<u8>>;

    /// Decode bytes back into a table.
    fn deserialize(&self, bytes: &[u8]) -> Result<Table>;
}

/// JSON serializer with optional pretty-printing.
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    /// Compact JSON (single line, no extra whitespace).
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretty-printed JSON with indentation. Easier to read by hand.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, table: &Table) -> Result<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(table)
        } else {
            serde_json::to_vec(table)
        };
        bytes.map_err(|e| Error::Serialize(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Table> {
        let docs: Map<String, Value> =
            serde_json::from_slice(bytes).map_err(|e| Error::Format(e.to_string()))?;
        Table::from_map(docs)
    }
}
