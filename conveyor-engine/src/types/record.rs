use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of data moved from a source to a destination.
///
/// The `id` identifies the record within the source system and is carried into
/// per-record error reports; `fields` is the payload the transformation
/// operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub fields: serde_json::Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: serde_json::Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}
