// src/task/payload.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handle to a relation materialized by a task (table or view), plus the
/// number of rows it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSet {
    pub relation: String,
    pub rows: u64,
}

impl RowSet {
    pub fn new(relation: impl Into<String>, rows: u64) -> Self {
        Self {
            relation: relation.into(),
            rows,
        }
    }
}

/// Data passed along graph edges and returned from leaves.
///
/// The set of shapes is closed: tasks either hand over a row-set handle, a
/// free-form map, or nothing at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Payload {
    #[default]
    Empty,
    Rows(RowSet),
    Map(Map<String, Value>),
}

impl Payload {
    pub fn rows(relation: impl Into<String>, rows: u64) -> Self {
        Payload::Rows(RowSet::new(relation, rows))
    }

    /// Build a `Map` payload from `(key, value)` pairs.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Payload::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    pub fn as_rows(&self) -> Option<&RowSet> {
        match self {
            Payload::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Payload::Map(map) => Some(map),
            _ => None,
        }
    }
}
