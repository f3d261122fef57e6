use std::fmt;

use fedq_planner::LiteralValue;
use serde::{Deserialize, Serialize};

/// A single cell value.
///
/// Variant order defines the total order used by sorting and grouping: `Null` sorts first,
/// then values compare by type, then by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// SQL NULL, or a document field that is absent.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 64-bit signed integer; counts are always this type.
    Int64(i64),
    /// UTF-8 string.
    Utf8(String),
}

impl ScalarValue {
    /// `true` for [`ScalarValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer payload, if this is an `Int64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int64(_) => "int64",
            Self::Utf8(_) => "utf8",
        }
    }
}

impl From<&LiteralValue> for ScalarValue {
    fn from(v: &LiteralValue) -> Self {
        match v {
            LiteralValue::Int64(i) => Self::Int64(*i),
            LiteralValue::Utf8(s) => Self::Utf8(s.clone()),
            LiteralValue::Boolean(b) => Self::Boolean(*b),
            LiteralValue::Null => Self::Null,
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        Self::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        Self::Utf8(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Utf8(s) => f.write_str(s),
        }
    }
}

/// One result or intermediate row: named cells in a fixed column order.
///
/// Equality is order-sensitive, so two rows compare equal only when they carry the same
/// columns in the same order with the same values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, ScalarValue)>,
}

impl Row {
    /// Empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<ScalarValue>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Append a cell.
    pub fn push(&mut self, column: impl Into<String>, value: ScalarValue) {
        self.cells.push((column.into(), value));
    }

    /// Value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.position(column).map(|i| &self.cells[i].1)
    }

    /// Index of `column` in this row.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.cells.iter().position(|(c, _)| c == column)
    }

    /// Value at index `idx`.
    pub fn value_at(&self, idx: usize) -> Option<&ScalarValue> {
        self.cells.get(idx).map(|(_, v)| v)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    /// Cells in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// `true` when the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Concatenate `self` then `other`.
    pub fn concat(&self, other: &Row) -> Row {
        let mut cells = Vec::with_capacity(self.len() + other.len());
        cells.extend(self.cells.iter().cloned());
        cells.extend(other.cells.iter().cloned());
        Row { cells }
    }

    /// Rename every column to `alias.column`.
    pub fn qualified(self, alias: &str) -> Row {
        Row {
            cells: self
                .cells
                .into_iter()
                .map(|(c, v)| (format!("{alias}.{c}"), v))
                .collect(),
        }
    }

    /// Consume the row into its cells.
    pub fn into_cells(self) -> Vec<(String, ScalarValue)> {
        self.cells
    }
}
