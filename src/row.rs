//! Row records and row construction.

use crate::error::{Error, Result};
use crate::value::Value;

/// A materialized row: an ordered name-indexed record.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Build a row from ordered `(name, value)` pairs.
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Look up a value by column name.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.iter().map(|(_, v)| v)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Builds a [`Row`] from parsed column values.
///
/// The default implementation is a 1:1 record; custom factories may rename,
/// reorder or derive fields.
pub trait RowFactory {
    /// Assemble a row from ordered `(name, value)` pairs.
    fn build(&self, columns: Vec<(String, Value)>) -> Row;
}

/// Default row factory: the record mirrors the result columns exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicRowFactory;

impl RowFactory for BasicRowFactory {
    fn build(&self, columns: Vec<(String, Value)>) -> Row {
        Row::new(columns)
    }
}
