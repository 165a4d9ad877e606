use std::collections::HashMap;
use std::fmt;

use crate::decode::{decode, Value};
use crate::error::{ClientError, Result};
use crate::result::Columns;

/// Anything that can address a column in a [`Row`]: an index or a name.
pub trait ColumnKey {
    fn resolve(&self, columns: &Columns) -> Option<usize>;
    fn describe(&self) -> String;
}

impl ColumnKey for usize {
    fn resolve(&self, columns: &Columns) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("#{self}")
    }
}

impl ColumnKey for &str {
    fn resolve(&self, columns: &Columns) -> Option<usize> {
        columns.index_of(self)
    }

    fn describe(&self) -> String {
        (*self).to_string()
    }
}

impl ColumnKey for String {
    fn resolve(&self, columns: &Columns) -> Option<usize> {
        columns.index_of(self)
    }

    fn describe(&self) -> String {
        self.clone()
    }
}

/// Read-only view of one raw row. Cells are decoded on every access.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    columns: &'a Columns,
    cells: &'a [Option<String>],
}

impl<'a> Row<'a> {
    pub fn new(columns: &'a Columns, cells: &'a [Option<String>]) -> Self {
        Self { columns, cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Decoded value of a column, looked up by index or case-insensitive name.
    pub fn get<K: ColumnKey>(&self, key: K) -> Result<Value> {
        let index = key
            .resolve(self.columns)
            .ok_or_else(|| ClientError::UnknownColumn(key.describe()))?;
        let column = self
            .columns
            .get(index)
            .ok_or_else(|| ClientError::UnknownColumn(key.describe()))?;
        let raw = self.cells.get(index).and_then(|c| c.as_deref());
        decode(raw, column)
    }

    /// Undecoded wire text of a cell; `None` for SQL NULL or unknown columns.
    pub fn raw<K: ColumnKey>(&self, key: K) -> Option<&'a str> {
        let index = key.resolve(self.columns)?;
        self.cells.get(index)?.as_deref()
    }

    /// Every cell decoded, keyed by lower-cased column name.
    pub fn to_map(&self) -> Result<HashMap<String, Value>> {
        self.columns
            .names()
            .map(|(name, index)| Ok((name.to_string(), self.get(index)?)))
            .collect()
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (column, cell) in self.columns.iter().zip(self.cells) {
            map.entry(&column.name, &cell.as_deref().unwrap_or("NULL"));
        }
        map.finish()
    }
}
