use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decode::Value;
use crate::error::{ClientError, Result};
use crate::row::Row;
use crate::wire::{PartitionInfo, RawRow, RowType};

/// Column definition returned with a statement result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name as declared in the result set.
    pub name: String,
    /// Lower-cased service type (e.g. "fixed", "text", "timestamp_ntz").
    pub data_type: String,
    /// Digits after the decimal point; 0 when the service omits it.
    pub scale: i64,
    pub precision: Option<i64>,
}

impl From<&RowType> for Column {
    fn from(row_type: &RowType) -> Self {
        Self {
            name: row_type.name.clone(),
            data_type: row_type.data_type.to_lowercase(),
            scale: row_type.scale.unwrap_or(0),
            precision: row_type.precision,
        }
    }
}

/// Ordered columns plus a case-insensitive name index.
#[derive(Debug, Clone, Default)]
pub struct Columns {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
}

impl Columns {
    pub fn new(columns: Vec<Column>) -> Self {
        let by_name = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_lowercase(), i))
            .collect();
        Self { columns, by_name }
    }

    pub fn from_row_types(row_types: &[RowType]) -> Self {
        Self::new(row_types.iter().map(Column::from).collect())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Zero-based index of a column by name, ignoring case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// `(lower-cased name, index)` pairs; duplicate names keep the last index.
    pub(crate) fn names(&self) -> impl Iterator<Item = (&str, usize)> {
        self.by_name.iter().map(|(name, i)| (name.as_str(), *i))
    }
}

/// Fail unless `rows` holds exactly the declared number of rows.
pub fn check_partition(index: usize, declared: &PartitionInfo, rows: &[RawRow]) -> Result<()> {
    if rows.len() != declared.row_count {
        return Err(ClientError::PartitionMismatch {
            partition: index,
            expected: declared.row_count,
            actual: rows.len(),
        });
    }
    Ok(())
}

/// Pre-sized partition slots, each written exactly once.
#[derive(Debug)]
pub struct ResultBuilder {
    columns: Arc<Columns>,
    declared: Vec<PartitionInfo>,
    slots: Vec<Option<Vec<RawRow>>>,
}

impl ResultBuilder {
    pub fn new(columns: Arc<Columns>, declared: Vec<PartitionInfo>) -> Self {
        let slots = declared.iter().map(|_| None).collect();
        Self {
            columns,
            declared,
            slots,
        }
    }

    pub fn partition_count(&self) -> usize {
        self.slots.len()
    }

    /// Store a partition after checking its row count.
    ///
    /// Writing an index twice, or an index past the declared partition count,
    /// is an error.
    pub fn insert(&mut self, index: usize, rows: Vec<RawRow>) -> Result<()> {
        let declared = self.declared.get(index).ok_or(ClientError::PartitionMismatch {
            partition: index,
            expected: 0,
            actual: rows.len(),
        })?;
        check_partition(index, declared, &rows)?;

        let slot = &mut self.slots[index];
        if slot.is_some() {
            return Err(ClientError::Parse(format!("partition {index} delivered twice")));
        }
        *slot = Some(rows);
        Ok(())
    }

    pub fn finish(self) -> Result<QueryResult> {
        let partitions = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| ClientError::Parse(format!("partition {index} never delivered")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryResult {
            columns: self.columns,
            partitions,
        })
    }
}

/// A fully materialized statement result.
///
/// Partitions are kept in index order regardless of the order they were
/// fetched in; rows decode lazily through [`Row`].
#[derive(Debug, Clone)]
pub struct QueryResult {
    columns: Arc<Columns>,
    partitions: Vec<Vec<RawRow>>,
}

impl QueryResult {
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Raw rows of one partition.
    pub fn partition(&self, index: usize) -> Option<&[RawRow]> {
        self.partitions.get(index).map(Vec::as_slice)
    }

    /// Total rows across all partitions.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows in partition-then-row order.
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.partitions
            .iter()
            .flatten()
            .map(|raw| Row::new(&self.columns, raw))
    }

    pub fn first(&self) -> Option<Row<'_>> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<Row<'_>> {
        self.partitions
            .iter()
            .rev()
            .find_map(|p| p.last())
            .map(|raw| Row::new(&self.columns, raw))
    }

    /// Every row decoded into a map keyed by lower-cased column name.
    pub fn get_all_rows(&self) -> Result<Vec<HashMap<String, Value>>> {
        self.iter().map(|row| row.to_map()).collect()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = Row<'a>;
    type IntoIter = Box<dyn Iterator<Item = Row<'a>> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

const NULL_CELL: &str = "NULL";

/// Width of `text` in characters, which is what `{:<width$}` pads by.
fn text_width(text: &str) -> usize {
    text.chars().count()
}

fn cell_text(cell: &Option<String>) -> &str {
    cell.as_deref().unwrap_or(NULL_CELL)
}

/// Write one table line: `cells` left-aligned to `widths`, joined by `sep`.
fn write_table_line<'c>(
    f: &mut fmt::Formatter<'_>,
    widths: &[usize],
    cells: impl Iterator<Item = &'c str>,
    sep: &str,
) -> fmt::Result {
    for (i, (cell, &width)) in cells.zip(widths).enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{cell:<width$}")?;
    }
    writeln!(f)
}

/// Aligned text table of the raw wire values, followed by a row and partition count.
impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "(empty result set)");
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| text_width(&c.name)).collect();
        for row in self.partitions.iter().flatten() {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(text_width(cell_text(cell)));
            }
        }

        write_table_line(f, &widths, self.columns.iter().map(|c| c.name.as_str()), " | ")?;
        let rules: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        write_table_line(f, &widths, rules.iter().map(String::as_str), "-+-")?;
        for row in self.partitions.iter().flatten() {
            write_table_line(f, &widths, row.iter().map(cell_text), " | ")?;
        }

        write!(f, "\n{} rows | {} partitions", self.len(), self.partitions.len())
    }
}
