//! Flat tabular results.
//!
//! Extractors turn remote entities into rows; everything downstream (the
//! batch runner, the cache, the report writer) only needs to count rows and
//! glue tables together in order. [`Table`] is the concrete row container and
//! [`Tabular`] is the minimal interface the batch runner aggregates over.

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Anything the batch runner can concatenate.
///
/// `append` must preserve order: the rows of `other` follow the rows already
/// in `self`.
pub trait Tabular: Default {
    /// Number of rows.
    fn len(&self) -> usize;

    /// Returns `true` if there are no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move all rows of `other` to the end of `self`.
    fn append(&mut self, other: Self);
}

impl<T> Tabular for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn append(&mut self, mut other: Self) {
        Vec::append(self, &mut other);
    }
}

/// A column-named table of JSON values.
///
/// Every row has exactly one cell per column. Appending a table with
/// different columns takes the union: new columns are added at the end and
/// rows that never had them hold `null`. Deserializing a table whose rows
/// don't match its columns fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// A deserialized row doesn't have one cell per column.
#[derive(Debug, Display, Error)]
#[display("row {row} has {cells} cells but the table has {columns} columns")]
pub struct RaggedRow {
    pub row: usize,
    pub cells: usize,
    pub columns: usize,
}

impl TryFrom<RawTable> for Table {
    type Error = RaggedRow;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let columns = raw.columns.len();
        if let Some((row, cells)) = raw.rows.iter().map(Vec::len).enumerate().find(|&(_, cells)| cells != columns) {
            return Err(RaggedRow { row, cells, columns });
        }
        Ok(Self { columns: raw.columns, rows: raw.rows })
    }
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add a row. Short rows are padded with `null`; extra cells are dropped.
    pub fn push_row(&mut self, row: impl IntoIterator<Item = Value>) {
        let mut row: Vec<Value> = row.into_iter().take(self.columns.len()).collect();
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Builder-style [`push_row()`](Self::push_row).
    pub fn with_row(mut self, row: impl IntoIterator<Item = Value>) -> Self {
        self.push_row(row);
        self
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(move |row| row.get(index).unwrap_or(&Value::Null)))
    }

    /// Append the rows of `other`, taking the union of both column sets.
    pub fn append(&mut self, other: Table) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|column| match self.columns.iter().position(|c| c == column) {
                Some(index) => index,
                None => {
                    self.columns.push(column.clone());
                    self.columns.len() - 1
                },
            })
            .collect();
        let width = self.columns.len();
        for row in &mut self.rows {
            row.resize(width, Value::Null);
        }
        for row in other.rows {
            let mut aligned = vec![Value::Null; width];
            for (cell, &index) in row.into_iter().zip(&mapping) {
                aligned[index] = cell;
            }
            self.rows.push(aligned);
        }
    }

    /// Concatenate tables in order.
    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Table {
        tables.into_iter().fold(Table::default(), |mut acc, t| {
            acc.append(t);
            acc
        })
    }
}

impl Tabular for Table {
    fn len(&self) -> usize {
        Table::len(self)
    }

    fn append(&mut self, other: Self) {
        Table::append(self, other);
    }
}
