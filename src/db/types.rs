//! Row values and the dense matrix used for read-back

use rusqlite::types::{self, ToSql, ToSqlOutput};

use crate::error::RowOutcome;

/// A single numeric cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Null,
}

impl Value {
    /// Numeric view of the value; `Null` is NaN
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Integer(i) => *i as f64,
            Value::Real(f) => *f,
            Value::Null => f64::NAN,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(match self {
            Value::Integer(i) => types::Value::Integer(*i),
            Value::Real(f) => types::Value::Real(*f),
            Value::Null => types::Value::Null,
        }))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

/// One row of values, excluding the key column
pub type Row = Vec<Value>;

/// Build a row of reals from a slice
pub fn real_row(values: &[f64]) -> Row {
    values.iter().copied().map(Value::Real).collect()
}

/// Summary of a committed batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Target table
    pub table: String,

    /// Per-row outcomes, in input order
    pub outcomes: Vec<RowOutcome>,
}

impl BatchReport {
    pub(crate) fn new(table: &str, capacity: usize) -> Self {
        Self {
            table: table.to_string(),
            outcomes: Vec::with_capacity(capacity),
        }
    }

    /// Rows written
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    /// Rows rejected by the engine
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.applied()
    }

    /// Rows in the batch
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }
}

/// Dense row-major matrix of `f64`
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Matrix of the given shape filled with zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from nested rows; returns `None` if the rows are ragged
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Option<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return None;
            }
            data.extend_from_slice(row);
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: f64) {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
        }
    }

    /// Borrow one row
    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row < self.rows {
            let start = row * self.cols;
            self.data.get(start..start + self.cols)
        } else {
            None
        }
    }

    /// Iterate over rows
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).filter_map(move |r| self.row(r))
    }

    /// Largest absolute element-wise difference; `None` on shape mismatch
    pub fn max_abs_diff(&self, other: &Matrix) -> Option<f64> {
        if self.rows != other.rows || self.cols != other.cols {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }
}
