//! Typed table definitions
//!
//! Callers describe tables as ordered lists of typed columns; the store turns
//! them into SQLite statements. Names are checked up front so they can be
//! spliced into SQL text safely.

use crate::error::{StoreError, StoreResult};

/// Name of the implicit key column prepended to every table
pub const KEY_COLUMN: &str = "idx";

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
}

impl ColumnType {
    fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// Optional column constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Constraint {
    #[default]
    None,
    Unique,
    PrimaryKey,
    NotNull,
}

impl Constraint {
    fn as_sql(&self) -> &'static str {
        match self {
            Constraint::None => "",
            Constraint::Unique => " UNIQUE",
            Constraint::PrimaryKey => " PRIMARY KEY",
            Constraint::NotNull => " NOT NULL",
        }
    }
}

/// A single column definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub constraint: Constraint,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            constraint: Constraint::None,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn real(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Real)
    }

    /// Attach a constraint to this column
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    fn to_sql(&self) -> String {
        format!("{} {}{}", quote(&self.name), self.ty.as_sql(), self.constraint.as_sql())
    }
}

/// A table definition: name plus ordered columns (key column excluded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Number of value columns (what each inserted row must supply)
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Check table and column names
    pub fn validate(&self) -> StoreResult<()> {
        validate_identifier(&self.name)?;
        if self.columns.is_empty() {
            return Err(StoreError::Schema {
                name: self.name.clone(),
                reason: "table needs at least one column".into(),
            });
        }
        for col in &self.columns {
            validate_identifier(&col.name)?;
            if col.name.eq_ignore_ascii_case(KEY_COLUMN) {
                return Err(StoreError::Schema {
                    name: self.name.clone(),
                    reason: format!("column name '{}' is reserved", KEY_COLUMN),
                });
            }
        }
        Ok(())
    }

    /// CREATE TABLE statement with the key column prepended
    pub(crate) fn create_sql(&self) -> String {
        let mut cols = vec![format!("{} INTEGER NOT NULL UNIQUE", quote(KEY_COLUMN))];
        cols.extend(self.columns.iter().map(Column::to_sql));
        format!("CREATE TABLE {} ({})", quote(&self.name), cols.join(", "))
    }
}

/// Check that a name is a plain SQL identifier
pub fn validate_identifier(name: &str) -> StoreResult<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote a validated identifier so keywords like `order` can be used as names
pub(crate) fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Name of the secondary index on `table(column)`
pub(crate) fn index_name(table: &str, column: &str) -> String {
    format!("idx_{}_{}", table, column)
}

/// Hit table written by the ingest workers: one row per hit pad
pub fn hits_table(name: &str) -> TableSchema {
    TableSchema::new(name)
        .column(Column::integer("evt_id"))
        .column(Column::integer("cobo"))
        .column(Column::integer("pad"))
        .column(Column::integer("tb"))
        .column(Column::integer("num_elec"))
}

/// Trigger table: one row per event
pub fn trig_table(name: &str) -> TableSchema {
    TableSchema::new(name)
        .column(Column::integer("evt_id").with_constraint(Constraint::PrimaryKey))
        .column(Column::integer("trig"))
}

/// Parameter table: one row per simulated input
pub fn params_table(name: &str, columns: &[&str]) -> TableSchema {
    columns
        .iter()
        .fold(TableSchema::new(name), |schema, col| schema.column(Column::real(*col)))
}
