//! SQLite-backed relational store
//!
//! One `RelationalStore` owns one connection. Writes are batched into a
//! single transaction per call, using one prepared statement that is rebound
//! for every row.
//!
//! # Failure policy
//!
//! - Prepare, bind and arity errors abort the batch. The transaction is
//!   dropped without commit, which rolls it back.
//! - A failed step (constraint violation, duplicate key) only loses that row.
//!   It is logged, reported as `RowOutcome::Skipped`, and the rest of the
//!   batch still commits.
//!
//! Statements and transactions are RAII guards, so every early return
//! finalizes the statement and rolls back the open transaction.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::schema::{self, index_name, quote, validate_identifier, TableSchema, KEY_COLUMN};
use crate::db::types::{BatchReport, Matrix, Row, Value};
use crate::error::{RowOutcome, StoreError, StoreResult};

/// Location designator for the in-memory store
pub const IN_MEMORY: &str = ":memory:";

/// Where a store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// SQLite file on disk
    Path(PathBuf),

    /// Ephemeral store, discarded when the connection closes
    InMemory,
}

impl StoreLocation {
    /// Parse a location string; `:memory:` selects the in-memory store
    pub fn parse(location: &str) -> Self {
        if location == IN_MEMORY {
            StoreLocation::InMemory
        } else {
            StoreLocation::Path(PathBuf::from(location))
        }
    }
}

impl From<&Path> for StoreLocation {
    fn from(path: &Path) -> Self {
        StoreLocation::Path(path.to_path_buf())
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Path(p) => write!(f, "{}", p.display()),
            StoreLocation::InMemory => f.write_str(IN_MEMORY),
        }
    }
}

/// Pragmas applied to file-backed stores
const WRITE_PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
"#;

/// A single-connection relational store
#[derive(Debug)]
pub struct RelationalStore {
    conn: Connection,
    location: StoreLocation,
}

impl RelationalStore {
    /// Open or create a store
    pub fn open(location: StoreLocation) -> StoreResult<Self> {
        let opened = match &location {
            StoreLocation::Path(path) => Connection::open(path),
            StoreLocation::InMemory => Connection::open_in_memory(),
        };
        let conn = opened.map_err(|source| StoreError::Open {
            location: location.to_string(),
            source,
        })?;

        if let StoreLocation::Path(_) = location {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn.execute_batch(WRITE_PRAGMAS)?;
            debug!(journal_mode = %mode, "Store pragmas applied");
        }

        info!(location = %location, "Store opened");
        Ok(Self { conn, location })
    }

    /// Open an ephemeral in-memory store
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(StoreLocation::InMemory)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Check whether a table exists
    pub fn table_exists(&self, name: &str) -> StoreResult<bool> {
        self.master_entry_exists("table", name)
    }

    /// Check whether an index exists
    pub fn index_exists(&self, name: &str) -> StoreResult<bool> {
        self.master_entry_exists("index", name)
    }

    fn master_entry_exists(&self, kind: &str, name: &str) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
            [kind, name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create a table with the implicit key column prepended
    pub fn create_table(&mut self, schema: &TableSchema) -> StoreResult<()> {
        schema.validate()?;
        if self.table_exists(&schema.name)? {
            return Err(StoreError::Schema {
                name: schema.name.clone(),
                reason: "table already exists".into(),
            });
        }

        self.conn.execute(&schema.create_sql(), [])?;
        info!(table = %schema.name, columns = schema.arity(), "Table created");
        Ok(())
    }

    /// Create a secondary index on `table(column)`
    ///
    /// Creating the same index twice is a schema error.
    pub fn create_index(&mut self, table: &str, column: &str) -> StoreResult<()> {
        validate_identifier(table)?;
        validate_identifier(column)?;

        let columns = self.value_columns(table)?;
        if !columns.iter().any(|c| c == column) && column != KEY_COLUMN {
            return Err(StoreError::Schema {
                name: table.to_string(),
                reason: format!("no column named '{}'", column),
            });
        }

        let name = index_name(table, column);
        if self.index_exists(&name)? {
            return Err(StoreError::Schema {
                name,
                reason: "index already exists".into(),
            });
        }

        self.conn
            .execute(
                &format!(
                    "CREATE INDEX {} ON {}({})",
                    quote(&name),
                    quote(table),
                    quote(column)
                ),
                [],
            )?;
        debug!(table = %table, column = %column, "Index created");
        Ok(())
    }

    /// Create the hits and trigger tables written by the ingest workers
    pub fn create_result_tables(&mut self, hits: &str, trig: &str) -> StoreResult<()> {
        self.create_table(&schema::hits_table(hits))?;
        self.create_index(hits, "evt_id")?;
        self.create_table(&schema::trig_table(trig))?;
        Ok(())
    }

    /// Declared value columns of a table, in order, without the key column
    pub fn value_columns(&self, table: &str) -> StoreResult<Vec<String>> {
        validate_identifier(table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        if names.is_empty() {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        Ok(names.into_iter().filter(|n| n != KEY_COLUMN).collect())
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &str) -> StoreResult<usize> {
        validate_identifier(table)?;
        if !self.table_exists(table)? {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)), [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Insert a batch of rows in one transaction
    ///
    /// Keys continue from the table's current maximum and are only consumed
    /// by rows that were stored, so the key column stays gap-free.
    pub fn insert_rows(&mut self, table: &str, rows: &[Row]) -> StoreResult<BatchReport> {
        let columns = self.value_columns(table)?;
        let mut report = BatchReport::new(table, rows.len());
        if rows.is_empty() {
            return Ok(report);
        }

        let placeholders = (1..=columns.len() + 1)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES ({})",
            quote(table),
            quote(KEY_COLUMN),
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            placeholders
        );

        let tx = self.conn.transaction()?;
        {
            let mut next_key: i64 = tx.query_row(
                &format!(
                    "SELECT COALESCE(MAX({}) + 1, 0) FROM {}",
                    quote(KEY_COLUMN),
                    quote(table)
                ),
                [],
                |row| row.get(0),
            )?;
            let mut stmt = tx.prepare(&sql)?;

            for (i, row) in rows.iter().enumerate() {
                if row.len() != columns.len() {
                    return Err(StoreError::Arity {
                        table: table.to_string(),
                        row: i,
                        expected: columns.len(),
                        found: row.len(),
                    });
                }

                let bind_err = |source: rusqlite::Error| StoreError::Bind {
                    table: table.to_string(),
                    row: i,
                    source,
                };
                stmt.raw_bind_parameter(1, next_key).map_err(bind_err)?;
                for (j, value) in row.iter().enumerate() {
                    stmt.raw_bind_parameter(j + 2, *value).map_err(bind_err)?;
                }

                match stmt.raw_execute() {
                    Ok(_) => {
                        next_key += 1;
                        report.outcomes.push(RowOutcome::Applied);
                    }
                    Err(e) => {
                        warn!(table = %table, row = i, error = %e, "Insertion failed, row skipped");
                        report.outcomes.push(RowOutcome::Skipped {
                            row: i,
                            reason: e.to_string(),
                        });
                    }
                }
                stmt.clear_bindings();
            }
        }
        tx.commit()?;

        debug!(
            table = %table,
            rows = report.applied(),
            skipped = report.skipped(),
            "Batch committed"
        );
        Ok(report)
    }

    /// Update rows by key in one transaction
    ///
    /// Each update is `(key, values)`, where `values` line up with `columns`.
    /// An update whose key matches no row is reported as skipped.
    pub fn update_rows(
        &mut self,
        table: &str,
        key_column: &str,
        columns: &[&str],
        updates: &[(Value, Row)],
    ) -> StoreResult<BatchReport> {
        let known = self.value_columns(table)?;
        for name in columns.iter().copied().chain(std::iter::once(key_column)) {
            validate_identifier(name)?;
            if name != KEY_COLUMN && !known.iter().any(|c| c == name) {
                return Err(StoreError::Schema {
                    name: table.to_string(),
                    reason: format!("no column named '{}'", name),
                });
            }
        }
        if columns.is_empty() {
            return Err(StoreError::Schema {
                name: table.to_string(),
                reason: "update sets no columns".into(),
            });
        }

        let mut report = BatchReport::new(table, updates.len());
        if updates.is_empty() {
            return Ok(report);
        }

        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote(c), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote(table),
            assignments,
            quote(key_column),
            columns.len() + 1
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;

            for (i, (key, row)) in updates.iter().enumerate() {
                if row.len() != columns.len() {
                    return Err(StoreError::Arity {
                        table: table.to_string(),
                        row: i,
                        expected: columns.len(),
                        found: row.len(),
                    });
                }

                let bind_err = |source: rusqlite::Error| StoreError::Bind {
                    table: table.to_string(),
                    row: i,
                    source,
                };
                for (j, value) in row.iter().enumerate() {
                    stmt.raw_bind_parameter(j + 1, *value).map_err(bind_err)?;
                }
                stmt.raw_bind_parameter(columns.len() + 1, *key)
                    .map_err(bind_err)?;

                match stmt.raw_execute() {
                    Ok(0) => {
                        debug!(table = %table, row = i, "Update matched no row");
                        report.outcomes.push(RowOutcome::Skipped {
                            row: i,
                            reason: "no row with that key".into(),
                        });
                    }
                    Ok(_) => report.outcomes.push(RowOutcome::Applied),
                    Err(e) => {
                        warn!(table = %table, row = i, error = %e, "Update failed, row skipped");
                        report.outcomes.push(RowOutcome::Skipped {
                            row: i,
                            reason: e.to_string(),
                        });
                    }
                }
                stmt.clear_bindings();
            }
        }
        tx.commit()?;

        debug!(
            table = %table,
            rows = report.applied(),
            skipped = report.skipped(),
            "Update batch committed"
        );
        Ok(report)
    }

    /// Read a whole table into a matrix, one row per key
    ///
    /// Each row lands at the offset given by its key, so keys must be
    /// `0..row_count`. The key column itself is not part of the result.
    pub fn read_table(&self, name: &str) -> StoreResult<Matrix> {
        let rows = self.row_count(name)?;

        let mut stmt = self.conn.prepare(&format!("SELECT * FROM {}", quote(name)))?;
        let total_cols = stmt.column_count();
        let cols = total_cols.saturating_sub(1);
        let mut matrix = Matrix::zeros(rows, cols);

        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let key: i64 = row.get(0)?;
            let offset = usize::try_from(key)
                .ok()
                .filter(|k| *k < rows)
                .ok_or_else(|| StoreError::KeyOutOfRange {
                    table: name.to_string(),
                    key,
                    rows,
                })?;

            for j in 1..total_cols {
                let value = match row.get_ref(j)? {
                    ValueRef::Integer(i) => i as f64,
                    ValueRef::Real(f) => f,
                    ValueRef::Null => f64::NAN,
                    ValueRef::Text(_) | ValueRef::Blob(_) => {
                        return Err(StoreError::NonNumeric {
                            table: name.to_string(),
                            column: j - 1,
                        });
                    }
                };
                matrix.set(offset, j - 1, value);
            }
        }

        Ok(matrix)
    }

    /// Refresh planner statistics after a bulk load
    pub fn optimize_for_reads(&self) -> StoreResult<()> {
        self.conn.execute("ANALYZE", [])?;
        Ok(())
    }
}
