//! Cache table collaborators for the incremental update path.
//!
//! Every implementation stages `delete_assay` / `insert` calls between
//! `begin` and `commit` and applies them as one unit: a reader sees either
//! the table before the unit of work or after it, never in between.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::Delimiters;
use crate::constants::bcp::{COLUMNS, TABLE, TEXT_COLUMNS};
use crate::data::CacheRow;
use crate::errors::CacheError;
use crate::transport::bcp::{format_row, parse_row, row_fields};
use crate::transport::fs::ensure_parent_dir;
use crate::types::{AssayKey, ExpressionKey};

/// Statement-executor collaborator for single-assay updates.
pub trait CacheTable {
    /// Largest persisted `_expression_key`, or `None` for an empty table.
    fn max_expression_key(&self) -> Result<Option<ExpressionKey>, CacheError>;
    /// Open a unit of work.
    fn begin(&mut self) -> Result<(), CacheError>;
    /// Stage deletion of every row of `assay_key`; returns the rows it will remove.
    fn delete_assay(&mut self, assay_key: AssayKey) -> Result<usize, CacheError>;
    /// Stage one insert.
    fn insert(&mut self, row: &CacheRow) -> Result<(), CacheError>;
    /// Apply the staged statements atomically.
    fn commit(&mut self) -> Result<(), CacheError>;
    /// Drop the staged statements.
    fn rollback(&mut self) -> Result<(), CacheError>;
}

/// Statements staged inside one unit of work.
#[derive(Clone, Debug, Default)]
struct PendingChanges {
    deleted_assays: Vec<AssayKey>,
    inserts: Vec<CacheRow>,
}

impl PendingChanges {
    /// Apply to `rows`, rejecting duplicate identifiers.
    fn apply(&self, rows: &[CacheRow]) -> Result<Vec<CacheRow>, CacheError> {
        let mut next: Vec<CacheRow> = rows
            .iter()
            .filter(|row| !self.deleted_assays.contains(&row.record.assay_key))
            .cloned()
            .collect();
        next.extend(self.inserts.iter().cloned());
        let mut seen = HashSet::with_capacity(next.len());
        for row in &next {
            if !seen.insert(row.expression_key) {
                return Err(CacheError::Sink(format!(
                    "duplicate _expression_key {} in {}",
                    row.expression_key, TABLE
                )));
            }
        }
        Ok(next)
    }

    /// Rows of `assay_key` in `rows` not already staged for deletion.
    fn count_deletable(&self, rows: &[CacheRow], assay_key: AssayKey) -> usize {
        if self.deleted_assays.contains(&assay_key) {
            return 0;
        }
        rows.iter()
            .filter(|row| row.record.assay_key == assay_key)
            .count()
    }
}

fn open_unit(pending: &mut Option<PendingChanges>) -> Result<(), CacheError> {
    if pending.is_some() {
        return Err(CacheError::Sink("a unit of work is already open".into()));
    }
    *pending = Some(PendingChanges::default());
    Ok(())
}

fn require_unit(pending: &mut Option<PendingChanges>) -> Result<&mut PendingChanges, CacheError> {
    pending
        .as_mut()
        .ok_or_else(|| CacheError::Sink("no open unit of work".into()))
}

fn max_key(rows: &[CacheRow]) -> Option<ExpressionKey> {
    rows.iter().map(|row| row.expression_key).max()
}

/// Read-only handle onto an `InMemoryCacheTable`'s committed rows.
#[derive(Clone, Default)]
pub struct CacheTableReader {
    rows: Arc<RwLock<Vec<CacheRow>>>,
}

impl CacheTableReader {
    /// Snapshot of every committed row.
    pub fn rows(&self) -> Vec<CacheRow> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }

    /// Snapshot of the committed rows of one assay.
    pub fn rows_for_assay(&self, assay_key: AssayKey) -> Vec<CacheRow> {
        self.rows
            .read()
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.record.assay_key == assay_key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Committed row count.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory cache table shared with concurrent readers.
pub struct InMemoryCacheTable {
    committed: Arc<RwLock<Vec<CacheRow>>>,
    pending: Option<PendingChanges>,
    statement_delay: Option<Duration>,
}

impl fmt::Debug for InMemoryCacheTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCacheTable")
            .field("in_unit_of_work", &self.pending.is_some())
            .field("statement_delay", &self.statement_delay)
            .finish()
    }
}

impl Default for InMemoryCacheTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryCacheTable {
    /// Create a table holding `rows`.
    pub fn new(rows: Vec<CacheRow>) -> Self {
        Self {
            committed: Arc::new(RwLock::new(rows)),
            pending: None,
            statement_delay: None,
        }
    }

    /// Sleep after every staged statement, simulating a slow executor.
    pub fn with_statement_delay(mut self, delay: Duration) -> Self {
        self.statement_delay = Some(delay);
        self
    }

    /// Handle for readers running alongside updates.
    pub fn reader(&self) -> CacheTableReader {
        CacheTableReader {
            rows: Arc::clone(&self.committed),
        }
    }

    fn read_committed(&self) -> Result<Vec<CacheRow>, CacheError> {
        self.committed
            .read()
            .map(|rows| rows.clone())
            .map_err(|_| CacheError::Sink("cache table lock poisoned".into()))
    }

    fn pause(&self) {
        if let Some(delay) = self.statement_delay {
            thread::sleep(delay);
        }
    }
}

impl CacheTable for InMemoryCacheTable {
    fn max_expression_key(&self) -> Result<Option<ExpressionKey>, CacheError> {
        Ok(max_key(&self.read_committed()?))
    }

    fn begin(&mut self) -> Result<(), CacheError> {
        open_unit(&mut self.pending)
    }

    fn delete_assay(&mut self, assay_key: AssayKey) -> Result<usize, CacheError> {
        let committed = self.read_committed()?;
        let pending = require_unit(&mut self.pending)?;
        let count = pending.count_deletable(&committed, assay_key);
        pending.deleted_assays.push(assay_key);
        self.pause();
        Ok(count)
    }

    fn insert(&mut self, row: &CacheRow) -> Result<(), CacheError> {
        require_unit(&mut self.pending)?.inserts.push(row.clone());
        self.pause();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CacheError> {
        let pending = require_unit(&mut self.pending)?.clone();
        let mut guard = self
            .committed
            .write()
            .map_err(|_| CacheError::Sink("cache table lock poisoned".into()))?;
        let next = pending.apply(&guard)?;
        *guard = next;
        drop(guard);
        self.pending = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), CacheError> {
        self.pending = None;
        Ok(())
    }
}

/// Cache table persisted as a BCP file.
///
/// Commit rewrites the whole file through a temporary file in the same
/// directory and renames it into place.
#[derive(Debug)]
pub struct BcpCacheTable {
    path: PathBuf,
    delimiters: Delimiters,
    rows: Vec<CacheRow>,
    pending: Option<PendingChanges>,
}

impl BcpCacheTable {
    /// Open the table file at `path`; a missing file is an empty table.
    pub fn open(path: impl Into<PathBuf>, delimiters: Delimiters) -> Result<Self, CacheError> {
        let path = path.into();
        let rows = if path.exists() {
            read_bcp_file(&path, &delimiters)?
        } else {
            Vec::new()
        };
        debug!(
            "[gxd:store] opened {} with {} rows",
            path.display(),
            rows.len()
        );
        Ok(Self {
            path,
            delimiters,
            rows,
            pending: None,
        })
    }

    /// Committed rows.
    pub fn rows(&self) -> &[CacheRow] {
        &self.rows
    }

    /// Path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, rows: &[CacheRow]) -> Result<(), CacheError> {
        ensure_parent_dir(&self.path)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut staged = NamedTempFile::new_in(&dir)?;
        for row in rows {
            staged.write_all(format_row(row, &self.delimiters).as_bytes())?;
        }
        staged.flush()?;
        staged
            .persist(&self.path)
            .map_err(|err| CacheError::Io(err.error))?;
        Ok(())
    }
}

impl CacheTable for BcpCacheTable {
    fn max_expression_key(&self) -> Result<Option<ExpressionKey>, CacheError> {
        Ok(max_key(&self.rows))
    }

    fn begin(&mut self) -> Result<(), CacheError> {
        open_unit(&mut self.pending)
    }

    fn delete_assay(&mut self, assay_key: AssayKey) -> Result<usize, CacheError> {
        let pending = require_unit(&mut self.pending)?;
        let count = pending.count_deletable(&self.rows, assay_key);
        pending.deleted_assays.push(assay_key);
        Ok(count)
    }

    fn insert(&mut self, row: &CacheRow) -> Result<(), CacheError> {
        require_unit(&mut self.pending)?.inserts.push(row.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CacheError> {
        let next = require_unit(&mut self.pending)?.apply(&self.rows)?;
        self.persist(&next)?;
        self.rows = next;
        self.pending = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), CacheError> {
        self.pending = None;
        Ok(())
    }
}

/// Read every row of a BCP file.
pub fn read_bcp_file(path: &Path, delimiters: &Delimiters) -> Result<Vec<CacheRow>, CacheError> {
    let contents = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (idx, record) in contents.split(delimiters.line.as_str()).enumerate() {
        let record = record.strip_suffix('\r').unwrap_or(record);
        if record.trim().is_empty() {
            continue;
        }
        rows.push(parse_row(record, delimiters, idx + 1)?);
    }
    Ok(rows)
}

/// Renders the unit of work as SQL for an external statement executor.
///
/// Statements are buffered until `commit` and then written as one
/// `begin transaction` / `commit transaction` block. The executor owns the
/// persisted maximum key, so it is supplied up front.
pub struct SqlScriptTable<W: Write> {
    writer: W,
    max_expression_key: Option<ExpressionKey>,
    pending: Option<Vec<String>>,
}

impl<W: Write> SqlScriptTable<W> {
    /// Render into `writer`, numbering after `max_expression_key`.
    pub fn new(writer: W, max_expression_key: Option<ExpressionKey>) -> Self {
        Self {
            writer,
            max_expression_key,
            pending: None,
        }
    }

    /// Return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn statements(&mut self) -> Result<&mut Vec<String>, CacheError> {
        self.pending
            .as_mut()
            .ok_or_else(|| CacheError::Sink("no open unit of work".into()))
    }
}

impl<W: Write> CacheTable for SqlScriptTable<W> {
    fn max_expression_key(&self) -> Result<Option<ExpressionKey>, CacheError> {
        Ok(self.max_expression_key)
    }

    fn begin(&mut self) -> Result<(), CacheError> {
        if self.pending.is_some() {
            return Err(CacheError::Sink("a unit of work is already open".into()));
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    /// The executor reports the real count; the script always returns 0.
    fn delete_assay(&mut self, assay_key: AssayKey) -> Result<usize, CacheError> {
        self.statements()?.push(delete_statement(assay_key));
        Ok(0)
    }

    fn insert(&mut self, row: &CacheRow) -> Result<(), CacheError> {
        let statement = insert_statement(row);
        self.statements()?.push(statement);
        self.max_expression_key = self.max_expression_key.max(Some(row.expression_key));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CacheError> {
        let statements = self
            .pending
            .take()
            .ok_or_else(|| CacheError::Sink("no open unit of work".into()))?;
        writeln!(self.writer, "begin transaction;")?;
        for statement in statements {
            writeln!(self.writer, "{statement};")?;
        }
        writeln!(self.writer, "commit transaction;")?;
        self.writer.flush()?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), CacheError> {
        self.pending = None;
        Ok(())
    }
}

/// `delete` statement removing one assay's cache rows.
pub fn delete_statement(assay_key: AssayKey) -> String {
    format!("delete from {TABLE} where _assay_key = {assay_key}")
}

/// `insert` statement for one cache row; nulls render as `NULL`.
pub fn insert_statement(row: &CacheRow) -> String {
    let values: Vec<String> = row_fields(row)
        .into_iter()
        .zip(COLUMNS)
        .map(|(value, column)| match value {
            None => "NULL".to_string(),
            Some(text) if TEXT_COLUMNS.contains(&column) => quote_sql(&text),
            Some(number) => number,
        })
        .collect();
    format!(
        "insert into {TABLE} ({}) values ({})",
        COLUMNS.join(","),
        values.join(",")
    )
}

fn quote_sql(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
