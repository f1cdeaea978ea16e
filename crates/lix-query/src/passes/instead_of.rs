//! Turn mutations on `state` and `file` into write operations the engine
//! executes row by row.
//!
//! Each write carries one or more source selects. A source produces the
//! rows to write, with columns in the fixed order of [`UPSERT_COLUMNS`] or
//! [`FILE_COLUMNS`].

use std::fmt;

use lix_core::{LixError, Result, GLOBAL_FILE_ID, OWN_ENTITY_PLUGIN_KEY};

use crate::ast::{col, func, lit, null, Delete, Expr, Insert, Literal, Select, SelectItem, Statement, TableRef, Update};
use crate::catalog::{EngineState, Scope, ViewKind};

/// Columns of an upsert or tombstone source, in order.
pub const UPSERT_COLUMNS: [&str; 7] = [
    "entity_id",
    "schema_key",
    "file_id",
    "plugin_key",
    "schema_version",
    "snapshot_content",
    "version_id",
];

/// Columns of a file write or delete source, in order.
pub const FILE_COLUMNS: [&str; 5] = ["id", "path", "data", "metadata", "version_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Write each row's snapshot into its version.
    Upsert,
    /// Write a tombstone for each row.
    Tombstone,
    /// Create or replace each file.
    FileWrite,
    /// Delete each file and its entities.
    FileDelete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub kind: WriteKind,
    /// View named by the original statement.
    pub target: String,
    pub sources: Vec<Select>,
}

/// A statement after mutations have been resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    Read(Select),
    Write(WriteOp),
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalPlan::Read(select) => write!(f, "{select}"),
            LogicalPlan::Write(op) => {
                write!(f, "{:?} {} <- ", op.kind, op.target)?;
                for (i, source) in op.sources.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{source}")?;
                }
                Ok(())
            }
        }
    }
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c == name)
}

fn check_row_width(row: &[Expr], columns: &[String]) -> Result<()> {
    if row.len() != columns.len() {
        return Err(LixError::invalid_argument(format!(
            "expected {} values, got {}",
            columns.len(),
            row.len()
        )));
    }
    Ok(())
}

fn reject_unknown(columns: &[String], allowed: &[&str], view: &str) -> Result<()> {
    match columns.iter().find(|c| !allowed.contains(&c.as_str())) {
        Some(column) => Err(LixError::invalid_argument(format!(
            "column '{column}' is not writable on view '{view}'"
        ))),
        None => Ok(()),
    }
}

fn assigned<'a>(assignments: &'a [(String, Expr)], column: &str) -> Option<&'a Expr> {
    assignments.iter().find(|(c, _)| c == column).map(|(_, v)| v)
}

fn writable_upsert_columns(scope: Scope) -> &'static [&'static str] {
    match scope {
        Scope::Active => &UPSERT_COLUMNS[..6],
        Scope::AllVersions => &UPSERT_COLUMNS,
    }
}

fn state_insert(insert: Insert, scope: Scope, state: &EngineState) -> Result<WriteOp> {
    reject_unknown(&insert.columns, writable_upsert_columns(scope), &insert.table)?;
    for required in ["schema_key", "snapshot_content"] {
        if column_index(&insert.columns, required).is_none() {
            return Err(LixError::invalid_argument(format!(
                "INSERT into {} requires column '{required}'",
                insert.table
            )));
        }
    }

    let defaults = |column: &str| match column {
        "file_id" => lit(GLOBAL_FILE_ID),
        "plugin_key" => lit(OWN_ENTITY_PLUGIN_KEY),
        "version_id" => lit(state.active_version_id.as_str()),
        _ => null(),
    };

    let mut sources = Vec::with_capacity(insert.rows.len());
    for row in &insert.rows {
        check_row_width(row, &insert.columns)?;
        let projection = UPSERT_COLUMNS
            .iter()
            .map(|column| {
                let value = column_index(&insert.columns, column)
                    .map(|i| row[i].clone())
                    .unwrap_or_else(|| defaults(*column));
                SelectItem::aliased(value, *column)
            })
            .collect();
        sources.push(Select::values(projection));
    }

    Ok(WriteOp {
        kind: WriteKind::Upsert,
        target: insert.table,
        sources,
    })
}

fn state_update(update: Update) -> Result<WriteOp> {
    let columns: Vec<String> = update.assignments.iter().map(|(c, _)| c.clone()).collect();
    reject_unknown(&columns, &["snapshot_content", "plugin_key", "schema_version"], &update.table)?;

    let projection = UPSERT_COLUMNS
        .iter()
        .map(|column| {
            let value = assigned(&update.assignments, column)
                .cloned()
                .unwrap_or_else(|| col(*column));
            SelectItem::aliased(value, *column)
        })
        .collect();
    let mut source = Select::from_table(TableRef::named(&update.table), projection);
    source.selection = update.selection;

    Ok(WriteOp {
        kind: WriteKind::Upsert,
        target: update.table,
        sources: vec![source],
    })
}

fn state_delete(delete: Delete) -> WriteOp {
    let projection = UPSERT_COLUMNS
        .iter()
        .map(|column| match *column {
            "snapshot_content" => SelectItem::aliased(null(), *column),
            _ => SelectItem::aliased(col(*column), *column),
        })
        .collect();
    let mut source = Select::from_table(TableRef::named(&delete.table), projection);
    source.selection = delete.selection;

    WriteOp {
        kind: WriteKind::Tombstone,
        target: delete.table,
        sources: vec![source],
    }
}

fn file_insert(insert: Insert, scope: Scope, state: &EngineState) -> Result<WriteOp> {
    let allowed: &[&str] = match scope {
        Scope::Active => &["id", "path", "data", "metadata"],
        Scope::AllVersions => &["id", "path", "data", "metadata", "lixcol_version_id"],
    };
    reject_unknown(&insert.columns, allowed, &insert.table)?;
    if column_index(&insert.columns, "path").is_none() {
        return Err(LixError::invalid_argument(format!(
            "INSERT into {} requires column 'path'",
            insert.table
        )));
    }

    let mut sources = Vec::with_capacity(insert.rows.len());
    for row in &insert.rows {
        check_row_width(row, &insert.columns)?;
        let value = |column: &str| column_index(&insert.columns, column).map(|i| row[i].clone());
        let projection = vec![
            SelectItem::aliased(value("id").unwrap_or_else(|| func("lix_ulid", vec![])), "id"),
            SelectItem::aliased(value("path").unwrap_or_else(null), "path"),
            SelectItem::aliased(value("data").unwrap_or_else(|| lit(Literal::Blob(Vec::new()))), "data"),
            SelectItem::aliased(value("metadata").unwrap_or_else(null), "metadata"),
            SelectItem::aliased(
                value("lixcol_version_id").unwrap_or_else(|| lit(state.active_version_id.as_str())),
                "version_id",
            ),
        ];
        sources.push(Select::values(projection));
    }

    Ok(WriteOp {
        kind: WriteKind::FileWrite,
        target: insert.table,
        sources,
    })
}

fn file_update(update: Update) -> Result<WriteOp> {
    let columns: Vec<String> = update.assignments.iter().map(|(c, _)| c.clone()).collect();
    reject_unknown(&columns, &["path", "data", "metadata"], &update.table)?;

    let pick = |column: &str| {
        assigned(&update.assignments, column)
            .cloned()
            .unwrap_or_else(|| col(column))
    };
    let projection = vec![
        SelectItem::aliased(col("id"), "id"),
        SelectItem::aliased(pick("path"), "path"),
        SelectItem::aliased(pick("data"), "data"),
        SelectItem::aliased(pick("metadata"), "metadata"),
        SelectItem::aliased(col("lixcol_version_id"), "version_id"),
    ];
    let mut source = Select::from_table(TableRef::named(&update.table), projection);
    source.selection = update.selection;

    Ok(WriteOp {
        kind: WriteKind::FileWrite,
        target: update.table,
        sources: vec![source],
    })
}

fn file_delete(delete: Delete) -> WriteOp {
    let projection = vec![
        SelectItem::aliased(col("id"), "id"),
        SelectItem::aliased(col("path"), "path"),
        SelectItem::aliased(null(), "data"),
        SelectItem::aliased(null(), "metadata"),
        SelectItem::aliased(col("lixcol_version_id"), "version_id"),
    ];
    let mut source = Select::from_table(TableRef::named(&delete.table), projection);
    source.selection = delete.selection;

    WriteOp {
        kind: WriteKind::FileDelete,
        target: delete.table,
        sources: vec![source],
    }
}

/// Resolve a statement into a read or a write operation. Runs after entity
/// mutations have been lowered onto `state`.
pub fn instead_of(statement: Statement, state: &EngineState) -> Result<LogicalPlan> {
    let statement = match statement {
        Statement::Select(select) => return Ok(LogicalPlan::Read(select)),
        other => other,
    };
    let target = statement.target().unwrap_or_default().to_string();

    let kind = state
        .catalog
        .resolve(&target)
        .ok_or_else(|| LixError::UnknownView { name: target.clone() })?;
    if kind.is_read_only() {
        return Err(LixError::ReadOnlyView { name: target });
    }

    let op = match (kind, statement) {
        (ViewKind::State(scope), Statement::Insert(insert)) => state_insert(insert, scope, state)?,
        (ViewKind::State(_), Statement::Update(update)) => state_update(update)?,
        (ViewKind::State(_), Statement::Delete(delete)) => state_delete(delete),
        (ViewKind::File(scope), Statement::Insert(insert)) => file_insert(insert, scope, state)?,
        (ViewKind::File(_), Statement::Update(update)) => file_update(update)?,
        (ViewKind::File(_), Statement::Delete(delete)) => file_delete(delete),
        _ => {
            return Err(LixError::internal(format!(
                "mutation on '{target}' was not lowered onto state"
            )))
        }
    };
    Ok(LogicalPlan::Write(op))
}
