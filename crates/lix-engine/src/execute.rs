//! Running preprocessed plans.
//!
//! Reads compile to one SQL query over the physical tables. Writes run each
//! source select first and then write every resulting row as an entity
//! change, so a mutation never observes its own effects.

use serde_json::Value;
use tracing::debug;

use lix_core::{LixError, NewChange, Result};
use lix_query::ast::{Literal, Select, Statement};
use lix_query::{compile_select, preprocess, FileDataScope, LogicalPlan, Plan, WriteKind, WriteOp};
use lix_store::{QueryRows, SqlValue};

use crate::files::FileInput;
use crate::transaction::LixTx;

/// Rows returned by [`crate::Lix::execute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,

    /// Entities or files written; zero for reads.
    pub rows_affected: usize,
}

impl QueryResult {
    fn read(rows: QueryRows) -> Self {
        Self {
            columns: rows.columns,
            rows: rows.rows,
            rows_affected: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of a named column in one row.
    pub fn get(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Rows as JSON objects keyed by column name.
    ///
    /// Blobs are rendered as (lossy) UTF-8 text.
    pub fn to_json(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let object = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.clone(), json_of(value)))
                    .collect();
                Value::Object(object)
            })
            .collect()
    }
}

fn json_of(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(*i),
        SqlValue::Real(r) => Value::from(*r),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Blob(b) => Value::from(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Bind a literal for SQLite. Booleans are stored as 0/1.
pub(crate) fn sql_value(literal: &Literal) -> SqlValue {
    match literal {
        Literal::Null => SqlValue::Null,
        Literal::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Literal::Integer(i) => SqlValue::Integer(*i),
        Literal::Real(r) => SqlValue::Real(*r),
        Literal::Text(s) => SqlValue::Text(s.clone()),
        Literal::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

/// One row of a write source, read by column position.
struct SourceRow<'r> {
    columns: &'r [String],
    values: &'r [SqlValue],
}

impl SourceRow<'_> {
    fn value(&self, column: &str) -> Result<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| LixError::internal(format!("write source has no column '{column}'")))
    }

    fn text(&self, column: &str) -> Result<Option<String>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Integer(i) => Ok(Some(i.to_string())),
            SqlValue::Real(r) => Ok(Some(r.to_string())),
            SqlValue::Blob(_) => Err(LixError::invalid_argument(format!(
                "column '{column}' must be text, got a blob"
            ))),
        }
    }

    fn required_text(&self, column: &str) -> Result<String> {
        self.text(column)?
            .ok_or_else(|| LixError::invalid_argument(format!("column '{column}' must not be NULL")))
    }

    fn json(&self, column: &str) -> Result<Option<Value>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => serde_json::from_str(s).map(Some).map_err(|e| {
                LixError::invalid_argument(format!("column '{column}' is not valid JSON: {e}"))
            }),
            other => Err(LixError::invalid_argument(format!(
                "column '{column}' must be JSON text, got {other:?}"
            ))),
        }
    }

    fn bytes(&self, column: &str) -> Result<Vec<u8>> {
        Ok(match self.value(column)? {
            SqlValue::Null => Vec::new(),
            SqlValue::Blob(b) => b.clone(),
            SqlValue::Text(s) => s.clone().into_bytes(),
            other => {
                return Err(LixError::invalid_argument(format!(
                    "column '{column}' must be a blob, got {other:?}"
                )))
            }
        })
    }
}

impl LixTx<'_> {
    /// Preprocess and run a statement in this transaction.
    pub fn execute(&self, statement: &Statement, params: &[Literal]) -> Result<QueryResult> {
        self.tx.ensure_cache_fresh()?;

        let state = self.engine_state()?;
        let plan = self
            .lix
            .plans
            .get_or_prepare(statement, &state, || preprocess(statement, &state))?;

        self.run(&plan, params).map_err(|e| plan.context(e))
    }

    fn run(&self, plan: &Plan, params: &[Literal]) -> Result<QueryResult> {
        self.materialize_files(plan.file_data)?;

        match &plan.logical {
            LogicalPlan::Read(select) => self.query(select, params).map(QueryResult::read),
            LogicalPlan::Write(op) => self.write(op, params),
        }
    }

    fn query(&self, select: &Select, params: &[Literal]) -> Result<QueryRows> {
        let compiled = compile_select(select, params)?;
        let bound: Vec<SqlValue> = compiled.params.iter().map(sql_value).collect();
        self.tx.query(&compiled.sql, &bound)
    }

    /// Render file bytes a plan is going to read.
    pub(crate) fn materialize_files(&self, scope: FileDataScope) -> Result<()> {
        let versions = match scope {
            FileDataScope::None => return Ok(()),
            FileDataScope::Active => vec![self.active_version_id().to_string()],
            FileDataScope::AllVersions => self.tx.list_versions()?.into_iter().map(|v| v.id).collect(),
        };
        for version_id in versions {
            for descriptor in self.file_descriptors(&version_id)? {
                self.materialize_file(&version_id, &descriptor)?;
            }
        }
        Ok(())
    }

    fn write(&self, op: &WriteOp, params: &[Literal]) -> Result<QueryResult> {
        let mut batches = Vec::with_capacity(op.sources.len());
        for source in &op.sources {
            batches.push(self.query(source, params)?);
        }

        let mut affected = 0;
        for batch in &batches {
            for values in &batch.rows {
                let row = SourceRow {
                    columns: &batch.columns,
                    values,
                };
                match op.kind {
                    WriteKind::Upsert => self.write_upsert(&row)?,
                    WriteKind::Tombstone => self.write_tombstone(&row)?,
                    WriteKind::FileWrite => self.write_file_row(&row)?,
                    WriteKind::FileDelete => {
                        let version_id = row.required_text("version_id")?;
                        self.delete_file_by_id(&version_id, &row.required_text("id")?)?;
                    }
                }
                affected += 1;
            }
        }

        debug!("{:?} on {} wrote {} row(s)", op.kind, op.target, affected);
        Ok(QueryResult {
            rows_affected: affected,
            ..QueryResult::default()
        })
    }

    fn write_upsert(&self, row: &SourceRow<'_>) -> Result<()> {
        let schema_key = row.required_text("schema_key")?;
        let content = row.json("snapshot_content")?.ok_or_else(|| {
            LixError::invalid_argument(format!(
                "snapshot_content of {schema_key} must not be NULL; delete the row instead"
            ))
        })?;
        let schema = self.schema_for(&schema_key, row.text("schema_version")?.as_deref())?;

        let entity_id = match row.text("entity_id")? {
            Some(id) => id,
            None => schema.entity_id(&content)?,
        };
        let version_id = row.required_text("version_id")?;
        self.tx.require_version(&version_id)?;

        self.write_state(
            &version_id,
            NewChange {
                entity_id,
                schema_key,
                schema_version: schema.version,
                file_id: row.required_text("file_id")?,
                plugin_key: row.required_text("plugin_key")?,
                snapshot_content: Some(content),
            },
        )
    }

    fn write_tombstone(&self, row: &SourceRow<'_>) -> Result<()> {
        let schema_key = row.required_text("schema_key")?;
        let schema = self.schema_for(&schema_key, row.text("schema_version")?.as_deref())?;

        self.write_state(
            &row.required_text("version_id")?,
            NewChange {
                entity_id: row.required_text("entity_id")?,
                schema_key,
                schema_version: schema.version,
                file_id: row.required_text("file_id")?,
                plugin_key: row.required_text("plugin_key")?,
                snapshot_content: None,
            },
        )
    }

    fn write_file_row(&self, row: &SourceRow<'_>) -> Result<()> {
        let version_id = row.required_text("version_id")?;
        self.tx.require_version(&version_id)?;
        self.write_file_at(
            &version_id,
            FileInput {
                id: row.text("id")?,
                path: row.required_text("path")?,
                data: row.bytes("data")?,
                metadata: row.json("metadata")?,
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booleans_bind_as_integers() {
        assert_eq!(sql_value(&Literal::Boolean(true)), SqlValue::Integer(1));
        assert_eq!(sql_value(&Literal::Text("a".into())), SqlValue::Text("a".into()));
    }

    #[test]
    fn test_result_to_json() {
        let result = QueryResult {
            columns: vec!["id".into(), "n".into(), "data".into()],
            rows: vec![vec![
                SqlValue::Text("a".into()),
                SqlValue::Integer(2),
                SqlValue::Blob(b"hi".to_vec()),
            ]],
            rows_affected: 0,
        };
        assert_eq!(
            result.to_json(),
            vec![serde_json::json!({"id": "a", "n": 2, "data": "hi"})]
        );
        assert_eq!(result.get(0, "n"), Some(&SqlValue::Integer(2)));
        assert!(result.get(0, "nope").is_none());
    }

    #[test]
    fn test_source_row_json_column() {
        let columns = vec!["snapshot_content".to_string()];
        let values = vec![SqlValue::Text("{\"a\":1}".into())];
        let row = SourceRow {
            columns: &columns,
            values: &values,
        };
        assert_eq!(row.json("snapshot_content").unwrap(), Some(serde_json::json!({"a": 1})));

        let bad = vec![SqlValue::Text("{".into())];
        let row = SourceRow {
            columns: &columns,
            values: &bad,
        };
        assert_eq!(row.json("snapshot_content").unwrap_err().error_code(), "INVALID_ARGUMENT");
    }
}
