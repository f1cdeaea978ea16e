//! Lower mutations on typed entity views to mutations on `state`.

use lix_core::{LixError, Result};

use crate::ast::{col, func, lit, null, Delete, Expr, Insert, Literal, Statement, Update};
use crate::catalog::{extract_property, lixcol_target, property_path, EngineState, EntityView, Scope, ViewKind};

use super::map_columns;

fn state_target(scope: Scope) -> &'static str {
    match scope {
        Scope::Active => "state",
        Scope::AllVersions => "state_by_version",
    }
}

/// JSON value of a property expression. Booleans need an explicit JSON
/// literal or SQLite stores them as 0/1.
fn json_value(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(Literal::Boolean(b)) => func("json", vec![lit(if b { "true" } else { "false" })]),
        other => other,
    }
}

fn not_writable(column: &str, view: &str) -> LixError {
    LixError::invalid_argument(format!("column '{column}' is not writable on view '{view}'"))
}

/// Map columns of an entity view onto the columns of `state`.
fn state_columns(expr: Expr, view: &EntityView, view_name: &str) -> Result<Expr> {
    map_columns(expr, &mut |table, name| {
        if table.as_deref().is_some_and(|t| t != view_name) {
            return Ok(Expr::Column { table, name });
        }
        if view.has_property(&name) {
            return Ok(extract_property(col("snapshot_content"), &name));
        }
        match lixcol_target(&name) {
            Some(target) => Ok(col(target)),
            None => Err(LixError::invalid_argument(format!(
                "unknown column '{name}' on view '{view_name}'"
            ))),
        }
    })
}

fn rewrite_insert(insert: Insert, view: &EntityView, scope: Scope) -> Result<Insert> {
    let mut properties = Vec::new();
    let mut meta = Vec::new();
    for (index, column) in insert.columns.iter().enumerate() {
        if view.has_property(column) {
            properties.push((column.as_str(), index));
            continue;
        }
        match lixcol_target(column) {
            Some(target @ ("file_id" | "plugin_key")) => meta.push((target, index)),
            Some("version_id") if scope == Scope::AllVersions => meta.push(("version_id", index)),
            _ => return Err(not_writable(column, &insert.table)),
        }
    }

    let mut columns = vec!["entity_id", "schema_key", "schema_version", "snapshot_content"];
    columns.extend(meta.iter().map(|(target, _)| *target));

    let mut rows = Vec::with_capacity(insert.rows.len());
    for row in insert.rows {
        if row.len() != insert.columns.len() {
            return Err(LixError::invalid_argument(format!(
                "expected {} values, got {}",
                insert.columns.len(),
                row.len()
            )));
        }

        let mut object_args = Vec::with_capacity(properties.len() * 2);
        for (name, index) in &properties {
            object_args.push(lit(*name));
            object_args.push(json_value(row[*index].clone()));
        }

        // The entity id is derived from the primary key when the row is
        // written.
        let mut values = vec![
            null(),
            lit(view.schema_key.as_str()),
            lit(view.schema_version.as_str()),
            func("json_object", object_args),
        ];
        values.extend(meta.iter().map(|(_, index)| row[*index].clone()));
        rows.push(values);
    }

    Ok(Insert {
        table: state_target(scope).to_string(),
        columns: columns.into_iter().map(str::to_string).collect(),
        rows,
    })
}

fn rewrite_update(update: Update, view: &EntityView, scope: Scope) -> Result<Update> {
    let mut json_args = vec![col("snapshot_content")];
    let mut assignments = Vec::new();

    for (column, value) in update.assignments {
        if view.primary_key.contains(&column) {
            return Err(LixError::invalid_argument(format!(
                "primary key property '{column}' of '{}' cannot be updated",
                update.table
            )));
        }
        let value = state_columns(value, view, &update.table)?;
        if view.has_property(&column) {
            json_args.push(lit(property_path(&column)));
            json_args.push(json_value(value));
            continue;
        }
        match lixcol_target(&column) {
            Some(target @ ("plugin_key" | "schema_version")) => assignments.push((target.to_string(), value)),
            _ => return Err(not_writable(&column, &update.table)),
        }
    }

    if json_args.len() > 1 {
        assignments.insert(0, ("snapshot_content".to_string(), func("json_set", json_args)));
    }
    if assignments.is_empty() {
        return Err(LixError::invalid_argument("UPDATE without assignments"));
    }

    let selection = update
        .selection
        .map(|s| state_columns(s, view, &update.table))
        .transpose()?;
    let mut rewritten = Update::view(state_target(scope)).filter(col("schema_key").eq(lit(view.schema_key.as_str())));
    if let Some(selection) = selection {
        rewritten = rewritten.filter(selection);
    }
    rewritten.assignments = assignments;
    Ok(rewritten)
}

fn rewrite_delete(delete: Delete, view: &EntityView, scope: Scope) -> Result<Delete> {
    let selection = delete
        .selection
        .map(|s| state_columns(s, view, &delete.table))
        .transpose()?;
    let mut rewritten = Delete::from_view(state_target(scope)).filter(col("schema_key").eq(lit(view.schema_key.as_str())));
    if let Some(selection) = selection {
        rewritten = rewritten.filter(selection);
    }
    Ok(rewritten)
}

/// Rewrite INSERT/UPDATE/DELETE on entity views into the equivalent
/// mutation on `state` (or `state_by_version`). Other statements pass
/// through unchanged.
pub fn rewrite_entity_mutations(statement: Statement, state: &EngineState) -> Result<Statement> {
    let Some(target) = statement.target() else {
        return Ok(statement);
    };

    let catalog = state.catalog.clone();
    let (view, scope) = match catalog.resolve(target) {
        Some(ViewKind::Entity(view, scope)) => (view, scope),
        Some(ViewKind::EntityHistory(_)) => {
            return Err(LixError::ReadOnlyView { name: target.to_string() });
        }
        _ => return Ok(statement),
    };

    Ok(match statement {
        Statement::Insert(insert) => Statement::Insert(rewrite_insert(insert, view, scope)?),
        Statement::Update(update) => Statement::Update(rewrite_update(update, view, scope)?),
        Statement::Delete(delete) => Statement::Delete(rewrite_delete(delete, view, scope)?),
        select @ Statement::Select(_) => select,
    })
}
