//! Preprocessing passes over the operation tree.

mod entity;
mod expand;
mod functions;
mod instead_of;

pub use entity::rewrite_entity_mutations;
pub use expand::{expand_views, FileDataScope};
pub use functions::{validate_functions, ENGINE_FUNCTIONS};
pub use instead_of::{instead_of, LogicalPlan, WriteKind, WriteOp, FILE_COLUMNS, UPSERT_COLUMNS};

use lix_core::Result;

use crate::ast::{Expr, Select, SelectItem, Statement, TableRef};

/// Visit every expression of a select, including nested subqueries.
pub(crate) fn visit_select(select: &Select, f: &mut dyn FnMut(&Expr) -> Result<()>) -> Result<()> {
    for item in &select.projection {
        if let SelectItem::Expr { expr, .. } = item {
            visit_expr(expr, f)?;
        }
    }
    if let Some(from) = &select.from {
        visit_table(from, f)?;
    }
    for join in &select.joins {
        visit_table(&join.table, f)?;
        visit_expr(&join.on, f)?;
    }
    if let Some(selection) = &select.selection {
        visit_expr(selection, f)?;
    }
    for expr in &select.group_by {
        visit_expr(expr, f)?;
    }
    for order in &select.order_by {
        visit_expr(&order.expr, f)?;
    }
    Ok(())
}

fn visit_table(table: &TableRef, f: &mut dyn FnMut(&Expr) -> Result<()>) -> Result<()> {
    match table {
        TableRef::Derived { subquery, .. } => visit_select(subquery, f),
        _ => Ok(()),
    }
}

pub(crate) fn visit_expr(expr: &Expr, f: &mut dyn FnMut(&Expr) -> Result<()>) -> Result<()> {
    f(expr)?;
    match expr {
        Expr::Column { .. } | Expr::Literal(_) | Expr::Param(_) | Expr::Wildcard => Ok(()),
        Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => visit_expr(expr, f),
        Expr::Binary { left, right, .. } => {
            visit_expr(left, f)?;
            visit_expr(right, f)
        }
        Expr::InList { expr, list, .. } => {
            visit_expr(expr, f)?;
            list.iter().try_for_each(|e| visit_expr(e, &mut *f))
        }
        Expr::InSubquery { expr, subquery, .. } => {
            visit_expr(expr, f)?;
            visit_select(subquery, f)
        }
        Expr::Like { expr, pattern, .. } => {
            visit_expr(expr, f)?;
            visit_expr(pattern, f)
        }
        Expr::Function { args, .. } => args.iter().try_for_each(|e| visit_expr(e, &mut *f)),
    }
}

/// Visit every expression of a statement.
pub(crate) fn visit_statement(statement: &Statement, f: &mut dyn FnMut(&Expr) -> Result<()>) -> Result<()> {
    match statement {
        Statement::Select(select) => visit_select(select, f),
        Statement::Insert(insert) => insert
            .rows
            .iter()
            .flatten()
            .try_for_each(|e| visit_expr(e, &mut *f)),
        Statement::Update(update) => {
            for (_, value) in &update.assignments {
                visit_expr(value, f)?;
            }
            match &update.selection {
                Some(selection) => visit_expr(selection, f),
                None => Ok(()),
            }
        }
        Statement::Delete(delete) => match &delete.selection {
            Some(selection) => visit_expr(selection, f),
            None => Ok(()),
        },
    }
}

/// Replace column references in an expression. Subqueries are separate
/// scopes and are left untouched.
pub(crate) fn map_columns(
    expr: Expr,
    f: &mut dyn FnMut(Option<String>, String) -> Result<Expr>,
) -> Result<Expr> {
    Ok(match expr {
        Expr::Column { table, name } => f(table, name)?,
        Expr::Unary { op, expr } => Expr::Unary {
            op,
            expr: boxed(expr, &mut *f)?,
        },
        Expr::Binary { left, op, right } => Expr::Binary {
            left: boxed(left, &mut *f)?,
            op,
            right: boxed(right, &mut *f)?,
        },
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: boxed(expr, &mut *f)?,
            negated,
        },
        Expr::InList { expr, list, negated } => Expr::InList {
            expr: boxed(expr, &mut *f)?,
            list: list
                .into_iter()
                .map(|e| map_columns(e, &mut *f))
                .collect::<Result<_>>()?,
            negated,
        },
        Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => Expr::InSubquery {
            expr: boxed(expr, &mut *f)?,
            subquery,
            negated,
        },
        Expr::Like {
            expr,
            pattern,
            negated,
        } => Expr::Like {
            expr: boxed(expr, &mut *f)?,
            pattern: boxed(pattern, &mut *f)?,
            negated,
        },
        Expr::Cast { expr, type_name } => Expr::Cast {
            expr: boxed(expr, &mut *f)?,
            type_name,
        },
        Expr::Function { name, args } => Expr::Function {
            name,
            args: args
                .into_iter()
                .map(|e| map_columns(e, &mut *f))
                .collect::<Result<_>>()?,
        },
        other @ (Expr::Literal(_) | Expr::Param(_) | Expr::Wildcard) => other,
    })
}

fn boxed(expr: Box<Expr>, f: &mut dyn FnMut(Option<String>, String) -> Result<Expr>) -> Result<Box<Expr>> {
    map_columns(*expr, f).map(Box::new)
}
