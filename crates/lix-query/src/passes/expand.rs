//! Replace logical view references with their physical definitions.

use lix_core::{LixError, Result};

use crate::ast::{Expr, Select, SelectItem, TableRef};
use crate::catalog::{
    entity_history_view, entity_view, file_view, state_history_view, state_view, EngineState, Scope, ViewKind,
};

use super::instead_of::LogicalPlan;

/// Which rendered file bytes a query reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileDataScope {
    #[default]
    None,
    Active,
    AllVersions,
}

impl FileDataScope {
    fn include(&mut self, scope: Scope) {
        let needed = match scope {
            Scope::Active => FileDataScope::Active,
            Scope::AllVersions => FileDataScope::AllVersions,
        };
        *self = (*self).max(needed);
    }
}

struct Expander<'s> {
    state: &'s EngineState,
    file_data: FileDataScope,
}

impl Expander<'_> {
    fn definition(&mut self, name: &str) -> Result<Select> {
        let state = self.state;
        let kind = state
            .catalog
            .resolve(name)
            .ok_or_else(|| LixError::UnknownView { name: name.to_string() })?;
        Ok(match kind {
            ViewKind::State(scope) => state_view(scope, state),
            ViewKind::StateHistory => state_history_view(),
            ViewKind::File(scope) => {
                self.file_data.include(scope);
                file_view(scope, state)
            }
            ViewKind::Entity(view, scope) => entity_view(view, scope, state),
            ViewKind::EntityHistory(view) => entity_history_view(view),
        })
    }

    fn table(&mut self, table: TableRef) -> Result<TableRef> {
        Ok(match table {
            TableRef::Named { name, alias } => TableRef::Derived {
                subquery: Box::new(self.definition(&name)?),
                alias: alias.unwrap_or(name),
            },
            TableRef::Derived { subquery, alias } => TableRef::Derived {
                subquery: Box::new(self.select(*subquery)?),
                alias,
            },
            physical @ (TableRef::Physical { .. } | TableRef::Raw { .. }) => physical,
        })
    }

    fn select(&mut self, mut select: Select) -> Result<Select> {
        if let Some(from) = select.from.take() {
            select.from = Some(self.table(from)?);
        }
        let joins = std::mem::take(&mut select.joins);
        for mut join in joins {
            join.table = self.table(join.table)?;
            self.expr(&mut join.on)?;
            select.joins.push(join);
        }
        for item in &mut select.projection {
            if let SelectItem::Expr { expr, .. } = item {
                self.expr(expr)?;
            }
        }
        if let Some(selection) = &mut select.selection {
            self.expr(selection)?;
        }
        for expr in &mut select.group_by {
            self.expr(expr)?;
        }
        for order in &mut select.order_by {
            self.expr(&mut order.expr)?;
        }
        Ok(select)
    }

    /// Expand subqueries nested in an expression.
    fn expr(&mut self, expr: &mut Expr) -> Result<()> {
        match expr {
            Expr::Column { .. } | Expr::Literal(_) | Expr::Param(_) | Expr::Wildcard => Ok(()),
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => self.expr(expr),
            Expr::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::InList { expr, list, .. } => {
                self.expr(expr)?;
                list.iter_mut().try_for_each(|e| self.expr(e))
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.expr(expr)?;
                let inner = std::mem::take(subquery.as_mut());
                **subquery = self.select(inner)?;
                Ok(())
            }
            Expr::Like { expr, pattern, .. } => {
                self.expr(expr)?;
                self.expr(pattern)
            }
            Expr::Function { args, .. } => args.iter_mut().try_for_each(|e| self.expr(e)),
        }
    }
}

/// Expand every view referenced by a plan into physical tables.
///
/// Also reports which file bytes the plan reads, so the caller can render
/// them before executing.
pub fn expand_views(plan: LogicalPlan, state: &EngineState) -> Result<(LogicalPlan, FileDataScope)> {
    let mut expander = Expander {
        state,
        file_data: FileDataScope::None,
    };
    let plan = match plan {
        LogicalPlan::Read(select) => LogicalPlan::Read(expander.select(select)?),
        LogicalPlan::Write(mut op) => {
            op.sources = op
                .sources
                .into_iter()
                .map(|source| expander.select(source))
                .collect::<Result<_>>()?;
            LogicalPlan::Write(op)
        }
    };
    Ok((plan, expander.file_data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, lit};
    use crate::test_support::state;

    #[test]
    fn test_expand_entity_view() {
        let select = Select::star_from("todo").filter(col("done").eq(lit(true)));
        let (plan, file_data) = expand_views(LogicalPlan::Read(select), &state()).unwrap();
        let sql = plan.to_string();
        assert!(sql.contains("FROM (SELECT json_extract("));
        assert!(sql.contains("FROM internal_state_cache o"));
        assert!(sql.contains("WHERE nearer.viewer IS NULL) AS \"s\""));
        assert!(sql.contains(") AS \"todo\""));
        assert_eq!(file_data, FileDataScope::None);
    }

    #[test]
    fn test_expand_subquery_and_file_scope() {
        let files = Select::star_from("file_by_version").columns(["id"]);
        let select = Select::star_from("state").filter(col("file_id").in_subquery(files));
        let (plan, file_data) = expand_views(LogicalPlan::Read(select), &state()).unwrap();
        assert!(!plan.to_string().contains("FROM \"file_by_version\""));
        assert_eq!(file_data, FileDataScope::AllVersions);
    }

    #[test]
    fn test_unknown_view() {
        let err = expand_views(LogicalPlan::Read(Select::star_from("nope")), &state()).unwrap_err();
        assert!(matches!(err, LixError::UnknownView { name } if name == "nope"));
    }
}
