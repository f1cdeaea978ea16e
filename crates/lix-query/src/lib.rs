//! lix-query - Logical query preprocessing for the lix engine
//!
//! Queries are written against logical views (`state`, `file`, one view
//! per registered schema, and their `_by_version` / `_history` variants).
//! Preprocessing runs a fixed pipeline of passes over the operation tree:
//!
//! 1. `validate_functions` rejects calls the engine does not provide
//! 2. `rewrite_entity_mutations` lowers entity-view writes onto `state`
//! 3. `instead_of` turns mutations into write operations
//! 4. `expand_views` replaces views with physical tables
//!
//! Plans are memoized per statement fingerprint, schema generation and
//! active version by [`PlanCache`].
//!
//! # Example
//!
//! ```rust,ignore
//! use lix_query::{ast::*, preprocess, compile_select, LogicalPlan};
//!
//! let select = Select::star_from("todo").filter(col("done").eq(lit(false)));
//! let plan = preprocess(&select.into(), &state)?;
//! if let LogicalPlan::Read(select) = &plan.logical {
//!     let sql = compile_select(select, &[])?;
//! }
//! ```

pub mod ast;
mod catalog;
mod compile;
mod memo;
mod passes;

pub use catalog::{
    extract_property, lixcol_target, property_path, EngineState, EntityView, Scope, ViewCatalog, ViewKind,
    HISTORY_COLUMNS, LIXCOL_COLUMNS, STATE_COLUMNS,
};
pub use compile::{compile_select, CompiledSql};
pub use memo::{fingerprint, PlanCache, PlanCacheStats};
pub use passes::{
    expand_views, instead_of, rewrite_entity_mutations, validate_functions, FileDataScope, LogicalPlan, WriteKind,
    WriteOp, ENGINE_FUNCTIONS, FILE_COLUMNS, UPSERT_COLUMNS,
};

use tracing::trace;

use lix_core::Result;

use crate::ast::Statement;

/// A fully preprocessed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub original_sql: String,
    pub rewritten_sql: String,
    pub expanded_sql: String,
    /// Physical plan; every view reference has been expanded.
    pub logical: LogicalPlan,
    pub file_data: FileDataScope,
}

impl Plan {
    /// Attach this plan's SQL to an error raised while executing it.
    pub fn context(&self, err: lix_core::LixError) -> lix_core::LixError {
        err.with_query_context(
            &self.original_sql,
            Some(self.rewritten_sql.clone()),
            Some(self.expanded_sql.clone()),
        )
    }
}

/// Run every pass over a statement.
///
/// Errors carry the SQL of each stage reached so far.
pub fn preprocess(statement: &Statement, state: &EngineState) -> Result<Plan> {
    let original_sql = statement.to_string();
    let mut reached: Option<String> = None;

    let run = |reached: &mut Option<String>| -> Result<Plan> {
        let validated = validate_functions(statement.clone(), state)?;
        let lowered = rewrite_entity_mutations(validated, state)?;
        let logical = instead_of(lowered, state)?;
        let rewritten_sql = logical.to_string();
        *reached = Some(rewritten_sql.clone());

        let (physical, file_data) = expand_views(logical, state)?;
        let expanded_sql = physical.to_string();
        trace!("Preprocessed {} -> {}", original_sql, expanded_sql);

        Ok(Plan {
            original_sql: original_sql.clone(),
            rewritten_sql,
            expanded_sql,
            logical: physical,
            file_data,
        })
    };

    run(&mut reached).map_err(|e| e.with_query_context(&original_sql, reached, None))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, func, lit, Insert, Select};
    use crate::test_support::state;
    use lix_core::LixError;

    #[test]
    fn test_preprocess_read() {
        let statement: Statement = Select::star_from("todo").filter(col("done").eq(lit(false))).into();
        let plan = preprocess(&statement, &state()).unwrap();

        assert!(plan.original_sql.starts_with("SELECT * FROM \"todo\""));
        assert!(plan.expanded_sql.contains("internal_state_cache"));
        assert!(matches!(plan.logical, LogicalPlan::Read(_)));
        assert_eq!(plan.file_data, FileDataScope::None);
    }

    #[test]
    fn test_preprocess_write() {
        let statement: Statement = Insert::into_view("todo")
            .columns(["id", "title"])
            .values(vec![lit("t1"), lit("Buy milk")])
            .into();
        let plan = preprocess(&statement, &state()).unwrap();
        assert!(plan.rewritten_sql.starts_with("Upsert state <- "));
        let LogicalPlan::Write(op) = &plan.logical else {
            panic!("expected write");
        };
        assert_eq!(op.sources.len(), 1);
    }

    #[test]
    fn test_errors_carry_query_context() {
        let statement: Statement = Select::star_from("todo")
            .filter(func("nope", vec![]).eq(lit(1)))
            .into();
        let err = preprocess(&statement, &state()).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_FUNCTION");
        assert!(matches!(err, LixError::Query { .. }));
        assert!(err.to_string().contains("SELECT * FROM \"todo\""));
        assert!(matches!(&err, LixError::Query { rewritten_sql: None, expanded_sql: None, .. }));
    }

    #[test]
    fn test_expansion_errors_keep_the_rewritten_stage() {
        let statement: Statement = Select::star_from("nope").into();
        let err = preprocess(&statement, &state()).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_VIEW");
        let LixError::Query { rewritten_sql, expanded_sql, .. } = &err else {
            panic!("expected query context, got {err:?}");
        };
        assert!(rewritten_sql.as_deref().is_some_and(|sql| sql.contains("\"nope\"")));
        assert!(expanded_sql.is_none());
        assert!(!err.to_string().contains("expanded:"));
    }
}
