//! Reject calls to functions the engine does not provide.

use lix_core::{LixError, Result};

use crate::ast::{Expr, Statement};
use crate::catalog::EngineState;

use super::visit_statement;

/// Functions registered on every connection by the engine.
pub const ENGINE_FUNCTIONS: &[&str] = &["lix_ulid", "lix_timestamp", "lix_content_hash"];

const SQLITE_FUNCTIONS: &[&str] = &[
    "abs",
    "avg",
    "char",
    "coalesce",
    "count",
    "date",
    "datetime",
    "glob",
    "group_concat",
    "hex",
    "ifnull",
    "iif",
    "instr",
    "json",
    "json_array",
    "json_array_length",
    "json_extract",
    "json_group_array",
    "json_group_object",
    "json_insert",
    "json_object",
    "json_patch",
    "json_quote",
    "json_remove",
    "json_replace",
    "json_set",
    "json_type",
    "json_valid",
    "julianday",
    "length",
    "like",
    "lower",
    "ltrim",
    "max",
    "min",
    "nullif",
    "printf",
    "quote",
    "random",
    "randomblob",
    "replace",
    "round",
    "rtrim",
    "strftime",
    "substr",
    "substring",
    "sum",
    "time",
    "total",
    "trim",
    "typeof",
    "unicode",
    "unixepoch",
    "upper",
    "zeroblob",
];

fn is_known(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ENGINE_FUNCTIONS.contains(&lower.as_str()) || SQLITE_FUNCTIONS.contains(&lower.as_str())
}

/// Fail with `UnknownFunction` if the statement calls anything outside the
/// engine functions and the SQLite builtins.
pub fn validate_functions(statement: Statement, _state: &EngineState) -> Result<Statement> {
    visit_statement(&statement, &mut |expr| match expr {
        Expr::Function { name, .. } if !is_known(name) => Err(LixError::UnknownFunction { name: name.clone() }),
        _ => Ok(()),
    })?;
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, func, lit, Select, SelectItem};
    use crate::test_support::state;

    #[test]
    fn test_known_functions_pass() {
        let select = Select::values(vec![
            SelectItem::expr(func("lix_ulid", vec![])),
            SelectItem::expr(func("UPPER", vec![lit("x")])),
        ]);
        validate_functions(select.into(), &state()).unwrap();
    }

    #[test]
    fn test_unknown_function_in_subquery_is_rejected() {
        let inner = Select::star_from("state").filter(func("evil", vec![col("entity_id")]).eq(lit(1)));
        let outer = Select::star_from("state").filter(col("entity_id").in_subquery(inner));
        let err = validate_functions(outer.into(), &state()).unwrap_err();
        assert!(matches!(err, LixError::UnknownFunction { name } if name == "evil"));
    }
}
