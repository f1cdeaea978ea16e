//! Compile expanded selects into parameterized SQL.

use lix_core::{LixError, Result};

use crate::ast::{Binding, Literal, Select, SqlWriter};

/// SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Vec<Literal>,
}

/// Compile a select. Literals become bound parameters; `Param(n)` takes
/// the n-th value of `params`.
pub fn compile_select(select: &Select, params: &[Literal]) -> Result<CompiledSql> {
    let mut writer = SqlWriter::collecting(params);
    writer.select(select);

    let SqlWriter { out, binding } = writer;
    match binding {
        Binding::Collect {
            missing: Some(index),
            ..
        } => Err(LixError::invalid_argument(format!(
            "no value supplied for parameter ?{index} ({} given)",
            params.len()
        ))),
        Binding::Collect { bound, .. } => Ok(CompiledSql { sql: out, params: bound }),
        Binding::Inline => Err(LixError::internal("compiler used an inline writer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{col, lit, param, Select};

    #[test]
    fn test_compile_binds_in_order() {
        let select = Select::star_from("t")
            .filter(col("a").eq(lit("x")))
            .filter(col("b").gt(param(1)));
        let compiled = compile_select(&select, &[Literal::Integer(7)]).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM \"t\" WHERE ((\"a\" = ?) AND (\"b\" > ?))"
        );
        assert_eq!(compiled.params, vec![Literal::Text("x".into()), Literal::Integer(7)]);
    }

    #[test]
    fn test_missing_parameter() {
        let select = Select::star_from("t").filter(col("a").eq(param(2)));
        let err = compile_select(&select, &[Literal::Null]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }
}
