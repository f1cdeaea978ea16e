//! Query operation tree.
//!
//! Callers build statements with the helpers below; the preprocessor
//! rewrites them and [`crate::compile`] turns the result into SQL. `Display`
//! renders a statement with literals inlined, for diagnostics and
//! fingerprinting.

use std::fmt::{self, Write as _};

/// A constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Text(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Text(v)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Integer(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Integer(v as i64)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Real(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Boolean(v)
    }
}

impl From<Vec<u8>> for Literal {
    fn from(v: Vec<u8>) -> Self {
        Literal::Blob(v)
    }
}

impl<T: Into<Literal>> From<Option<T>> for Literal {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Literal::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Concat,
}

impl BinaryOp {
    fn as_sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Concat => "||",
        }
    }
}

/// Scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Literal),
    /// 1-based positional parameter.
    Param(usize),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Select>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    Cast {
        expr: Box<Expr>,
        type_name: String,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// `*` inside `count(*)`.
    Wildcard,
}

/// Column reference.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column {
        table: None,
        name: name.into(),
    }
}

/// Table-qualified column reference.
pub fn qcol(table: impl Into<String>, name: impl Into<String>) -> Expr {
    Expr::Column {
        table: Some(table.into()),
        name: name.into(),
    }
}

/// Literal value.
pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Literal(value.into())
}

/// SQL NULL.
pub fn null() -> Expr {
    Expr::Literal(Literal::Null)
}

/// Positional parameter (1-based).
pub fn param(index: usize) -> Expr {
    Expr::Param(index)
}

/// Function call.
pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.into(),
        args,
    }
}

/// `count(*)`.
pub fn count_star() -> Expr {
    func("count", vec![Expr::Wildcard])
}

impl Expr {
    fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn concat(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Concat, other)
    }

    pub fn plus(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Plus, other)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, list: Vec<Expr>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn in_subquery(self, subquery: Select) -> Expr {
        Expr::InSubquery {
            expr: Box::new(self),
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn like(self, pattern: Expr) -> Expr {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern),
            negated: false,
        }
    }

    pub fn cast(self, type_name: impl Into<String>) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            type_name: type_name.into(),
        }
    }
}

/// One output column of a SELECT.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    QualifiedWildcard(String),
    Expr { expr: Expr, alias: Option<String> },
}

impl SelectItem {
    pub fn expr(expr: Expr) -> Self {
        SelectItem::Expr { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        SelectItem::Expr {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// A FROM or JOIN source.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// A logical view, resolved by the preprocessor.
    Named { name: String, alias: Option<String> },
    /// A physical table (only produced by view expansion).
    Physical { name: String, alias: Option<String> },
    Derived { subquery: Box<Select>, alias: String },
    /// Pre-rendered SQL subquery (only produced by view expansion).
    Raw { sql: String, alias: String },
}

impl TableRef {
    pub fn named(name: impl Into<String>) -> Self {
        TableRef::Named {
            name: name.into(),
            alias: None,
        }
    }

    pub fn named_as(name: impl Into<String>, alias: impl Into<String>) -> Self {
        TableRef::Named {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    pub(crate) fn physical(name: impl Into<String>, alias: impl Into<String>) -> Self {
        TableRef::Physical {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    /// `SELECT * FROM <view>`.
    pub fn star_from(view: impl Into<String>) -> Self {
        Self {
            projection: vec![SelectItem::Wildcard],
            from: Some(TableRef::named(view)),
            ..Self::default()
        }
    }

    /// `SELECT <items> FROM <table>`.
    pub fn from_table(table: TableRef, projection: Vec<SelectItem>) -> Self {
        Self {
            projection,
            from: Some(table),
            ..Self::default()
        }
    }

    /// `SELECT <items>` without a FROM clause.
    pub fn values(projection: Vec<SelectItem>) -> Self {
        Self {
            projection,
            ..Self::default()
        }
    }

    /// Replace the projection with plain column names.
    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = names.into_iter().map(|n| SelectItem::expr(col(n))).collect();
        self
    }

    /// AND a predicate into the WHERE clause.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.selection = and_predicates(self.selection.take(), predicate);
        self
    }

    pub fn join(mut self, kind: JoinKind, table: TableRef, on: Expr) -> Self {
        self.joins.push(Join { kind, table, on });
        self
    }

    pub fn order_by(mut self, expr: Expr, descending: bool) -> Self {
        self.order_by.push(OrderBy { expr, descending });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

pub(crate) fn and_predicates(existing: Option<Expr>, predicate: Expr) -> Option<Expr> {
    Some(match existing {
        Some(current) => current.and(predicate),
        None => predicate,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expr>>,
}

impl Insert {
    pub fn into_view(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn values(mut self, row: Vec<Expr>) -> Self {
        self.rows.push(row);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub selection: Option<Expr>,
}

impl Update {
    pub fn view(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            selection: None,
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: Expr) -> Self {
        self.assignments.push((column.into(), value));
        self
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.selection = and_predicates(self.selection.take(), predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub selection: Option<Expr>,
}

impl Delete {
    pub fn from_view(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            selection: None,
        }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.selection = and_predicates(self.selection.take(), predicate);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    /// View a mutation writes to; `None` for reads.
    pub fn target(&self) -> Option<&str> {
        match self {
            Statement::Select(_) => None,
            Statement::Insert(insert) => Some(&insert.table),
            Statement::Update(update) => Some(&update.table),
            Statement::Delete(delete) => Some(&delete.table),
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Statement::Select(_))
    }
}

impl From<Select> for Statement {
    fn from(v: Select) -> Self {
        Statement::Select(v)
    }
}

impl From<Insert> for Statement {
    fn from(v: Insert) -> Self {
        Statement::Insert(v)
    }
}

impl From<Update> for Statement {
    fn from(v: Update) -> Self {
        Statement::Update(v)
    }
}

impl From<Delete> for Statement {
    fn from(v: Delete) -> Self {
        Statement::Delete(v)
    }
}

// Rendering

/// How literals and parameters are emitted.
pub(crate) enum Binding<'p> {
    /// Literals inline, parameters as `?N`.
    Inline,
    /// Every literal and parameter becomes a `?` with its value collected.
    Collect {
        params: &'p [Literal],
        bound: Vec<Literal>,
        missing: Option<usize>,
    },
}

pub(crate) struct SqlWriter<'p> {
    pub(crate) out: String,
    pub(crate) binding: Binding<'p>,
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn inline_literal(lit: &Literal, out: &mut String) {
    match lit {
        Literal::Null => out.push_str("NULL"),
        Literal::Boolean(true) => out.push_str("TRUE"),
        Literal::Boolean(false) => out.push_str("FALSE"),
        Literal::Integer(v) => {
            let _ = write!(out, "{v}");
        }
        Literal::Real(v) => {
            let _ = write!(out, "{v:?}");
        }
        Literal::Text(v) => {
            let _ = write!(out, "'{}'", v.replace('\'', "''"));
        }
        Literal::Blob(v) => {
            out.push_str("X'");
            for byte in v {
                let _ = write!(out, "{byte:02X}");
            }
            out.push('\'');
        }
    }
}

impl<'p> SqlWriter<'p> {
    pub(crate) fn inline() -> Self {
        Self {
            out: String::new(),
            binding: Binding::Inline,
        }
    }

    pub(crate) fn collecting(params: &'p [Literal]) -> Self {
        Self {
            out: String::new(),
            binding: Binding::Collect {
                params,
                bound: Vec::new(),
                missing: None,
            },
        }
    }

    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn literal(&mut self, lit: &Literal) {
        match &mut self.binding {
            Binding::Inline => inline_literal(lit, &mut self.out),
            Binding::Collect { bound, .. } => {
                // NULL stays inline so `IS NULL` style rewrites keep working.
                if *lit == Literal::Null {
                    self.out.push_str("NULL");
                } else {
                    bound.push(lit.clone());
                    self.out.push('?');
                }
            }
        }
    }

    fn param(&mut self, index: usize) {
        match &mut self.binding {
            Binding::Inline => {
                let _ = write!(self.out, "?{index}");
            }
            Binding::Collect {
                params,
                bound,
                missing,
            } => {
                match index.checked_sub(1).and_then(|i| params.get(i)) {
                    Some(value) => bound.push(value.clone()),
                    None => {
                        missing.get_or_insert(index);
                        bound.push(Literal::Null);
                    }
                }
                self.out.push('?');
            }
        }
    }

    fn comma_list<T>(&mut self, items: &[T], mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            each(self, item);
        }
    }

    pub(crate) fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column { table, name } => {
                if let Some(table) = table {
                    self.push(&quote_ident(table));
                    self.push(".");
                }
                self.push(&quote_ident(name));
            }
            Expr::Literal(lit) => self.literal(lit),
            Expr::Param(index) => self.param(*index),
            Expr::Unary { op, expr } => {
                self.push(match op {
                    UnaryOp::Not => "(NOT ",
                    UnaryOp::Minus => "(-",
                });
                self.expr(expr);
                self.push(")");
            }
            Expr::Binary { left, op, right } => {
                self.push("(");
                self.expr(left);
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.expr(right);
                self.push(")");
            }
            Expr::IsNull { expr, negated } => {
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.comma_list(list, |w, e| w.expr(e));
                self.push("))");
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.select(subquery);
                self.push("))");
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " NOT LIKE " } else { " LIKE " });
                self.expr(pattern);
                self.push(")");
            }
            Expr::Cast { expr, type_name } => {
                self.push("CAST(");
                self.expr(expr);
                self.push(" AS ");
                self.push(type_name);
                self.push(")");
            }
            Expr::Function { name, args } => {
                self.push(name);
                self.push("(");
                self.comma_list(args, |w, e| w.expr(e));
                self.push(")");
            }
            Expr::Wildcard => self.push("*"),
        }
    }

    fn table_ref(&mut self, table: &TableRef) {
        match table {
            TableRef::Named { name, alias } | TableRef::Physical { name, alias } => {
                self.push(&quote_ident(name));
                if let Some(alias) = alias {
                    self.push(" AS ");
                    self.push(&quote_ident(alias));
                }
            }
            TableRef::Derived { subquery, alias } => {
                self.push("(");
                self.select(subquery);
                self.push(") AS ");
                self.push(&quote_ident(alias));
            }
            TableRef::Raw { sql, alias } => {
                self.push("(");
                self.push(sql);
                self.push(") AS ");
                self.push(&quote_ident(alias));
            }
        }
    }

    pub(crate) fn select(&mut self, select: &Select) {
        self.push("SELECT ");
        if select.distinct {
            self.push("DISTINCT ");
        }
        self.comma_list(&select.projection, |w, item| match item {
            SelectItem::Wildcard => w.push("*"),
            SelectItem::QualifiedWildcard(table) => {
                w.push(&quote_ident(table));
                w.push(".*");
            }
            SelectItem::Expr { expr, alias } => {
                w.expr(expr);
                if let Some(alias) = alias {
                    w.push(" AS ");
                    w.push(&quote_ident(alias));
                }
            }
        });

        if let Some(from) = &select.from {
            self.push(" FROM ");
            self.table_ref(from);
        }
        for join in &select.joins {
            self.push(match join.kind {
                JoinKind::Inner => " JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            });
            self.table_ref(&join.table);
            self.push(" ON ");
            self.expr(&join.on);
        }
        if let Some(selection) = &select.selection {
            self.push(" WHERE ");
            self.expr(selection);
        }
        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.comma_list(&select.group_by, |w, e| w.expr(e));
        }
        if !select.order_by.is_empty() {
            self.push(" ORDER BY ");
            self.comma_list(&select.order_by, |w, o| {
                w.expr(&o.expr);
                if o.descending {
                    w.push(" DESC");
                }
            });
        }
        if let Some(limit) = select.limit {
            let _ = write!(self.out, " LIMIT {limit}");
        }
        if let Some(offset) = select.offset {
            if select.limit.is_none() {
                self.push(" LIMIT -1");
            }
            let _ = write!(self.out, " OFFSET {offset}");
        }
    }

    pub(crate) fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Select(select) => self.select(select),
            Statement::Insert(insert) => {
                self.push("INSERT INTO ");
                self.push(&quote_ident(&insert.table));
                self.push(" (");
                let columns: Vec<String> = insert.columns.iter().map(|c| quote_ident(c)).collect();
                self.push(&columns.join(", "));
                self.push(") VALUES ");
                self.comma_list(&insert.rows, |w, row| {
                    w.push("(");
                    w.comma_list(row, |w, e| w.expr(e));
                    w.push(")");
                });
            }
            Statement::Update(update) => {
                self.push("UPDATE ");
                self.push(&quote_ident(&update.table));
                self.push(" SET ");
                self.comma_list(&update.assignments, |w, (column, value)| {
                    w.push(&quote_ident(column));
                    w.push(" = ");
                    w.expr(value);
                });
                if let Some(selection) = &update.selection {
                    self.push(" WHERE ");
                    self.expr(selection);
                }
            }
            Statement::Delete(delete) => {
                self.push("DELETE FROM ");
                self.push(&quote_ident(&delete.table));
                if let Some(selection) = &delete.selection {
                    self.push(" WHERE ");
                    self.expr(selection);
                }
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = SqlWriter::inline();
        writer.statement(self);
        f.write_str(&writer.out)
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = SqlWriter::inline();
        writer.select(self);
        f.write_str(&writer.out)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = SqlWriter::inline();
        writer.expr(self);
        f.write_str(&writer.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_select() {
        let select = Select::star_from("todo")
            .filter(col("done").eq(lit(false)))
            .filter(col("title").like(lit("%milk%")))
            .order_by(col("title"), true)
            .limit(5);
        assert_eq!(
            select.to_string(),
            r#"SELECT * FROM "todo" WHERE (("done" = FALSE) AND ("title" LIKE '%milk%')) ORDER BY "title" DESC LIMIT 5"#
        );
    }

    #[test]
    fn test_render_mutations() {
        let insert = Statement::from(
            Insert::into_view("todo")
                .columns(["id", "title"])
                .values(vec![lit("t1"), lit("it's")]),
        );
        assert_eq!(
            insert.to_string(),
            r#"INSERT INTO "todo" ("id", "title") VALUES ('t1', 'it''s')"#
        );

        let update = Statement::from(Update::view("todo").set("done", lit(true)).filter(col("id").eq(param(1))));
        assert_eq!(update.to_string(), r#"UPDATE "todo" SET "done" = TRUE WHERE ("id" = ?1)"#);

        let delete = Statement::from(Delete::from_view("todo").filter(col("id").in_list(vec![lit(1), lit(2)])));
        assert_eq!(delete.to_string(), r#"DELETE FROM "todo" WHERE ("id" IN (1, 2))"#);
    }

    #[test]
    fn test_collecting_binds_literals_and_params() {
        let select = Select::star_from("state")
            .filter(col("entity_id").eq(param(2)))
            .filter(col("schema_key").eq(lit("todo")))
            .filter(col("snapshot_content").is_not_null());
        let params = [Literal::Integer(1), Literal::Text("e1".into())];
        let mut writer = SqlWriter::collecting(&params);
        writer.select(&select);

        assert_eq!(writer.out.matches('?').count(), 2);
        let Binding::Collect { bound, missing, .. } = writer.binding else {
            panic!("expected collecting binding");
        };
        assert_eq!(bound, vec![Literal::Text("e1".into()), Literal::Text("todo".into())]);
        assert_eq!(missing, None);
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
        assert_eq!(
            lit(vec![0xde_u8, 0xad]).to_string(),
            "X'DEAD'"
        );
    }
}
