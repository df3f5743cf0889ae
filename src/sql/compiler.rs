//! Default SQL compiler: OData-style query options to dialect SQL.

use crate::error::{Error, Result};
use crate::schema::LogicalType;
use crate::sql::odata::{self, BinaryOp, Expr, Function};
use crate::sql::{BindValue, Dialect};
use serde_json::Value;
use std::collections::BTreeMap;

/// Option name (`select`, `filter`, `orderby`, `top`, `skip`) to raw value.
pub type QueryOptionMap = BTreeMap<String, String>;

pub const OPTION_SELECT: &str = "select";
pub const OPTION_FILTER: &str = "filter";
pub const OPTION_ORDERBY: &str = "orderby";
pub const OPTION_TOP: &str = "top";
pub const OPTION_SKIP: &str = "skip";

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<(String, BindValue)>,
}

/// Maps the names used in query options to source columns.
pub trait ColumnResolver {
    /// Source column and its type, or `None` when `name` is not part of the table.
    fn resolve_column(&self, name: &str) -> Option<(&str, LogicalType)>;
}

/// Turns a table name and query options into SQL. Implementations are swappable per data source.
/// Every name in `select`, `filter` and `orderby` goes through `columns`.
pub trait SqlCompiler: Send + Sync {
    fn compile(
        &self,
        table: &str,
        columns: &dyn ColumnResolver,
        options: &QueryOptionMap,
        want_count: bool,
    ) -> Result<CompiledSql>;
}

fn column(columns: &dyn ColumnResolver, dialect: Dialect, name: &str, option: &str) -> Result<(String, LogicalType)> {
    columns
        .resolve_column(name)
        .map(|(c, ty)| (dialect.quote(c), ty))
        .ok_or_else(|| Error::translation(format!("unknown field '{}' in ${}", name, option)))
}

/// Filter literals keep their written type; quoted text is always a string.
fn literal(value: &Value) -> BindValue {
    match value {
        Value::String(s) => BindValue::String(s.clone()),
        other => BindValue::from_json(other),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ODataCompiler {
    dialect: Dialect,
}

impl ODataCompiler {
    pub fn new(dialect: Dialect) -> Self {
        ODataCompiler { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

struct ExprWriter<'a> {
    dialect: Dialect,
    columns: &'a dyn ColumnResolver,
    params: &'a mut Vec<(String, BindValue)>,
}

impl ExprWriter<'_> {
    fn bind(&mut self, value: BindValue) -> String {
        let name = format!("p{}", self.params.len());
        self.params.push((name, value));
        self.dialect.placeholder(self.params.len())
    }

    fn write(&mut self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Property(name) => Ok(column(self.columns, self.dialect, name, OPTION_FILTER)?.0),
            Expr::Literal(value) => Ok(self.bind(literal(value))),
            Expr::Not(inner) => Ok(format!("NOT ({})", self.write(inner)?)),
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Call { function, args } => self.call(*function, args),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<String> {
        let is_null = |e: &Expr| matches!(e, Expr::Literal(Value::Null));
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let l = self.write(left)?;
                let r = self.write(right)?;
                Ok(format!("({} {} {})", l, op.sql(), r))
            }
            BinaryOp::Eq | BinaryOp::Ne if is_null(left) || is_null(right) => {
                let operand = if is_null(right) { left } else { right };
                let keyword = if op == BinaryOp::Eq { "IS NULL" } else { "IS NOT NULL" };
                if is_null(operand) {
                    // null eq null
                    return Ok(if op == BinaryOp::Eq { "1 = 1".into() } else { "1 = 0".into() });
                }
                Ok(format!("{} {}", self.write(operand)?, keyword))
            }
            _ => {
                if is_null(left) || is_null(right) {
                    return Err(Error::translation(format!("null cannot be compared with '{}'", op.sql())));
                }
                let l = self.operand(left, right)?;
                let r = self.operand(right, left)?;
                Ok(format!("{} {} {}", l, op.sql(), r))
            }
        }
    }

    /// A literal compared with a column is bound as that column's type.
    fn operand(&mut self, expr: &Expr, other: &Expr) -> Result<String> {
        match (expr, other) {
            (Expr::Literal(value), Expr::Property(name)) => {
                let (_, ty) = column(self.columns, self.dialect, name, OPTION_FILTER)?;
                let value = BindValue::coerce(value, ty)?;
                Ok(self.bind(value))
            }
            _ => self.write(expr),
        }
    }

    fn call(&mut self, function: Function, args: &[Expr]) -> Result<String> {
        match function {
            Function::Contains | Function::StartsWith | Function::EndsWith => {
                let target = self.write(&args[0])?;
                let needle = match &args[1] {
                    Expr::Literal(Value::String(s)) => escape_like(s),
                    other => {
                        return Err(Error::translation(format!(
                            "second argument of {:?} must be a string literal, got {:?}",
                            function, other
                        )))
                    }
                };
                let pattern = match function {
                    Function::Contains => format!("%{}%", needle),
                    Function::StartsWith => format!("{}%", needle),
                    _ => format!("%{}", needle),
                };
                let placeholder = self.bind(BindValue::String(pattern));
                Ok(format!("{} LIKE {} ESCAPE '!'", target, placeholder))
            }
            Function::ToLower => Ok(format!("LOWER({})", self.write(&args[0])?)),
            Function::ToUpper => Ok(format!("UPPER({})", self.write(&args[0])?)),
            Function::Trim => Ok(format!("TRIM({})", self.write(&args[0])?)),
            Function::Length => Ok(format!("{}({})", self.dialect.length_function(), self.write(&args[0])?)),
        }
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '!' | '[') {
            out.push('!');
        }
        out.push(c);
    }
    out
}

fn parse_count(options: &QueryOptionMap, key: &str) -> Result<Option<u64>> {
    match options.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::translation(format!("${} must be a non-negative integer, got '{}'", key, raw))),
    }
}

impl SqlCompiler for ODataCompiler {
    fn compile(
        &self,
        table: &str,
        columns: &dyn ColumnResolver,
        options: &QueryOptionMap,
        want_count: bool,
    ) -> Result<CompiledSql> {
        for key in options.keys() {
            if ![OPTION_SELECT, OPTION_FILTER, OPTION_ORDERBY, OPTION_TOP, OPTION_SKIP].contains(&key.as_str()) {
                return Err(Error::translation(format!("unsupported query option '{}'", key)));
            }
        }

        let dialect = self.dialect;
        let mut params = Vec::new();
        let where_clause = match options.get(OPTION_FILTER).filter(|f| !f.trim().is_empty()) {
            Some(filter) => {
                let expr = odata::parse_filter(filter)?;
                let mut writer = ExprWriter {
                    dialect,
                    columns,
                    params: &mut params,
                };
                format!(" WHERE {}", writer.write(&expr)?)
            }
            None => String::new(),
        };
        let from = dialect.quote_table(table);

        let mut order_terms = Vec::new();
        if let Some(orderby) = options.get(OPTION_ORDERBY) {
            for term in odata::parse_orderby(orderby)? {
                let (quoted, _) = column(columns, dialect, &term.property, OPTION_ORDERBY)?;
                order_terms.push(if term.descending { format!("{} DESC", quoted) } else { quoted });
            }
        }

        if want_count {
            return Ok(CompiledSql {
                sql: format!("SELECT COUNT(*) FROM {}{}", from, where_clause),
                params,
            });
        }

        let mut projection = Vec::new();
        if let Some(select) = options.get(OPTION_SELECT) {
            for name in odata::parse_select(select)? {
                let (quoted, _) = column(columns, dialect, &name, OPTION_SELECT)?;
                if !projection.contains(&quoted) {
                    projection.push(quoted);
                }
            }
        }
        let projection = if projection.is_empty() { "*".to_string() } else { projection.join(", ") };

        let top = parse_count(options, OPTION_TOP)?;
        let skip = parse_count(options, OPTION_SKIP)?;

        let mut sql = format!("SELECT {} FROM {}{}", projection, from, where_clause);
        if !order_terms.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_terms.join(", "));
        } else if dialect == Dialect::SqlServer && (top.is_some() || skip.is_some()) {
            sql.push_str(" ORDER BY (SELECT 0)");
        }
        sql.push_str(&dialect.paging(top, skip));

        Ok(CompiledSql { sql, params })
    }
}
