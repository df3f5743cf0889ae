//! SQL dialect differences: identifier quoting, placeholders and paging.

use crate::error::{Error, Result};
use crate::sql::BindValue;
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
    MySql,
    SqlServer,
}

impl Dialect {
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let scheme = connection_string.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "mssql" | "sqlserver" => Ok(Dialect::SqlServer),
            _ => Err(Error::configuration(format!(
                "cannot infer SQL dialect from connection string scheme '{}'",
                scheme
            ))),
        }
    }

    /// Quote one identifier.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::SqlServer => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    /// Quote a possibly qualified name (`schema.table`) part by part.
    pub fn quote_table(&self, name: &str) -> String {
        name.split('.').map(|part| self.quote(part)).collect::<Vec<_>>().join(".")
    }

    /// Placeholder for the 1-based parameter `n`.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite => format!("?{}", n),
            Dialect::MySql => "?".to_string(),
            Dialect::SqlServer => format!("@p{}", n - 1),
        }
    }

    /// Whether one placeholder may be referenced several times.
    fn reuses_placeholders(&self) -> bool {
        !matches!(self, Dialect::MySql)
    }

    /// Minimal statement whose result describes the table's columns without reading rows.
    pub fn column_probe_sql(&self, table: &str) -> String {
        format!("SELECT * FROM {} WHERE 1 = 0", self.quote_table(table))
    }

    /// Paging suffix for `top`/`skip`. SQL Server needs an ORDER BY, which the caller provides.
    pub fn paging(&self, top: Option<u64>, skip: Option<u64>) -> String {
        let mut out = String::new();
        match self {
            Dialect::Postgres => {
                if let Some(top) = top {
                    let _ = write!(out, " LIMIT {}", top);
                }
                if let Some(skip) = skip {
                    let _ = write!(out, " OFFSET {}", skip);
                }
            }
            Dialect::Sqlite | Dialect::MySql => match (top, skip) {
                (Some(top), Some(skip)) => {
                    let _ = write!(out, " LIMIT {} OFFSET {}", top, skip);
                }
                (Some(top), None) => {
                    let _ = write!(out, " LIMIT {}", top);
                }
                (None, Some(skip)) => {
                    let unbounded = if *self == Dialect::Sqlite { "-1" } else { "18446744073709551615" };
                    let _ = write!(out, " LIMIT {} OFFSET {}", unbounded, skip);
                }
                (None, None) => {}
            },
            Dialect::SqlServer => {
                if top.is_some() || skip.is_some() {
                    let _ = write!(out, " OFFSET {} ROWS", skip.unwrap_or(0));
                    if let Some(top) = top {
                        let _ = write!(out, " FETCH NEXT {} ROWS ONLY", top);
                    }
                }
            }
        }
        out
    }

    /// Scalar string-length function.
    pub fn length_function(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "LEN",
            Dialect::MySql => "CHAR_LENGTH",
            Dialect::Postgres | Dialect::Sqlite => "LENGTH",
        }
    }

    /// Rewrite `@name` references into this dialect's positional placeholders and
    /// return the values in placeholder order. String literals, quoted
    /// identifiers and comments are left untouched; `@@name` is kept verbatim.
    pub fn bind_named(&self, sql: &str, params: &[(String, BindValue)]) -> Result<(String, Vec<BindValue>)> {
        let by_name: HashMap<String, &BindValue> = params
            .iter()
            .map(|(name, value)| (name.trim_start_matches('@').to_lowercase(), value))
            .collect();
        let mut out = String::with_capacity(sql.len());
        let mut values = Vec::new();
        let mut assigned: HashMap<String, usize> = HashMap::new();
        let chars: Vec<char> = sql.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' | '`' => {
                    let end = find_closing(&chars, i + 1, c);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '-' if chars.get(i + 1) == Some(&'-') => {
                    let end = chars[i..].iter().position(|&ch| ch == '\n').map(|p| i + p).unwrap_or(chars.len());
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '/' if chars.get(i + 1) == Some(&'*') => {
                    let end = (i + 2..chars.len().saturating_sub(1))
                        .find(|&j| chars[j] == '*' && chars[j + 1] == '/')
                        .map(|j| j + 2)
                        .unwrap_or(chars.len());
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '@' if chars.get(i + 1) == Some(&'@') => {
                    let end = ident_end(&chars, i + 2);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                '@' if chars.get(i + 1).is_some_and(|ch| ch.is_ascii_alphabetic() || *ch == '_') => {
                    let end = ident_end(&chars, i + 1);
                    let name: String = chars[i + 1..end].iter().collect();
                    let key = name.to_lowercase();
                    let value = by_name
                        .get(&key)
                        .ok_or_else(|| Error::translation(format!("no value bound for parameter @{}", name)))?;
                    let n = match assigned.get(&key) {
                        Some(n) if self.reuses_placeholders() => *n,
                        _ => {
                            values.push((*value).clone());
                            assigned.insert(key, values.len());
                            values.len()
                        }
                    };
                    out.push_str(&self.placeholder(n));
                    i = end;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }
        Ok((out, values))
    }
}

/// Index just past the closing quote, honouring doubled-quote escapes.
fn find_closing(chars: &[char], mut i: usize, quote: char) -> usize {
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn ident_end(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, BindValue)]) -> Vec<(String, BindValue)> {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn dialect_from_scheme() {
        assert_eq!(Dialect::from_connection_string("postgres://localhost/db").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_connection_string("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert!(Dialect::from_connection_string("Server=.;Database=x").is_err());
    }

    #[test]
    fn quoting() {
        assert_eq!(Dialect::Postgres.quote_table("public.users"), "\"public\".\"users\"");
        assert_eq!(Dialect::Sqlite.quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::MySql.quote("order"), "`order`");
        assert_eq!(Dialect::SqlServer.quote_table("dbo.Order Details"), "[dbo].[Order Details]");
    }

    #[test]
    fn probe_sql() {
        assert_eq!(
            Dialect::Postgres.column_probe_sql("public.users"),
            "SELECT * FROM \"public\".\"users\" WHERE 1 = 0"
        );
    }

    #[test]
    fn paging_per_dialect() {
        assert_eq!(Dialect::Postgres.paging(Some(10), Some(20)), " LIMIT 10 OFFSET 20");
        assert_eq!(Dialect::Sqlite.paging(None, Some(5)), " LIMIT -1 OFFSET 5");
        assert_eq!(Dialect::SqlServer.paging(Some(3), None), " OFFSET 0 ROWS FETCH NEXT 3 ROWS ONLY");
        assert_eq!(Dialect::MySql.paging(None, None), "");
    }

    #[test]
    fn named_parameters_become_positional() {
        let (sql, values) = Dialect::Postgres
            .bind_named(
                "SELECT * FROM t WHERE a = @a AND b = @B OR a > @a",
                &params(&[("b", BindValue::I64(2)), ("@a", BindValue::I64(1))]),
            )
            .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2 OR a > $1");
        assert_eq!(values, vec![BindValue::I64(1), BindValue::I64(2)]);
    }

    #[test]
    fn mysql_repeats_values() {
        let (sql, values) = Dialect::MySql
            .bind_named("SELECT @x, @x", &params(&[("x", BindValue::Bool(true))]))
            .unwrap();
        assert_eq!(sql, "SELECT ?, ?");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn literals_comments_and_system_variables_are_untouched() {
        let (sql, values) = Dialect::Sqlite
            .bind_named(
                "SELECT '@not', \"@col\", @@ROWCOUNT -- @skip\n/* @also */ FROM t WHERE x = @x AND y = 'it''s @x'",
                &params(&[("x", BindValue::String("v".into()))]),
            )
            .unwrap();
        assert_eq!(
            sql,
            "SELECT '@not', \"@col\", @@ROWCOUNT -- @skip\n/* @also */ FROM t WHERE x = ?1 AND y = 'it''s @x'"
        );
        assert_eq!(values, vec![BindValue::String("v".into())]);
    }

    #[test]
    fn unbound_parameter_is_an_error() {
        let err = Dialect::Postgres.bind_named("SELECT @missing", &[]).unwrap_err();
        assert!(matches!(err, Error::Translation(_)));
    }

    #[test]
    fn postgres_operators_survive() {
        let (sql, _) = Dialect::Postgres
            .bind_named("SELECT * FROM t WHERE tags @> @tags", &params(&[("tags", BindValue::Null)]))
            .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE tags @> $1");
    }
}
