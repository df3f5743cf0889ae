use crate::error::Result;
use crate::sql::{BindValue, Dialect};

/// How a statement refers to its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamStyle {
    /// Parameters are already written as the dialect's placeholders, in order.
    Positional,
    /// Parameters are written as `@name` and bound by name.
    Named,
}

/// SQL text plus its parameter bindings, ready to hand to a connection.
#[derive(Clone, Debug)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<(String, BindValue)>,
    pub style: ParamStyle,
}

impl Statement {
    pub fn positional(sql: impl Into<String>, params: Vec<(String, BindValue)>) -> Self {
        Statement {
            sql: sql.into(),
            params,
            style: ParamStyle::Positional,
        }
    }

    pub fn named(sql: impl Into<String>, params: Vec<(String, BindValue)>) -> Self {
        Statement {
            sql: sql.into(),
            params,
            style: ParamStyle::Named,
        }
    }

    /// SQL and values in the order the driver binds them.
    pub fn prepare(&self, dialect: Dialect) -> Result<(String, Vec<BindValue>)> {
        match self.style {
            ParamStyle::Positional => Ok((self.sql.clone(), self.params.iter().map(|(_, v)| v.clone()).collect())),
            ParamStyle::Named => dialect.bind_named(&self.sql, &self.params),
        }
    }
}
