//! Schema model produced by discovery: tables, columns and declared commands.

mod command;
mod reader;

pub use command::*;
pub use reader::*;

use crate::config::SqlCommand;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Value type of a column or command parameter, independent of the SQL dialect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Date,
    Time,
    Uuid,
    Json,
    Binary,
}

impl LogicalType {
    /// Parse the `type` of a declared command parameter.
    pub fn from_param_type(name: &str) -> Option<Self> {
        let ty = match name.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" | "varchar" | "char" => LogicalType::String,
            "int" | "integer" | "int16" | "int32" | "int64" | "short" | "long" | "smallint" | "bigint" => {
                LogicalType::Integer
            }
            "float" | "double" | "real" | "single" | "f32" | "f64" => LogicalType::Float,
            "decimal" | "numeric" | "money" => LogicalType::Decimal,
            "bool" | "boolean" | "bit" => LogicalType::Boolean,
            "datetime" | "timestamp" | "timestamptz" | "datetimeoffset" => LogicalType::DateTime,
            "date" => LogicalType::Date,
            "time" | "timespan" => LogicalType::Time,
            "uuid" | "guid" => LogicalType::Uuid,
            "json" | "jsonb" => LogicalType::Json,
            "binary" | "bytes" | "blob" | "bytea" | "varbinary" => LogicalType::Binary,
            _ => return None,
        };
        Some(ty)
    }

    /// Types that always carry a value; the rest admit a null placeholder.
    pub fn is_value_type(&self) -> bool {
        !matches!(self, LogicalType::String | LogicalType::Json | LogicalType::Binary)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalType::String => "string",
            LogicalType::Integer => "integer",
            LogicalType::Float => "float",
            LogicalType::Decimal => "decimal",
            LogicalType::Boolean => "boolean",
            LogicalType::DateTime => "datetime",
            LogicalType::Date => "date",
            LogicalType::Time => "time",
            LogicalType::Uuid => "uuid",
            LogicalType::Json => "json",
            LogicalType::Binary => "binary",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub logical_type: LogicalType,
    pub is_nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, logical_type: LogicalType, is_nullable: bool) -> Self {
        Column {
            name: name.into(),
            logical_type,
            is_nullable,
        }
    }
}

/// A physical table, or a virtual read-only table backed by a query command.
#[derive(Clone, Debug)]
pub struct Table {
    name: String,
    qualifier: String,
    name_with_qualifier: String,
    pub columns: Vec<Column>,
    pub command: Option<SqlCommand>,
}

impl Table {
    pub fn new(name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        let name = name.into();
        let qualifier = qualifier.into();
        let name_with_qualifier = if qualifier.trim().is_empty() {
            name.clone()
        } else {
            format!("{}.{}", qualifier, name)
        };
        Table {
            name,
            qualifier,
            name_with_qualifier,
            columns: Vec::new(),
            command: None,
        }
    }

    pub fn from_command(name: impl Into<String>, command: SqlCommand) -> Self {
        let mut table = Table::new(name, "");
        table.command = Some(command);
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    pub fn name_with_qualifier(&self) -> &str {
        &self.name_with_qualifier
    }

    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }

    pub fn add_column(&mut self, name: impl Into<String>, logical_type: LogicalType, is_nullable: bool) {
        self.columns.push(Column::new(name, logical_type, is_nullable));
    }
}

/// Result of one discovery run. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    /// Physical tables followed by query commands.
    pub tables: Vec<Table>,
    /// Non-query commands that passed the safety checks, by name.
    pub commands: BTreeMap<String, SqlCommand>,
}
