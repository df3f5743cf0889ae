//! Raw config types matching the JSON options file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Options for one data source: where to connect, what to expose and how to read it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseOptions {
    #[serde(alias = "connectionString")]
    pub connection_string: String,
    /// Glob patterns (`?`, `*`) of tables to expose. `None` exposes every table;
    /// `[""]` disables table discovery altogether.
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    /// Glob patterns of tables never exposed, whatever `tables` says.
    #[serde(default, alias = "excludedTables")]
    pub excluded_tables: Option<Vec<String>>,
    #[serde(default, alias = "sqlCommands")]
    pub sql_commands: BTreeMap<String, SqlCommand>,
    #[serde(default, alias = "trimStrings")]
    pub trim_strings: bool,
    #[serde(default, alias = "commandTimeout")]
    pub command_timeout_secs: Option<u64>,
}

impl DatabaseOptions {
    pub fn new(connection_string: impl Into<String>) -> Self {
        DatabaseOptions {
            connection_string: connection_string.into(),
            ..Default::default()
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn should_generate_apis_for_tables(&self) -> bool {
        match &self.tables {
            None => true,
            Some(tables) => !(tables.len() == 1 && tables[0].is_empty()),
        }
    }
}

/// A user-declared SQL statement, exposed either as a read-only virtual table
/// (SELECT) or as a parameterized action (anything else).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SqlCommand {
    #[serde(default, alias = "commandText")]
    pub command_text: String,
    /// Loaded into `command_text` by the loader, relative to the options file.
    #[serde(default, alias = "commandTextFile")]
    pub command_text_file: Option<String>,
    /// Alternate statement used only to discover the result columns.
    #[serde(default, alias = "commandSchemaText")]
    pub command_schema_text: Option<String>,
    #[serde(default, alias = "dataTypeName")]
    pub data_type_name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<SqlCommandParameter>,
}

impl SqlCommand {
    pub fn new(command_text: impl Into<String>) -> Self {
        SqlCommand {
            command_text: command_text.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, parameter: SqlCommandParameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqlCommandParameter {
    pub name: String,
    /// Logical type name, e.g. `int`, `string`, `datetime`.
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, alias = "defaultValue")]
    pub default_value: Option<serde_json::Value>,
}

impl SqlCommandParameter {
    pub fn new(name: impl Into<String>, type_: impl Into<String>) -> Self {
        SqlCommandParameter {
            name: name.into(),
            type_: type_.into(),
            optional: false,
            default_value: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }
}
