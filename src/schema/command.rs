//! Classification and safety checks for declared commands.

use crate::config::{SqlCommand, SqlCommandParameter};
use crate::error::{Error, Result};
use crate::schema::LogicalType;
use crate::sql::BindValue;
use regex::RegexBuilder;

/// Statement verb of a declared command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Query,
    Insert,
    Update,
    Delete,
    Other,
}

fn starts_with_verb(text: &str, verb: &str) -> bool {
    RegexBuilder::new(&format!(r"^\s*{}\s", verb))
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

impl SqlCommand {
    pub fn kind(&self) -> CommandKind {
        let text = self.command_text.as_str();
        if starts_with_verb(text, "SELECT") {
            CommandKind::Query
        } else if starts_with_verb(text, "INSERT") {
            CommandKind::Insert
        } else if starts_with_verb(text, "UPDATE") {
            CommandKind::Update
        } else if starts_with_verb(text, "DELETE") {
            CommandKind::Delete
        } else {
            CommandKind::Other
        }
    }

    pub fn is_query(&self) -> bool {
        self.kind() == CommandKind::Query
    }

    pub fn is_non_query(&self) -> bool {
        !self.is_query()
    }

    pub fn has_where_clause(&self) -> bool {
        RegexBuilder::new(r"\sWHERE\s")
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(&self.command_text))
            .unwrap_or(false)
    }

    /// First word of the statement, capitalized: `Select`, `Insert`, `Update`...
    pub fn verb(&self) -> String {
        let word = self.command_text.split_whitespace().next().unwrap_or_default().to_lowercase();
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Text used to discover the result columns.
    pub fn schema_probe_text(&self) -> &str {
        match self.command_schema_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.command_text,
        }
    }

    /// Parameters paired with their parsed logical types.
    pub fn typed_parameters(&self, command_name: &str) -> Result<Vec<(&SqlCommandParameter, LogicalType)>> {
        self.parameters
            .iter()
            .map(|p| {
                LogicalType::from_param_type(&p.type_).map(|ty| (p, ty)).ok_or_else(|| {
                    Error::translation(format!(
                        "Command '{}' has an invalid type '{}' defined for parameter '{}'.",
                        command_name, p.type_, p.name
                    ))
                })
            })
            .collect()
    }
}

/// Reject non-query commands that could mutate without scope.
pub fn check_non_query_command(name: &str, command: &SqlCommand) -> Result<()> {
    match command.kind() {
        CommandKind::Delete => Err(Error::DiscoverySafety {
            command: name.to_string(),
            reason: "DELETE commands are not supported".into(),
        }),
        CommandKind::Update if !command.has_where_clause() => Err(Error::DiscoverySafety {
            command: name.to_string(),
            reason: "UPDATE commands must have a WHERE clause".into(),
        }),
        _ => Ok(()),
    }
}

/// Values bound while probing a command's result shape: the declared default,
/// else the type's zero value, else null.
pub fn placeholder_parameters(name: &str, command: &SqlCommand) -> Result<Vec<(String, BindValue)>> {
    command
        .typed_parameters(name)?
        .into_iter()
        .map(|(p, ty)| {
            let value = match &p.default_value {
                Some(default) => BindValue::coerce(default, ty)?,
                None => BindValue::zero(ty),
            };
            Ok((p.name.clone(), value))
        })
        .collect()
}
