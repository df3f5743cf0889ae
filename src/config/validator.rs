//! Options validation: everything that can be checked before touching the database.

use crate::config::{DatabaseOptions, TableFilter};
use crate::error::{Error, Result};
use crate::schema::LogicalType;

pub fn validate(options: &DatabaseOptions) -> Result<()> {
    if options.connection_string.trim().is_empty() {
        return Err(Error::configuration("connection_string is required"));
    }
    TableFilter::from_options(options)?;

    for (name, command) in &options.sql_commands {
        if name.trim().is_empty() {
            return Err(Error::configuration("sql command name must not be empty"));
        }
        if command.command_text.trim().is_empty() {
            return Err(Error::configuration(format!("sql command '{}' has no command text", name)));
        }
        for p in &command.parameters {
            if p.name.trim().is_empty() {
                return Err(Error::configuration(format!("sql command '{}' has a parameter without a name", name)));
            }
            if LogicalType::from_param_type(&p.type_).is_none() {
                return Err(Error::translation(format!(
                    "Command '{}' has an invalid type '{}' defined for parameter '{}'.",
                    name, p.type_, p.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SqlCommand, SqlCommandParameter};

    #[test]
    fn requires_connection_string() {
        let err = validate(&DatabaseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rejects_unknown_parameter_type() {
        let mut options = DatabaseOptions::new("sqlite::memory:");
        options.sql_commands.insert(
            "byId".into(),
            SqlCommand::new("SELECT * FROM t WHERE id = @id").with_parameter(SqlCommandParameter::new("id", "hierarchyid")),
        );
        assert!(matches!(validate(&options), Err(Error::Translation(_))));
    }

    #[test]
    fn accepts_well_formed_commands() {
        let mut options = DatabaseOptions::new("sqlite::memory:");
        options.sql_commands.insert(
            "byId".into(),
            SqlCommand::new("SELECT * FROM t WHERE id = @id").with_parameter(SqlCommandParameter::new("id", "int")),
        );
        validate(&options).unwrap();
    }
}
