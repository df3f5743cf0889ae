//! Discovery: reads tables and declared commands from a live data source.

use crate::config::{DatabaseOptions, SqlCommand, TableFilter};
use crate::error::{Error, Result};
use crate::schema::{check_non_query_command, placeholder_parameters, LogicalType, Schema, Table};
use crate::source::{Connection, Connector, MetadataTable};
use crate::sql::Statement;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata columns that may carry a table's qualifier, in the order they are tried.
const QUALIFIER_COLUMNS: [&str; 3] = ["TABLE_QUALIFIER", "TABLE_SCHEM", "TABLE_SCHEMA"];

/// Single-use schema reader. Call [`SchemaReader::connect`] once, then
/// [`SchemaReader::get_schema`], which releases the connection.
pub struct SchemaReader {
    options: DatabaseOptions,
    connector: Arc<dyn Connector>,
    connection: Option<Box<dyn Connection>>,
}

impl SchemaReader {
    pub fn new(options: DatabaseOptions, connector: Arc<dyn Connector>) -> Self {
        SchemaReader {
            options,
            connector,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        self.connection = Some(self.connector.connect().await?);
        tracing::debug!(dialect = ?self.connector.dialect(), "schema reader connected");
        Ok(())
    }

    fn connection(&mut self) -> Result<&mut Box<dyn Connection>> {
        self.connection.as_mut().ok_or(Error::NotConnected)
    }

    /// Physical tables followed by query commands, plus the non-query commands.
    /// The connection is dropped whether discovery succeeds or not.
    pub async fn get_schema(mut self) -> Result<Schema> {
        let result = self.read_schema().await;
        self.connection = None;
        match result {
            Ok(schema) => {
                tracing::info!(
                    tables = schema.tables.iter().filter(|t| !t.is_command()).count(),
                    query_commands = schema.tables.iter().filter(|t| t.is_command()).count(),
                    non_query_commands = schema.commands.len(),
                    "schema discovered"
                );
                Ok(schema)
            }
            Err(e) => {
                tracing::error!(error = %e, "schema discovery failed");
                Err(e)
            }
        }
    }

    async fn read_schema(&mut self) -> Result<Schema> {
        self.connection()?;
        let mut tables = if self.options.should_generate_apis_for_tables() {
            self.handle_tables().await?
        } else {
            tracing::info!("table discovery disabled, only declared commands are exposed");
            Vec::new()
        };
        let (query_tables, commands) = self.handle_commands().await?;
        tables.extend(query_tables);
        Ok(Schema { tables, commands })
    }

    /// Base tables that pass the include/exclude filters, with their columns.
    pub async fn handle_tables(&mut self) -> Result<Vec<Table>> {
        let filter = TableFilter::from_options(&self.options)?;
        let meta = self.connection()?.tables().await?;
        let qualifier_column = QUALIFIER_COLUMNS.iter().copied().find(|c| meta.has_column(c));

        let mut tables = Vec::new();
        for row in &meta.rows {
            if !is_base_table(&meta, row) {
                continue;
            }
            let Some(name) = meta.value(row, "TABLE_NAME") else {
                continue;
            };
            if !filter.includes(name) {
                tracing::debug!(table = %name, "table filtered out");
                continue;
            }
            let qualifier = qualifier_column.and_then(|c| meta.value(row, c)).unwrap_or_default();
            tables.push(Table::new(name, qualifier));
        }

        let dialect = self.connector.dialect();
        for table in &mut tables {
            let probe = Statement::positional(dialect.column_probe_sql(table.name_with_qualifier()), Vec::new());
            self.read_columns(table, &probe).await?;
        }
        Ok(tables)
    }

    /// Query commands as virtual tables; non-query commands validated and kept by name.
    pub async fn handle_commands(&mut self) -> Result<(Vec<Table>, BTreeMap<String, SqlCommand>)> {
        self.connection()?;
        let declared: Vec<(String, SqlCommand)> =
            self.options.sql_commands.iter().map(|(n, c)| (n.clone(), c.clone())).collect();
        let mut tables = Vec::new();
        let mut commands = BTreeMap::new();

        for (name, command) in declared {
            if command.is_query() {
                let probe = Statement::named(command.schema_probe_text(), placeholder_parameters(&name, &command)?);
                let mut table = Table::from_command(name.clone(), command);
                self.read_columns(&mut table, &probe).await?;
                tracing::debug!(command = %name, columns = table.columns.len(), "query command discovered");
                tables.push(table);
            } else {
                check_non_query_command(&name, &command)?;
                command.typed_parameters(&name)?;
                tracing::debug!(command = %name, verb = %command.verb(), "non-query command accepted");
                commands.insert(name, command);
            }
        }
        Ok((tables, commands))
    }

    async fn read_columns(&mut self, table: &mut Table, probe: &Statement) -> Result<()> {
        let described = self.connection()?.describe(probe).await?;
        for column in described {
            let logical_type = match column.logical_type {
                Some(t) => t,
                None => {
                    tracing::warn!(
                        table = %table.name_with_qualifier(),
                        column = %column.name,
                        type_name = %column.type_name,
                        "column type not recognised, defaulting to string"
                    );
                    LogicalType::String
                }
            };
            table.add_column(column.name, logical_type, column.nullable.unwrap_or(true));
        }
        Ok(())
    }
}

fn is_base_table(meta: &MetadataTable, row: &[Option<String>]) -> bool {
    matches!(meta.value(row, "TABLE_TYPE"), Some(t) if t.eq_ignore_ascii_case("TABLE") || t.eq_ignore_ascii_case("BASE TABLE"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SqliteConnector;

    #[tokio::test]
    async fn discovery_requires_connect() {
        let connector = Arc::new(SqliteConnector::connect_lazy("sqlite::memory:").unwrap());
        let mut reader = SchemaReader::new(DatabaseOptions::new("sqlite::memory:"), connector.clone());
        assert!(matches!(reader.handle_tables().await, Err(Error::NotConnected)));
        assert!(matches!(reader.handle_commands().await, Err(Error::NotConnected)));
        let reader = SchemaReader::new(DatabaseOptions::new("sqlite::memory:"), connector);
        assert!(matches!(reader.get_schema().await, Err(Error::NotConnected)));
    }

    #[test]
    fn base_table_types() {
        let mut meta = MetadataTable::new(&["TABLE_NAME", "TABLE_TYPE"]);
        meta.push(vec![Some("a".into()), Some("BASE TABLE".into())]);
        meta.push(vec![Some("b".into()), Some("table".into())]);
        meta.push(vec![Some("c".into()), Some("VIEW".into())]);
        meta.push(vec![Some("d".into()), Some("SYSTEM TABLE".into())]);
        meta.push(vec![Some("e".into()), None]);
        let kept: Vec<bool> = meta.rows.iter().map(|r| is_base_table(&meta, r)).collect();
        assert_eq!(kept, vec![true, true, false, false, false]);
    }
}
