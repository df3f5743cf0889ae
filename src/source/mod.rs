//! Data-source seam: connectors hand out connections that enumerate tables,
//! describe statements and stream rows.

mod postgres;
mod sqlite;

pub use postgres::PostgresConnector;
pub use sqlite::SqliteConnector;

use crate::config::DatabaseOptions;
use crate::error::{Error, Result};
use crate::schema::LogicalType;
use crate::sql::{Dialect, Statement};
use async_trait::async_trait;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};

/// Metadata rows as reported by the source, with its own column names
/// (`TABLE_NAME`, `TABLE_TYPE`, and whichever qualifier columns it exposes).
#[derive(Clone, Debug, Default)]
pub struct MetadataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl MetadataTable {
    pub fn new(columns: &[&str]) -> Self {
        MetadataTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Option<String>>) {
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn value<'a>(&self, row: &'a [Option<String>], column: &str) -> Option<&'a str> {
        self.column_index(column)
            .and_then(|i| row.get(i))
            .and_then(|v| v.as_deref())
    }
}

/// Result column metadata obtained without reading data.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_name: String,
    /// None when the driver reports no type the crate recognises.
    pub logical_type: Option<LogicalType>,
    pub nullable: Option<bool>,
}

/// One fetched row. Cells decode independently so a bad value fails only its row.
#[derive(Clone, Debug)]
pub struct SourceRow {
    pub columns: Arc<[String]>,
    pub cells: Vec<std::result::Result<Value, String>>,
}

impl SourceRow {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Decoded value of cell `i`, or a row-mapping error naming the column.
    pub fn get(&self, i: usize) -> Result<Value> {
        let column = self.columns.get(i).cloned().unwrap_or_else(|| format!("#{}", i));
        match self.cells.get(i) {
            Some(Ok(v)) => Ok(v.clone()),
            Some(Err(message)) => Err(Error::RowMapping {
                column,
                message: message.clone(),
            }),
            None => Err(Error::RowMapping {
                column,
                message: "column index out of range".into(),
            }),
        }
    }
}

pub type RowStream<'c> = Pin<Box<dyn Stream<Item = Result<SourceRow>> + Send + 'c>>;

/// An open, exclusively owned connection. Dropping it releases it.
#[async_trait]
pub trait Connection: Send {
    /// Physical tables and views known to the source.
    async fn tables(&mut self) -> Result<MetadataTable>;

    /// Result columns of a statement, without executing it for data.
    async fn describe(&mut self, statement: &Statement) -> Result<Vec<ColumnMeta>>;

    /// Lazily executes a statement; rows are pulled as the stream is polled.
    fn fetch<'c>(&'c mut self, statement: &'c Statement) -> RowStream<'c>;

    /// First column of the first row, or null when there is none.
    async fn fetch_scalar(&mut self, statement: &Statement) -> Result<Value> {
        let mut rows = self.fetch(statement);
        match rows.next().await {
            Some(row) => {
                let row = row?;
                if row.is_empty() {
                    Ok(Value::Null)
                } else {
                    row.get(0)
                }
            }
            None => Ok(Value::Null),
        }
    }
}

/// Connection factory for one data source.
#[async_trait]
pub trait Connector: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// Pick a driver from the connection-string scheme.
pub fn connector_for(options: &DatabaseOptions) -> Result<Arc<dyn Connector>> {
    if options.connection_string.trim().is_empty() {
        return Err(Error::configuration("connection string is empty"));
    }
    match Dialect::from_connection_string(&options.connection_string)? {
        Dialect::Postgres => Ok(Arc::new(PostgresConnector::connect_lazy(&options.connection_string)?)),
        Dialect::Sqlite => Ok(Arc::new(SqliteConnector::connect_lazy(&options.connection_string)?)),
        other => Err(Error::configuration(format!(
            "no driver available for {:?}; supply a custom Connector",
            other
        ))),
    }
}
