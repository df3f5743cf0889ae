#![allow(dead_code)]

use async_trait::async_trait;
use dbapi_sdk::error::Result;
use dbapi_sdk::schema::LogicalType;
use dbapi_sdk::source::{ColumnMeta, Connection, Connector, MetadataTable, RowStream, SourceRow, SqliteConnector};
use dbapi_sdk::sql::{Dialect, Statement};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory data source with scripted metadata and rows.
#[derive(Clone, Default)]
pub struct FakeConnector {
    pub tables: MetadataTable,
    /// Columns returned by `describe`, chosen by the first key the SQL contains.
    pub columns: Vec<(String, Vec<ColumnMeta>)>,
    pub rows: Vec<SourceRow>,
    pub log: Arc<Mutex<Vec<String>>>,
    pub connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn with_columns(mut self, sql_contains: &str, columns: Vec<ColumnMeta>) -> Self {
        self.columns.push((sql_contains.to_string(), columns));
        self
    }

    pub fn with_rows(mut self, rows: Vec<SourceRow>) -> Self {
        self.rows = rows;
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Connection for FakeConnector {
    async fn tables(&mut self) -> Result<MetadataTable> {
        self.log.lock().unwrap().push("<tables>".into());
        Ok(self.tables.clone())
    }

    async fn describe(&mut self, statement: &Statement) -> Result<Vec<ColumnMeta>> {
        let (sql, values) = statement.prepare(Dialect::Sqlite)?;
        self.log.lock().unwrap().push(format!("describe {} {:?}", sql, values));
        Ok(self
            .columns
            .iter()
            .find(|(key, _)| sql.contains(key.as_str()))
            .map(|(_, cols)| cols.clone())
            .unwrap_or_default())
    }

    fn fetch<'c>(&'c mut self, statement: &'c Statement) -> RowStream<'c> {
        self.log.lock().unwrap().push(format!("fetch {}", statement.sql));
        Box::pin(tokio_stream::iter(self.rows.clone().into_iter().map(Ok::<SourceRow, dbapi_sdk::Error>)))
    }
}

pub fn column(name: &str, logical_type: Option<LogicalType>) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        type_name: logical_type.map(|t| t.to_string().to_uppercase()).unwrap_or_else(|| "NULL".into()),
        logical_type,
        nullable: Some(true),
    }
}

pub fn metadata(columns: &[&str], rows: &[&[Option<&str>]]) -> MetadataTable {
    let mut meta = MetadataTable::new(columns);
    for row in rows {
        meta.push(row.iter().map(|c| c.map(str::to_string)).collect());
    }
    meta
}

pub fn source_row(columns: &[&str], cells: Vec<std::result::Result<Value, String>>) -> SourceRow {
    SourceRow {
        columns: Arc::from(columns.iter().map(|c| c.to_string()).collect::<Vec<_>>()),
        cells,
    }
}

/// Fresh in-memory SQLite database with a five-column `people` table and a `notes` table.
pub async fn people_db() -> Arc<SqliteConnector> {
    let connector = SqliteConnector::connect_lazy("sqlite::memory:").unwrap();
    for sql in [
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT, age INTEGER, score REAL)",
        "INSERT INTO people (id, name, city, age, score) VALUES \
            (1, '  Ann  ', 'Oslo', 34, 1.5), \
            (2, 'Bob', 'Rome', 25, 2.5), \
            (3, 'Cid', 'Oslo', 41, NULL), \
            (4, 'Dee', NULL, 19, 3.25), \
            (5, 'Eve', 'Lima', 30, 0.5)",
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)",
        "CREATE TABLE notes_archive (id INTEGER PRIMARY KEY, body TEXT)",
    ] {
        sqlx::query(sql).execute(connector.pool()).await.unwrap();
    }
    Arc::new(connector)
}
