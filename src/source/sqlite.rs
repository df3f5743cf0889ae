//! SQLite driver over a sqlx pool.

use crate::error::{Error, Result};
use crate::schema::LogicalType;
use crate::source::{ColumnMeta, Connection, Connector, MetadataTable, RowStream, SourceRow};
use crate::sql::{BindValue, Dialect, Statement};
use async_stream::try_stream;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use std::sync::Arc;
use tokio_stream::StreamExt;

#[derive(Clone, Debug)]
pub struct SqliteConnector {
    pool: SqlitePool,
}

impl SqliteConnector {
    /// Pool that opens connections on first use. In-memory databases get a single
    /// connection that is never recycled, so every caller sees the same data.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options
            .connect_lazy(url)
            .map_err(|e| Error::configuration(format!("invalid SQLite connection string: {}", e)))?;
        Ok(SqliteConnector { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        SqliteConnector { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = self.pool.acquire().await.map_err(Error::Connection)?;
        Ok(Box::new(SqliteSession { conn }))
    }
}

struct SqliteSession {
    conn: PoolConnection<Sqlite>,
}

const TABLES_SQL: &str = "SELECT name, CASE type WHEN 'table' THEN 'TABLE' ELSE 'VIEW' END \
                          FROM sqlite_master \
                          WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                          ORDER BY name";

#[async_trait]
impl Connection for SqliteSession {
    async fn tables(&mut self) -> Result<MetadataTable> {
        tracing::debug!(sql = %TABLES_SQL, "query");
        let rows = sqlx::query(TABLES_SQL).fetch_all(&mut *self.conn).await?;
        let mut meta = MetadataTable::new(&["TABLE_NAME", "TABLE_TYPE"]);
        for row in rows {
            meta.push(vec![
                row.try_get::<Option<String>, _>(0)?,
                row.try_get::<Option<String>, _>(1)?,
            ]);
        }
        Ok(meta)
    }

    async fn describe(&mut self, statement: &Statement) -> Result<Vec<ColumnMeta>> {
        let (sql, _) = statement.prepare(Dialect::Sqlite)?;
        tracing::debug!(sql = %sql, "describe");
        let described = (&mut *self.conn).describe(&sql).await?;
        Ok(described
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let type_name = c.type_info().name().to_string();
                ColumnMeta {
                    name: c.name().to_string(),
                    logical_type: logical_type(&type_name),
                    type_name,
                    nullable: described.nullable(i),
                }
            })
            .collect())
    }

    fn fetch<'c>(&'c mut self, statement: &'c Statement) -> RowStream<'c> {
        Box::pin(try_stream! {
            let (sql, values) = statement.prepare(Dialect::Sqlite)?;
            tracing::debug!(sql = %sql, params = ?values, "query");
            let mut query = sqlx::query(&sql);
            for value in values {
                query = bind(query, value);
            }
            let mut rows = query.fetch(&mut *self.conn);
            let mut names: Option<Arc<[String]>> = None;
            while let Some(row) = rows.next().await {
                let row = row?;
                let columns = names
                    .get_or_insert_with(|| row.columns().iter().map(|c| c.name().to_string()).collect())
                    .clone();
                let cells = (0..row.len()).map(|i| decode_cell(&row, i)).collect();
                yield SourceRow { columns, cells };
            }
        })
    }
}

/// Declared column types, after sqlx's affinity mapping. `NULL` means the
/// driver could not tell (expressions, untyped columns).
fn logical_type(type_name: &str) -> Option<LogicalType> {
    Some(match type_name {
        "TEXT" => LogicalType::String,
        "INTEGER" => LogicalType::Integer,
        "REAL" => LogicalType::Float,
        "NUMERIC" => LogicalType::Decimal,
        "BOOLEAN" => LogicalType::Boolean,
        "DATETIME" => LogicalType::DateTime,
        "DATE" => LogicalType::Date,
        "TIME" => LogicalType::Time,
        "BLOB" => LogicalType::Binary,
        _ => return None,
    })
}

fn bind<'q>(query: Query<'q, Sqlite, SqliteArguments<'q>>, value: BindValue) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        BindValue::Null => query.bind(None::<String>),
        BindValue::Bool(b) => query.bind(b),
        BindValue::I64(n) => query.bind(n),
        BindValue::F64(n) => query.bind(n),
        BindValue::Decimal(d) => query.bind(d.to_string()),
        BindValue::String(s) => query.bind(s),
        BindValue::Uuid(u) => query.bind(u.to_string()),
        BindValue::DateTime(d) => query.bind(d),
        BindValue::Date(d) => query.bind(d),
        BindValue::Time(t) => query.bind(t),
        BindValue::Bytes(b) => query.bind(b),
        BindValue::Json(v) => query.bind(v.to_string()),
    }
}

fn decode_cell(row: &SqliteRow, i: usize) -> std::result::Result<Value, String> {
    let raw = row.try_get_raw(i).map_err(|e| e.to_string())?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();
    let declared = row.columns()[i].type_info().name().to_string();
    let err = |e: sqlx::Error| e.to_string();
    match (storage.as_str(), declared.as_str()) {
        ("INTEGER", "BOOLEAN") => row.try_get_unchecked::<bool, _>(i).map(Value::Bool).map_err(err),
        ("INTEGER", _) => row.try_get_unchecked::<i64, _>(i).map(Value::from).map_err(err),
        ("REAL", _) => {
            let n = row.try_get_unchecked::<f64, _>(i).map_err(err)?;
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| format!("non-finite float {}", n))
        }
        ("BLOB", _) => row
            .try_get_unchecked::<Vec<u8>, _>(i)
            .map(|b| Value::Array(b.into_iter().map(Value::from).collect()))
            .map_err(err),
        _ => row.try_get_unchecked::<String, _>(i).map(Value::String).map_err(err),
    }
}
