//! PostgreSQL driver over a sqlx pool.

use crate::error::{Error, Result};
use crate::schema::LogicalType;
use crate::source::{ColumnMeta, Connection, Connector, MetadataTable, RowStream, SourceRow};
use crate::sql::{BindValue, Dialect, Statement};
use async_stream::try_stream;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, PgTypeInfo, Postgres};
use sqlx::query::Query;
use sqlx::{Column, Database, Executor, Row, TypeInfo, ValueRef};
use std::sync::Arc;
use tokio_stream::StreamExt;

#[derive(Clone, Debug)]
pub struct PostgresConnector {
    pool: PgPool,
}

impl PostgresConnector {
    /// Pool that opens connections on first use.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_lazy(url)
            .map_err(|e| Error::configuration(format!("invalid PostgreSQL connection string: {}", e)))?;
        Ok(PostgresConnector { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PostgresConnector { pool }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn = self.pool.acquire().await.map_err(Error::Connection)?;
        Ok(Box::new(PgSession { conn }))
    }
}

struct PgSession {
    conn: PoolConnection<Postgres>,
}

const TABLES_SQL: &str = r#"SELECT table_schema::text AS "TABLE_SCHEMA",
       table_name::text AS "TABLE_NAME",
       table_type::text AS "TABLE_TYPE"
FROM information_schema.tables
WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
ORDER BY table_schema, table_name"#;

#[async_trait]
impl Connection for PgSession {
    async fn tables(&mut self) -> Result<MetadataTable> {
        tracing::debug!(sql = %TABLES_SQL, "query");
        let rows = sqlx::query(TABLES_SQL).fetch_all(&mut *self.conn).await?;
        let mut meta = MetadataTable::new(&["TABLE_SCHEMA", "TABLE_NAME", "TABLE_TYPE"]);
        for row in rows {
            meta.push(vec![
                row.try_get::<Option<String>, _>(0)?,
                row.try_get::<Option<String>, _>(1)?,
                row.try_get::<Option<String>, _>(2)?,
            ]);
        }
        Ok(meta)
    }

    async fn describe(&mut self, statement: &Statement) -> Result<Vec<ColumnMeta>> {
        let (sql, _) = statement.prepare(Dialect::Postgres)?;
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
            let (sql, values) = statement.prepare(Dialect::Postgres)?;
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

fn logical_type(type_name: &str) -> Option<LogicalType> {
    Some(match type_name {
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => LogicalType::String,
        "INT2" | "INT4" | "INT8" | "OID" => LogicalType::Integer,
        "FLOAT4" | "FLOAT8" => LogicalType::Float,
        "NUMERIC" | "MONEY" => LogicalType::Decimal,
        "BOOL" => LogicalType::Boolean,
        "TIMESTAMPTZ" | "TIMESTAMP" => LogicalType::DateTime,
        "DATE" => LogicalType::Date,
        "TIME" | "TIMETZ" => LogicalType::Time,
        "UUID" => LogicalType::Uuid,
        "JSON" | "JSONB" => LogicalType::Json,
        "BYTEA" => LogicalType::Binary,
        _ => return None,
    })
}

/// Null whose type the server infers from context.
struct UntypedNull;

impl<'q> Encode<'q, Postgres> for UntypedNull {
    fn encode_by_ref(
        &self,
        _buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(IsNull::Yes)
    }
}

impl sqlx::Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

fn bind<'q>(query: Query<'q, Postgres, PgArguments>, value: BindValue) -> Query<'q, Postgres, PgArguments> {
    match value {
        BindValue::Null => query.bind(UntypedNull),
        BindValue::Bool(b) => query.bind(b),
        BindValue::I64(n) => query.bind(n),
        BindValue::F64(n) => query.bind(n),
        BindValue::Decimal(d) => query.bind(d),
        BindValue::String(s) => query.bind(s),
        BindValue::Uuid(u) => query.bind(u),
        BindValue::DateTime(d) => query.bind(d),
        BindValue::Date(d) => query.bind(d),
        BindValue::Time(t) => query.bind(t),
        BindValue::Bytes(b) => query.bind(b),
        BindValue::Json(v) => query.bind(v),
    }
}

fn decode_cell(row: &PgRow, i: usize) -> std::result::Result<Value, String> {
    let raw = row.try_get_raw(i).map_err(|e| e.to_string())?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let err = |e: sqlx::Error| e.to_string();
    let float = |n: f64| {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| format!("non-finite float {}", n))
    };
    match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(i).map(Value::Bool).map_err(err),
        "INT2" => row.try_get::<i16, _>(i).map(Value::from).map_err(err),
        "INT4" => row.try_get::<i32, _>(i).map(Value::from).map_err(err),
        "INT8" => row.try_get::<i64, _>(i).map(Value::from).map_err(err),
        "FLOAT4" => float(row.try_get::<f32, _>(i).map_err(err)? as f64),
        "FLOAT8" => float(row.try_get::<f64, _>(i).map_err(err)?),
        "NUMERIC" => row
            .try_get::<rust_decimal::Decimal, _>(i)
            .map(|d| Value::String(d.to_string()))
            .map_err(err),
        "UUID" => row.try_get::<uuid::Uuid, _>(i).map(|u| Value::String(u.to_string())).map_err(err),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
            .map(|d| Value::String(d.to_rfc3339()))
            .map_err(err),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(i)
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .map_err(err),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(i)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .map_err(err),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(i)
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
            .map_err(err),
        "JSON" | "JSONB" => row.try_get::<Value, _>(i).map_err(err),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(i)
            .map(|b| Value::Array(b.into_iter().map(Value::from).collect()))
            .map_err(err),
        other => row
            .try_get_unchecked::<String, _>(i)
            .map(Value::String)
            .map_err(|e| format!("unsupported column type {}: {}", other, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_type_names() {
        assert_eq!(logical_type("INT4"), Some(LogicalType::Integer));
        assert_eq!(logical_type("NUMERIC"), Some(LogicalType::Decimal));
        assert_eq!(logical_type("TIMESTAMPTZ"), Some(LogicalType::DateTime));
        assert_eq!(logical_type("TSVECTOR"), None);
    }

    #[tokio::test]
    async fn lazy_pool_rejects_garbage_urls() {
        assert!(matches!(
            PostgresConnector::connect_lazy("not a url"),
            Err(Error::Configuration(_))
        ));
        assert!(PostgresConnector::connect_lazy("postgres://user@localhost:1/db").is_ok());
    }
}
