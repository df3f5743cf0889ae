//! Streaming executor: runs translated queries and maps rows into shapes.

use crate::config::DatabaseOptions;
use crate::error::{Error, Result};
use crate::query::TranslatedQuery;
use crate::schema::LogicalType;
use crate::service::QueryStream;
use crate::shape::{field_name, Field, Record, Shape, ShapeCache};
use crate::source::{Connector, SourceRow};
use crate::sql::{BindValue, Dialect, Statement};
use async_stream::try_stream;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

/// One item of a typed query result.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum QueryItem {
    Record(Record),
    /// Row count of a count query.
    Scalar(Value),
}

impl QueryItem {
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            QueryItem::Record(r) => Some(r),
            QueryItem::Scalar(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            QueryItem::Record(r) => r.to_json(),
            QueryItem::Scalar(v) => v.clone(),
        }
    }
}

#[derive(Default)]
pub struct QueryExecutorBuilder {
    options: Option<DatabaseOptions>,
    connector: Option<Arc<dyn Connector>>,
    cache: Option<Arc<ShapeCache>>,
}

impl QueryExecutorBuilder {
    pub fn options(mut self, options: DatabaseOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Share a projection cache with other executors. A fresh one is created otherwise.
    pub fn cache(mut self, cache: Arc<ShapeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<QueryExecutor> {
        let options = self
            .options
            .ok_or_else(|| Error::configuration("query executor needs database options"))?;
        let connector = self
            .connector
            .ok_or_else(|| Error::configuration("query executor needs a connector"))?;
        Ok(QueryExecutor {
            options: Arc::new(options),
            connector,
            cache: self.cache.unwrap_or_default(),
        })
    }
}

/// Executes statements against one data source. Every call opens its own
/// connection, held until the returned stream finishes or is dropped.
#[derive(Clone)]
pub struct QueryExecutor {
    options: Arc<DatabaseOptions>,
    connector: Arc<dyn Connector>,
    cache: Arc<ShapeCache>,
}

impl QueryExecutor {
    pub fn builder() -> QueryExecutorBuilder {
        QueryExecutorBuilder::default()
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<ShapeCache> {
        &self.cache
    }

    pub fn dialect(&self) -> Dialect {
        self.connector.dialect()
    }

    /// Run a translated query. Count queries yield one scalar; everything else
    /// yields one record per row in `base`, or in its projection onto the
    /// requested fields. Any failure ends the stream with that error.
    pub fn execute(&self, query: TranslatedQuery, base: Arc<Shape>) -> Result<QueryStream<QueryItem>> {
        tracing::debug!(sql = %query.sql(), params = ?query.statement.params, count = query.is_count, "execute");
        let connector = self.connector.clone();
        let timeout = self.options.command_timeout();
        let statement = query.statement;

        if query.is_count {
            return Ok(QueryStream::from_stream(try_stream! {
                let mut conn = connector.connect().await?;
                let value = timed(timeout, conn.fetch_scalar(&statement)).await?;
                let value = value?;
                yield QueryItem::Scalar(value);
            }));
        }

        let shape = if base.covers_all(&query.fields) {
            base
        } else {
            self.cache.get_or_create_projection(&base, &query.fields)?
        };
        let trim = self.options.trim_strings;

        Ok(QueryStream::from_stream(try_stream! {
            let mut conn = connector.connect().await?;
            let mut rows = conn.fetch(&statement);
            let mut active = shape;
            let mut positions: Option<Vec<usize>> = None;
            while let Some(row) = timed(timeout, rows.next()).await? {
                let row = row?;
                if positions.is_none() {
                    if active.is_empty() && !row.is_empty() {
                        active = Arc::new(shape_of_row(active.id(), &row));
                    }
                    positions = Some(resolve_positions(&active, &row)?);
                }
                let record = map_record(&active, &row, positions.as_deref().unwrap_or_default(), trim)?;
                tracing::trace!(shape = %active.id(), "row");
                yield QueryItem::Record(record);
            }
        }))
    }

    /// Run arbitrary SQL with `@name` parameters. Each row becomes a column-to-value
    /// map; rows with a cell that cannot be read are logged and skipped.
    pub fn run_direct_query(&self, sql: impl Into<String>, parameters: &Map<String, Value>) -> QueryStream<Map<String, Value>> {
        let params = parameters
            .iter()
            .map(|(name, value)| (name.clone(), BindValue::from_json(value)))
            .collect();
        let statement = Statement::named(sql, params);
        tracing::debug!(sql = %statement.sql, params = ?statement.params, "direct query");
        let connector = self.connector.clone();
        let timeout = self.options.command_timeout();

        QueryStream::from_stream(try_stream! {
            let mut conn = connector.connect().await?;
            let mut rows = conn.fetch(&statement);
            let mut index = 0usize;
            while let Some(row) = timed(timeout, rows.next()).await? {
                let row = row?;
                index += 1;
                match row_to_map(&row) {
                    Ok(map) => {
                        yield map;
                    }
                    Err(e) => {
                        tracing::warn!(row = index, error = %e, "skipping row that could not be read");
                    }
                }
            }
        })
    }
}

async fn timed<F: Future>(timeout: Option<Duration>, fut: F) -> Result<F::Output> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| Error::Timeout(limit)),
        None => Ok(fut.await),
    }
}

/// Shape for statements that were not probed, taken from the result columns.
fn shape_of_row(id: &str, row: &SourceRow) -> Shape {
    let fields = row
        .columns
        .iter()
        .map(|c| Field {
            name: field_name(c),
            column: c.clone(),
            logical_type: LogicalType::String,
            is_nullable: true,
        })
        .collect();
    Shape::new(id, id, fields)
}

fn resolve_positions(shape: &Shape, row: &SourceRow) -> Result<Vec<usize>> {
    shape
        .fields()
        .iter()
        .map(|f| {
            row.index_of(&f.column).ok_or_else(|| Error::RowMapping {
                column: f.column.clone(),
                message: "column missing from result".into(),
            })
        })
        .collect()
}

fn map_record(shape: &Arc<Shape>, row: &SourceRow, positions: &[usize], trim: bool) -> Result<Record> {
    let mut record = Record::new(shape.clone());
    for (i, &pos) in positions.iter().enumerate() {
        let value = match row.get(pos)? {
            Value::String(s) if trim => Value::String(s.trim().to_string()),
            other => other,
        };
        record.set(i, value);
    }
    Ok(record)
}

fn row_to_map(row: &SourceRow) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for (i, column) in row.columns.iter().enumerate() {
        map.insert(column.clone(), row.get(i)?);
    }
    Ok(map)
}
