//! API surface: one handler per discovered table or declared command, collected
//! into a registry.

use crate::config::{validate, DatabaseOptions, SqlCommand};
use crate::error::{Error, Result};
use crate::query::{translate_command, translate_table, QueryOptions};
use crate::schema::{Schema, SchemaReader, Table};
use crate::service::{QueryExecutor, QueryItem, QueryStream};
use crate::shape::{Shape, ShapeCache};
use crate::source::{connector_for, Connector};
use crate::sql::{ODataCompiler, SqlCompiler};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Endpoint name reserved for the raw-query handler.
pub const DIRECT_QUERY_ENDPOINT: &str = "query";

/// Handler for a physical table or a query command.
pub struct TableApi {
    table: Table,
    shape: Arc<Shape>,
    executor: QueryExecutor,
    compiler: Arc<dyn SqlCompiler>,
}

impl TableApi {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Source column name to exposed field name.
    pub fn field_map(&self) -> Vec<(&str, &str)> {
        self.shape.fields().iter().map(|f| (f.column.as_str(), f.name.as_str())).collect()
    }

    pub fn command_text(&self) -> Option<&str> {
        self.table.command.as_ref().map(|c| c.command_text.as_str())
    }

    pub fn select(&self, options: &QueryOptions) -> Result<QueryStream<QueryItem>> {
        self.select_with_args(options, &Map::new())
    }

    /// Select with command arguments; only query commands accept arguments.
    pub fn select_with_args(&self, options: &QueryOptions, args: &Map<String, Value>) -> Result<QueryStream<QueryItem>> {
        let query = translate_table(&self.table, &self.shape, options, args, self.compiler.as_ref())?;
        self.executor.execute(query, self.shape.clone())
    }
}

/// Handler for a non-query command.
pub struct CommandApi {
    name: String,
    command: SqlCommand,
    shape: Arc<Shape>,
    executor: QueryExecutor,
}

impl CommandApi {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &SqlCommand {
        &self.command
    }

    /// Run the command with declared parameters taken from `args`. Rows the
    /// statement returns, if any, are streamed back.
    pub fn call(&self, args: &Map<String, Value>) -> Result<QueryStream<QueryItem>> {
        let query = translate_command(&self.name, &self.command, args)?;
        self.executor.execute(query, self.shape.clone())
    }
}

/// Handler for arbitrary SQL.
pub struct DirectQueryApi {
    executor: QueryExecutor,
}

impl DirectQueryApi {
    pub fn run(&self, sql: impl Into<String>, parameters: &Map<String, Value>) -> QueryStream<Map<String, Value>> {
        self.executor.run_direct_query(sql, parameters)
    }
}

pub enum Endpoint {
    Table(TableApi),
    Command(CommandApi),
}

/// Listing entry for an endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct EndpointInfo {
    pub name: String,
    pub kind: &'static str,
    pub type_name: String,
    pub fields: Vec<FieldInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub column: String,
    #[serde(rename = "type")]
    pub logical_type: String,
    pub nullable: bool,
}

impl Endpoint {
    pub fn info(&self, name: &str) -> EndpointInfo {
        let (kind, shape, parameters) = match self {
            Endpoint::Table(t) if t.table.is_command() => (
                "query_command",
                &t.shape,
                t.table.command.iter().flat_map(|c| c.parameters.iter().map(|p| p.name.clone())).collect(),
            ),
            Endpoint::Table(t) => ("table", &t.shape, Vec::new()),
            Endpoint::Command(c) => (
                "command",
                &c.shape,
                c.command.parameters.iter().map(|p| p.name.clone()).collect(),
            ),
        };
        EndpointInfo {
            name: name.to_string(),
            kind,
            type_name: shape.type_name().to_string(),
            fields: shape
                .fields()
                .iter()
                .map(|f| FieldInfo {
                    name: f.name.clone(),
                    column: f.column.clone(),
                    logical_type: f.logical_type.to_string(),
                    nullable: f.is_nullable,
                })
                .collect(),
            parameters,
        }
    }
}

/// Every generated handler, by endpoint name.
pub struct ApiRegistry {
    endpoints: BTreeMap<String, Endpoint>,
    direct: DirectQueryApi,
    cache: Arc<ShapeCache>,
}

impl ApiRegistry {
    /// Build handlers for a discovered schema. Physical tables whose names clash
    /// across qualifiers are keyed by their qualified name.
    pub fn from_schema(schema: Schema, executor: QueryExecutor, compiler: Arc<dyn SqlCompiler>) -> Result<Self> {
        let mut name_counts: HashMap<String, usize> = HashMap::new();
        for table in schema.tables.iter().filter(|t| !t.is_command()) {
            *name_counts.entry(table.name().to_string()).or_default() += 1;
        }

        let mut endpoints = BTreeMap::new();
        for table in schema.tables {
            let key = if !table.is_command() && name_counts.get(table.name()).copied().unwrap_or(0) > 1 {
                table.name_with_qualifier().to_string()
            } else {
                table.name().to_string()
            };
            if endpoints.contains_key(&key) {
                return Err(Error::configuration(format!("more than one endpoint named '{}'", key)));
            }
            let api = TableApi {
                shape: Arc::new(Shape::for_table(&table)),
                table,
                executor: executor.clone(),
                compiler: compiler.clone(),
            };
            endpoints.insert(key, Endpoint::Table(api));
        }

        for (name, command) in schema.commands {
            if endpoints.contains_key(&name) || name == DIRECT_QUERY_ENDPOINT {
                return Err(Error::configuration(format!("command '{}' clashes with another endpoint", name)));
            }
            let api = CommandApi {
                shape: Arc::new(Shape::empty(name.clone())),
                name: name.clone(),
                command,
                executor: executor.clone(),
            };
            endpoints.insert(name, Endpoint::Command(api));
        }

        Ok(ApiRegistry {
            endpoints,
            cache: executor.cache().clone(),
            direct: DirectQueryApi { executor },
        })
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    pub fn table(&self, name: &str) -> Option<&TableApi> {
        match self.endpoints.get(name) {
            Some(Endpoint::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn command(&self, name: &str) -> Option<&CommandApi> {
        match self.endpoints.get(name) {
            Some(Endpoint::Command(c)) => Some(c),
            _ => None,
        }
    }

    pub fn direct_query(&self) -> &DirectQueryApi {
        &self.direct
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = (&str, &Endpoint)> {
        self.endpoints.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn shape_cache(&self) -> &Arc<ShapeCache> {
        &self.cache
    }

    /// Discover with the driver and compiler the connection string implies.
    pub async fn discover(options: DatabaseOptions) -> Result<Self> {
        validate(&options)?;
        let connector = connector_for(&options)?;
        let compiler: Arc<dyn SqlCompiler> = Arc::new(ODataCompiler::new(connector.dialect()));
        generate(options, connector, compiler).await
    }
}

/// Run discovery against `connector` and build the handler registry.
pub async fn generate(
    options: DatabaseOptions,
    connector: Arc<dyn Connector>,
    compiler: Arc<dyn SqlCompiler>,
) -> Result<ApiRegistry> {
    validate(&options)?;
    let mut reader = SchemaReader::new(options.clone(), connector.clone());
    reader.connect().await?;
    let schema = reader.get_schema().await?;

    let executor = QueryExecutor::builder().options(options).connector(connector).build()?;
    let registry = ApiRegistry::from_schema(schema, executor, compiler)?;
    tracing::info!(endpoints = registry.len(), "api registry generated");
    Ok(registry)
}
