//! dbapi SDK: discovers a relational database at runtime and serves every table
//! and declared command as a queryable, strongly shaped endpoint.

pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod query;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod shape;
pub mod source;
pub mod sql;
pub mod state;

pub use api::{generate, ApiRegistry, CommandApi, DirectQueryApi, Endpoint, TableApi};
pub use config::{load_options, DatabaseOptions, SqlCommand, SqlCommandParameter};
pub use error::{Error, Result};
pub use query::{QueryOptions, TranslatedQuery};
pub use response::{success_many, success_one};
pub use routes::{api_routes, common_routes, common_routes_with_ready};
pub use schema::{Schema, SchemaReader};
pub use service::{QueryExecutor, QueryItem, QueryStream};
pub use shape::{Record, Shape, ShapeCache};
pub use source::{connector_for, Connection, Connector};
pub use state::AppState;
