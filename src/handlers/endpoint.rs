//! Endpoint handlers: list endpoints, select from tables, call commands, run raw queries.

use crate::api::{Endpoint, EndpointInfo, DIRECT_QUERY_ENDPOINT};
use crate::error::Error;
use crate::query::QueryOptions;
use crate::response::{success_many, success_one};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

fn body_to_map(value: Option<Value>) -> Result<Map<String, Value>, Error> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(m)) => Ok(m),
        Some(_) => Err(Error::translation("body must be a JSON object")),
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, Error> {
    raw.trim()
        .parse()
        .map_err(|_| Error::translation(format!("{} must be a non-negative integer", key)))
}

/// Split query-string pairs into query options (`select` or `$select`, ...) and
/// command arguments (everything else).
fn split_query(params: HashMap<String, String>) -> Result<(QueryOptions, Map<String, Value>), Error> {
    let mut options = QueryOptions::default();
    let mut args = Map::new();
    for (key, value) in params {
        match key.trim_start_matches('$').to_ascii_lowercase().as_str() {
            "select" => options.select = Some(value),
            "filter" => options.filter = Some(value),
            "orderby" => options.orderby = Some(value),
            "top" => options.top = Some(parse_u64(&key, &value)?),
            "skip" => options.skip = Some(parse_u64(&key, &value)?),
            "count" => options.count = value.is_empty() || value.eq_ignore_ascii_case("true"),
            _ => {
                args.insert(key, Value::String(value));
            }
        }
    }
    Ok((options, args))
}

async fn collect_items(stream: crate::service::QueryStream<crate::service::QueryItem>) -> Result<Vec<Value>, Error> {
    Ok(stream.collect().await?.iter().map(|item| item.to_json()).collect())
}

/// GET /endpoints
pub async fn list_endpoints(State(state): State<AppState>) -> Json<Vec<EndpointInfo>> {
    Json(state.registry.endpoints().map(|(name, e)| e.info(name)).collect())
}

/// GET /api/:endpoint
pub async fn query_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, Error> {
    let table = match state.registry.get(&name) {
        Some(Endpoint::Table(t)) => t,
        Some(Endpoint::Command(_)) => {
            return Err(Error::translation(format!("'{}' is a command; use POST", name)));
        }
        None => return Err(Error::NotFound(format!("endpoint '{}'", name))),
    };
    let (options, args) = split_query(params)?;
    let is_count = options.count;
    let stream = table.select_with_args(&options, &args)?;
    let items = collect_items(stream).await?;
    if is_count {
        let count = items.into_iter().next().unwrap_or(Value::Null);
        return Ok(success_one(count).into_response());
    }
    Ok(success_many(items).into_response())
}

/// GET /api/query, for a table that happens to be named `query`.
pub async fn query_endpoint_named_query(
    state: State<AppState>,
    params: Query<HashMap<String, String>>,
) -> Result<Response, Error> {
    query_endpoint(state, Path(DIRECT_QUERY_ENDPOINT.to_string()), params).await
}

/// POST /api/:endpoint with the command arguments as a JSON object.
pub async fn call_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Response, Error> {
    let args = body_to_map(body.map(|Json(v)| v))?;
    let stream = match state.registry.get(&name) {
        Some(Endpoint::Command(c)) => c.call(&args)?,
        Some(Endpoint::Table(t)) if t.table().is_command() => t.select_with_args(&QueryOptions::default(), &args)?,
        Some(Endpoint::Table(_)) => {
            return Err(Error::translation(format!("'{}' is a table; use GET", name)));
        }
        None => return Err(Error::NotFound(format!("endpoint '{}'", name))),
    };
    let items = collect_items(stream).await?;
    Ok(success_many(items).into_response())
}

#[derive(Deserialize)]
pub struct DirectQueryBody {
    pub query: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// POST /api/query
pub async fn direct_query(
    State(state): State<AppState>,
    Json(body): Json<DirectQueryBody>,
) -> Result<Response, Error> {
    if body.query.trim().is_empty() {
        return Err(Error::translation("query must not be empty"));
    }
    let rows = state.registry.direct_query().run(body.query, &body.parameters).collect().await?;
    Ok(success_many(rows).into_response())
}
