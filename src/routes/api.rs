//! Endpoint routes built from the registry.
//! `/api/:endpoint` serves tables (GET) and commands (POST); `/api/query` runs raw SQL.

use crate::handlers::endpoint::{
    call_endpoint, direct_query, list_endpoints, query_endpoint, query_endpoint_named_query,
};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/endpoints", get(list_endpoints))
        .route("/api/query", post(direct_query).get(query_endpoint_named_query))
        .route("/api/:endpoint", get(query_endpoint).post(call_endpoint))
        .with_state(state)
}
