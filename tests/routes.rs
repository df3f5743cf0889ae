mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use dbapi_sdk::config::{DatabaseOptions, SqlCommand, SqlCommandParameter};
use dbapi_sdk::source::Connector;
use dbapi_sdk::sql::{Dialect, ODataCompiler, SqlCompiler};
use dbapi_sdk::{api_routes, common_routes_with_ready, generate, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    common::init_tracing();
    let connector: Arc<dyn Connector> = common::people_db().await;
    let mut options = DatabaseOptions::new("sqlite::memory:");
    options.tables = Some(vec!["people".into()]);
    options.trim_strings = true;
    options.sql_commands.insert(
        "byCity".into(),
        SqlCommand::new("SELECT id, name FROM people WHERE city = @city ORDER BY id")
            .with_parameter(SqlCommandParameter::new("city", "string")),
    );
    options.sql_commands.insert(
        "rename".into(),
        SqlCommand::new("UPDATE people SET name = @name WHERE id = @id")
            .with_parameter(SqlCommandParameter::new("id", "int"))
            .with_parameter(SqlCommandParameter::new("name", "string")),
    );
    let compiler: Arc<dyn SqlCompiler> = Arc::new(ODataCompiler::new(Dialect::Sqlite));
    let registry = generate(options, connector, compiler).await.unwrap();
    let state = AppState::new(registry);
    Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(api_routes(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

#[tokio::test]
async fn health_and_ready() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, body) = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], json!("ok"));
    assert_eq!(body["endpoints"], json!(3));
}

#[tokio::test]
async fn lists_generated_endpoints() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/endpoints", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body.as_array().unwrap().iter().map(|e| e["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["byCity", "people", "rename"]);
    assert_eq!(body[0]["kind"], json!("query_command"));
    assert_eq!(body[0]["parameters"], json!(["city"]));
    assert_eq!(body[1]["kind"], json!("table"));
    assert_eq!(body[1]["fields"][1]["type"], json!("string"));
    assert_eq!(body[2]["kind"], json!("command"));
}

#[tokio::test]
async fn selects_from_a_table() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/people?$select=name,age&$filter=city%20eq%20%27Oslo%27&$orderby=id",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "data": [{"name": "Ann", "age": 34}, {"name": "Cid", "age": 41}],
            "meta": {"count": 2}
        })
    );
}

#[tokio::test]
async fn counts_rows() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/people?$count=true&$filter=age%20lt%2030", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"data": 2}));
}

#[tokio::test]
async fn query_commands_accept_arguments_by_get_and_post() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/byCity?city=Oslo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], json!(2));

    let (status, body) = send(&app, Method::POST, "/api/byCity", Some(json!({"city": "Rome"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"id": 2, "name": "Bob"}]));
}

#[tokio::test]
async fn commands_run_by_post() {
    let app = app().await;
    let (status, body) = send(&app, Method::POST, "/api/rename", Some(json!({"id": 2, "name": "Bo"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], json!(0));

    let (_, body) = send(&app, Method::GET, "/api/people?$select=name&$filter=id%20eq%202", None).await;
    assert_eq!(body["data"], json!([{"name": "Bo"}]));

    let (status, body) = send(&app, Method::GET, "/api/rename", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("bad_request"));
}

#[tokio::test]
async fn runs_direct_queries() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/query",
        Some(json!({"query": "SELECT COUNT(*) AS n FROM people WHERE age >= @min", "parameters": {"min": 30}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"n": 3}]));

    let (status, _) = send(&app, Method::POST, "/api/query", Some(json!({"query": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn errors_use_the_envelope() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));

    let (status, body) = send(&app, Method::GET, "/api/people?$select=salary", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("salary"));

    let (status, _) = send(&app, Method::GET, "/api/people?region=north", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
