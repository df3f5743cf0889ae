//! Example consumer: discovers the database named by the options file and serves
//! every table and command over HTTP.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! `DBAPI_OPTIONS` points at an options JSON file; without it `DATABASE_URL` is
//! used with default options.

use axum::Router;
use dbapi_sdk::{api_routes, common_routes_with_ready, load_options, ApiRegistry, AppState, DatabaseOptions};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dbapi_sdk=info")),
        )
        .init();

    let options = match std::env::var("DBAPI_OPTIONS") {
        Ok(path) => load_options(path).await?,
        Err(_) => DatabaseOptions::new(
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://dbapi.db?mode=rwc".into()),
        ),
    };

    let registry = ApiRegistry::discover(options).await?;
    let state = AppState::new(registry);

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(api_routes(state));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
