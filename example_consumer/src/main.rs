//! Example consumer: a separate Rust project that uses resource-actions as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use resource_actions::{
    load_from_path, resolve, ActionError, ActionInput, ActionSettings, Actions, Output, Paginate, PgStore, Record,
    ResourceSpec,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;

type AppState = Arc<Actions<PgStore>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    skip: Option<u64>,
    limit: Option<u64>,
    order_by: Option<String>,
    /// `native` (default) or `json-api`.
    output: Option<Output>,
}

async fn list_items(
    State(actions): State<AppState>,
    Path(model): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ActionError> {
    let spec = ResourceSpec::new(model);
    let mut input = ActionInput::new();
    input.paginate = Some(Paginate {
        skip: params.skip,
        limit: params.limit,
    });
    input.order_by = params.order_by;
    actions
        .get_items_as(&spec, &input, params.output.unwrap_or_default())
        .await
        .map(Json)
}

async fn get_item(
    State(actions): State<AppState>,
    Path((model, id)): Path<(String, i64)>,
) -> Result<Json<Record>, ActionError> {
    let spec = ResourceSpec::new(model);
    let input = ActionInput::new().field("id", id);
    actions.get_item(&spec, &input).await.map(Json)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_actions=debug,example_consumer=info")),
        )
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);
    tracing::dispatcher::set_global_default(dispatch.clone())?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/resource_actions".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let registry_path = std::env::var("REGISTRY_PATH").unwrap_or_else(|_| "registry.json".into());
    let registry = resolve(&load_from_path(&registry_path).await?)?;
    tracing::info!(models = registry.models.len(), path = %registry_path, "model registry loaded");

    let actions = Actions::new(PgStore::new(pool, registry))
        .with_settings(ActionSettings::from_env())
        .with_dispatch(dispatch);

    let app = Router::new()
        .route("/:model", get(list_items))
        .route("/:model/:id", get(get_item))
        .with_state(Arc::new(actions));
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
