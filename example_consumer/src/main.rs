//! Example consumer: composes the engine at startup the way a feature module
//! stack would — register models, define tables, authenticate, then run a
//! small user CRUD flow.
//!
//! Run from repo root: `DATABASE_URL=postgres://localhost/datagate cargo run -p example-consumer`

use datagate_sdk::{
    CrudEngine, EngineConfig, ModelDef, PgStore, RegistryBuilder, StoreDriver,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn users_model() -> Result<ModelDef, serde_json::Error> {
    serde_json::from_value(json!({
        "name": "users",
        "fields": [
            {
                "name": "username", "type": "text", "nullable": false, "unique": true,
                "match_kind": "contains",
                "constraints": {"min_length": 3, "max_length": 254, "pattern": "^[a-zA-Z0-9._]+$"}
            },
            {
                "name": "email", "type": "text", "nullable": false, "unique": true,
                "constraints": {"max_length": 255, "format": "email"}
            },
            {"name": "password", "type": "text", "nullable": false, "internal": true},
            {
                "name": "first_name", "type": "text", "match_kind": "contains",
                "default": "Lorem", "constraints": {"max_length": 60}
            },
            {
                "name": "last_name", "type": "text", "match_kind": "contains",
                "default": "Ipsum", "constraints": {"max_length": 60}
            },
            {"name": "status", "type": "integer", "constraints": {"allowed": [0, 1, 2]}}
        ],
        "unique_check_fields": ["username", "email"],
        "soft_delete": true
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("datagate_sdk=debug")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/datagate".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    // Compose the registry once; a duplicate or malformed model aborts startup.
    let mut builder = RegistryBuilder::new("kryptstorm");
    builder.register(users_model()?)?;
    let registry = Arc::new(builder.freeze());

    let store = Arc::new(PgStore::new(pool));
    for model in registry.models() {
        store.define(model).await?;
    }
    store.authenticate().await?;

    let config = EngineConfig {
        op_timeout: Some(Duration::from_secs(5)),
        ..EngineConfig::default()
    };
    let engine = CrudEngine::new(store, registry, config);

    let public_fields: Vec<String> = ["id", "username", "email", "status", "first_name", "last_name"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let attributes = json!({
        "username": "alice",
        "email": "a@x.com",
        "password": "secret1",
        "status": 1
    })
    .as_object()
    .cloned()
    .unwrap_or_default();
    let save_fields: Vec<String> = ["username", "email", "password", "status"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let created = engine.respond(
        engine
            .create("users", &attributes, Some(&save_fields), Some(&public_fields))
            .await,
    );
    tracing::info!("create: {}", serde_json::to_string_pretty(&created)?);

    let listed = engine.respond(
        engine
            .find_all(
                "users",
                Some(&json!({"username": "ali"})),
                Some(&json!({"id": "desc"})),
                Some(&json!({"limit": 20})),
                Some(&public_fields),
            )
            .await,
    );
    tracing::info!("find_all: {}", serde_json::to_string_pretty(&listed)?);

    let taken = engine.respond(engine.validate_unique("users", "username", &json!("alice")).await);
    tracing::info!("validate_unique(alice): {}", serde_json::to_string_pretty(&taken)?);

    let free = engine.respond(engine.validate_unique("users", "username", &json!("bob")).await);
    tracing::info!("validate_unique(bob): {}", serde_json::to_string_pretty(&free)?);

    Ok(())
}
