use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use texts_facade::govern::AccessGovernor;
use texts_facade::handlers::{self, AppState};
use texts_facade::registry::Registry;
use texts_facade::routes;
use texts_facade::store::memory::MemoryStore;
use texts_facade::{config, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up STORE_SEED_PATH, FACADE_API_KEYS, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("Starting Texts Facade in {:?} mode", config.environment);

    let store = build_store()?;
    let registry = build_registry()?;
    let governor = AccessGovernor::new(config.credentials.clone());

    let state = AppState {
        registry: Arc::new(registry),
        governor: Arc::new(governor),
        store,
    };

    let app = handlers::router(state)
        .layer(cors_layer(&config.security.cors_origins))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "facade listening");

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_store() -> anyhow::Result<Arc<dyn store::StoreClient>> {
    let cfg = &config::config().store;
    let mut store = MemoryStore::new(cfg.page_size);
    store.register_index(&cfg.table, "feed", "feedKey");
    match &cfg.seed_path {
        Some(path) => {
            let count =
                store.load_seed_file(path, &cfg.partition_attribute, &cfg.sort_attribute)?;
            tracing::info!(path = %path, items = count, "seeded store");
        }
        None => tracing::warn!("STORE_SEED_PATH not set; serving an empty store"),
    }
    Ok(Arc::new(store))
}

/// Route registration is the only place configuration errors may surface;
/// a bad definition aborts startup instead of failing per request.
fn build_registry() -> anyhow::Result<Registry> {
    let mut registry = Registry::new();
    for route in routes::builtin_routes(&config::config().store.table)? {
        registry.register(route)?;
    }
    Ok(registry)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}
