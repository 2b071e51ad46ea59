use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metatx::devnet::Devnet;
use metatx::nonce_store::{NonceStore, SqliteNonceStore};
use metatx::ForwarderConfig;
use metatx_relayer::config::RelayerConfig;
use metatx_relayer::routes;
use metatx_relayer::state::AppState;

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
        // Default: allow localhost on any port
        Cors::default().allowed_origin_fn(|origin, _| {
            origin
                .to_str()
                .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                .unwrap_or(false)
        })
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allow_any_method()
        .allowed_headers(vec!["content-type", "authorization", "x-relay-auth"])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match RelayerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("invalid relayer configuration: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "configuration loaded");

    let forwarder_config = ForwarderConfig::default().with_chain_id(config.chain_id);
    let devnet = match &config.nonce_db_path {
        Some(path) => match SqliteNonceStore::open(path) {
            Ok(store) => {
                tracing::info!("Nonce store: SQLite at {path}");
                let store: Arc<dyn NonceStore> = Arc::new(store);
                Devnet::with_nonce_store(forwarder_config, store)
            }
            Err(e) => {
                tracing::error!("Failed to open SQLite nonce store at {path}: {e}");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("NONCE_DB_PATH not set: forwarder nonces are kept in memory");
            Devnet::with_config(forwarder_config)
        }
    };

    if config.metrics_token.is_none() && !config.public_metrics {
        tracing::warn!("METRICS_TOKEN not set: /metrics is disabled");
    }

    let state = web::Data::new(AppState::new(devnet, &config));
    let port = config.port;

    tracing::info!("metatx relayer listening on port {port}");
    tracing::info!("Relayer account: {}", state.relayer_address);
    tracing::info!("Forwarder: {}", state.devnet.forwarder());
    tracing::info!("Registry: {}", state.devnet.registry());
    tracing::info!("Whitelist: {:?}", state.whitelist);
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  GET  http://localhost:{port}/forwarder");
    tracing::info!("  POST http://localhost:{port}/relay");

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
        .expect("failed to build rate limiter config");

    let cors_origins = config.allowed_origins.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
