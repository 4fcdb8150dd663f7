use axum::http::{HeaderValue, Method, header::InvalidHeaderValue};
use foodshare_common::snowflake::{ProcessId, WorkerId};
use foodshare_db::{
    client::DbClient,
    memory::MemoryStore,
    store::{Store, StoreError},
};
use serde::Deserialize;
use server::ServerState;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;
mod service;

const DATABASE_MAX_CONNECTIONS: u32 = 10;
const SWEEP_MAX_CONNECTIONS: u32 = 2;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error opening the store: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid CORS origin: {0}")]
    CorsOrigin(#[from] InvalidHeaderValue),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: Option<String>,
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
    cors_origin: Option<String>,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "foodshare_api=debug,\
                foodshare_common=debug,\
                foodshare_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

/// The store for request handlers and the one for the sweep. Postgres gets a
/// separate pool for the sweep; the in-memory store is shared.
async fn open_stores(env: &Env) -> Result<(Arc<dyn Store>, Arc<dyn Store>), InitError> {
    let Some(database_url) = &env.database_url else {
        warn!("DATABASE_URL is not set, data is kept in memory only");
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new(env.worker_id, env.process_id));
        return Ok((Arc::clone(&store), store));
    };

    let client = DbClient::connect(
        database_url,
        DATABASE_MAX_CONNECTIONS,
        env.worker_id,
        env.process_id,
    )
    .await?;
    client.migrate().await?;
    let sweep_client = client
        .sibling(database_url, SWEEP_MAX_CONNECTIONS)
        .await?;

    let store: Arc<dyn Store> = Arc::new(client);
    let sweep_store: Arc<dyn Store> = Arc::new(sweep_client);
    Ok((store, sweep_store))
}

fn cors_layer(origin: &str) -> Result<CorsLayer, InitError> {
    let origin = HeaderValue::from_str(origin)?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60)))
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(error) => {
                error!(%error, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(error) => {
                error!(%error, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let (store, sweep_store) = open_stores(&env).await?;

    let cancel = CancellationToken::new();
    let sweep_period = Duration::from_secs(env.sweep_interval_secs.max(1));
    let sweep = tokio::spawn(service::sweep::run(
        sweep_store,
        sweep_period,
        cancel.clone(),
    ));

    let mut app = server::app(ServerState { store });
    if let Some(origin) = &env.cors_origin {
        app = app.layer(cors_layer(origin)?);
    }

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .map_err(InitError::TcpServe)?;

    cancel.cancel();
    if let Err(error) = sweep.await {
        error!(%error, "Sweep task failed");
    }

    Ok(())
}
