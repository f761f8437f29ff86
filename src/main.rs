//! Bracket Back binary entrypoint wiring REST, SSE and the configured storage backend.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bracket_back::{
    config::AppConfig,
    dao::tournament_store::memory::MemoryTournamentStore,
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    info!(
        period_sec = config.period_sec(),
        store_timeout_ms = config.store_timeout().as_millis() as u64,
        "configuration loaded"
    );
    let app_state = AppState::new(config);

    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| default_backend().into());
    start_storage(&app_state, &backend).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick a backend from whichever connection settings are present.
fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") && env::var_os("MONGO_URI").is_some() {
        "mongo"
    } else if cfg!(feature = "couch-store") && env::var_os("COUCH_BASE_URL").is_some() {
        "couch"
    } else {
        "memory"
    }
}

/// Install the selected backend, spawning a supervisor for networked stores.
async fn start_storage(state: &SharedState, backend: &str) -> anyhow::Result<()> {
    info!(backend, "selecting storage backend");
    match backend {
        "memory" => {
            warn!("using the in-memory store; data is lost on restart");
            state.set_store(Arc::new(MemoryTournamentStore::new())).await;
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use bracket_back::{
                dao::{
                    storage::StorageError,
                    tournament_store::{
                        TournamentStore,
                        mongodb::{MongoConfig, MongoTournamentStore},
                    },
                },
                services::storage_supervisor,
            };

            tokio::spawn(storage_supervisor::run(state.clone(), || async {
                let config = MongoConfig::from_env().await.map_err(StorageError::from)?;
                let store = MongoTournamentStore::connect(config)
                    .await
                    .map_err(StorageError::from)?;
                Ok(Arc::new(store) as Arc<dyn TournamentStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use bracket_back::{
                dao::{
                    storage::StorageError,
                    tournament_store::{
                        TournamentStore,
                        couchdb::{CouchConfig, CouchTournamentStore},
                    },
                },
                services::storage_supervisor,
            };

            tokio::spawn(storage_supervisor::run(state.clone(), || async {
                let config = CouchConfig::from_env().map_err(StorageError::from)?;
                let store = CouchTournamentStore::connect(config)
                    .await
                    .map_err(StorageError::from)?;
                Ok(Arc::new(store) as Arc<dyn TournamentStore>)
            }));
        }
        other => bail!("unsupported STORE_BACKEND `{other}`"),
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
