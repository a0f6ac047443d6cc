// Signage engine
//
// One process drives every screen:
//   - keeps the display assignment tree (SQLite-backed) and pushes changes
//   - serves the admin JSON API, uploads and the uploaded media
//   - runs one websocket session per player page (queue, widget, menu, keys)
//
// Runs behind a reverse proxy (nginx/Caddy) for HTTPS and internet exposure.

mod admin;
mod api;
mod config;
mod error;
mod input;
mod media;
mod menu;
mod model;
mod normalize;
mod playlist;
mod session;
mod store;
mod surface;

use tracing::{info, warn};

use crate::api::{build_router, AppState};
use crate::config::Config;
use crate::media::MediaStore;
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let version = env!("CARGO_PKG_VERSION").to_string();
    let config = Config::from_env()?;

    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::create_dir_all(&config.media_dir).await?;

    let store = Store::open(&config.db_path).await;
    info!("assignment store at {}", store.db_path().display());

    let state = AppState {
        version: version.clone(),
        store,
        media: MediaStore::new(&config.media_dir, config.public_base_url.clone()),
        default_display: config.default_display.clone(),
    };

    let app = build_router(state, config.ui_dir.as_deref(), config.max_upload_bytes);

    info!("signage engine {version} starting on http://{}", config.bind);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    warn!("Shutdown signal received.");
}
