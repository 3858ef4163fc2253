//! `reliefd` — the relief-coordination session server.
//!
//! Usage:
//!   reliefd -c <context-name-or-path> [--listen <addr>]
//!   reliefd --dev [--listen <addr>]
//!
//! The context name resolves to `/etc/reliefd/<name>.toml`. If a path
//! with `/` or `.` is given, it's used directly. `--dev` skips the
//! config and runs against in-memory backends.

mod config;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tracing::info;

use relief_backend::memory::{MemoryIdentityProvider, MemoryProfileStore};
use relief_backend::rest::{RestIdentityProvider, RestProfileStore};
use relief_backend::{IdentityProvider, ProfileStore};
use relief_core::Module;
use relief_session::api::guard_middleware;
use relief_session::service::SessionConfig;
use relief_session::SessionModule;

use config::ServerConfig;

/// Relief-coordination session server.
#[derive(Parser, Debug)]
#[command(name = "reliefd", about = "Relief coordination session server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Listen address.
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Run with in-memory backends instead of the hosted services.
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let (identity, profiles, session_config): (
        Arc<dyn IdentityProvider>,
        Arc<dyn ProfileStore>,
        SessionConfig,
    ) = if cli.dev {
        info!("Running in dev mode with in-memory backends");
        (
            Arc::new(MemoryIdentityProvider::new()),
            Arc::new(MemoryProfileStore::new()),
            SessionConfig::default(),
        )
    } else {
        let name = cli
            .config
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("either --config or --dev is required"))?;
        let config_path = ServerConfig::resolve_path(name);
        info!("Loading configuration from {}", config_path.display());
        let server_config = ServerConfig::load(&config_path)?;
        server_config.verify()?;

        let identity = Arc::new(RestIdentityProvider::new(
            &server_config.backend.url,
            &server_config.backend.anon_key,
        ));
        let profiles = Arc::new(RestProfileStore::new(
            &server_config.backend.url,
            &server_config.backend.anon_key,
            Arc::clone(&identity),
        ));
        let session_config = server_config.session_config();
        (identity, profiles, session_config)
    };

    let session_module = SessionModule::new(identity, profiles, session_config);
    let service = Arc::clone(session_module.service());
    info!("Session module initialized");

    // Populate the context for an already-established session, if any.
    if let Ok(Some(snapshot)) = service.initialize_context().await {
        info!(identity = %snapshot.identity.id, "restored existing session");
    }

    // The guard middleware wraps everything; its public-path defaults
    // keep /session, /health and /version reachable without a session.
    let app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .merge(session_module.routes())
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&service),
            guard_middleware,
        ));

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!("reliefd listening on {}", cli.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn version() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
