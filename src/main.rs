//! ptintel
//!
//! Serves PassiveTotal lookups and detail searches to the host platform.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ptintel::api::{AppState, create_router};
use ptintel::{ClientSettings, Enricher, PassiveTotalClient};

/// ptintel
#[derive(Parser, Debug)]
#[command(name = "ptintel")]
#[command(about = "On-demand PassiveTotal enrichment")]
struct Args {
    /// Server host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// PEM client certificate for mutual TLS
    #[arg(long, env = "PT_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// PEM private key matching the client certificate
    #[arg(long, env = "PT_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Passphrase for the client key
    #[arg(long, env = "PT_CLIENT_KEY_PASSPHRASE", hide_env_values = true)]
    client_key_passphrase: Option<String>,

    /// Extra PEM root certificate to trust
    #[arg(long, env = "PT_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Proxy for every PassiveTotal request
    #[arg(long, env = "PT_PROXY")]
    proxy: Option<String>,

    /// Reject invalid TLS certificates
    #[arg(long, env = "PT_REJECT_UNAUTHORIZED", default_value_t = true, action = clap::ArgAction::Set)]
    reject_unauthorized: bool,

    /// Per-request timeout in seconds
    #[arg(long, env = "PT_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Log output format: `text` or `json`
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ptintel=info,tower_http=info".into());
    if args.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting ptintel");

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder unavailable; /metrics disabled");
            None
        }
    };

    let settings = ClientSettings {
        cert: args.client_cert,
        key: args.client_key,
        passphrase: args.client_key_passphrase,
        ca: args.ca_cert,
        proxy: args.proxy,
        reject_unauthorized: args.reject_unauthorized,
        timeout: args.request_timeout_secs.map(Duration::from_secs),
    };
    if !settings.reject_unauthorized {
        tracing::warn!("TLS certificate verification is disabled");
    }

    let client = PassiveTotalClient::new(&settings).context("Failed to build PassiveTotal client")?;

    // Create application state
    let state = Arc::new(AppState {
        enricher: Arc::new(Enricher::new(Arc::new(client))),
        metrics,
    });

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
