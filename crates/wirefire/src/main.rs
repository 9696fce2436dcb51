//! wirefire - a self-hosted coordination server for a tailscale-compatible
//! mesh vpn.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use wirefire::{AppState, StateNotifier, create_app, derp, oidc::OidcClient};
use wirefire_db::WirefireDb;
use wirefire_types::{Config, MachinePrivate};

/// wirefire coordination server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// path to the configuration file.
    #[arg(long, default_value = "config.yaml", env = "WIREFIRE_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to read configuration from {:?}", cli.config))?;

    init_logging(&config.log.level)?;

    let server_key = MachinePrivate::from_text(&config.noise.private_key)
        .context("failed to parse server's private key")?;

    let db = WirefireDb::open(&config.database)
        .await
        .context("failed to open database")?;
    info!(url = %config.database.url, "database ready");

    let derp_map = derp::load(&config.derp.sources)
        .await
        .context("failed to load derp sources")?;
    info!(regions = derp_map.regions.len(), "relay directory loaded");

    let oidc = if config.oidc.provider.is_empty() {
        warn!("oidc provider not configured; interactive registration will fail");
        None
    } else {
        let base_url = url::Url::parse(&config.server.url).context("invalid server.url")?;
        let client = OidcClient::discover(&config.oidc, &base_url)
            .await
            .context("oidc discovery failed")?;
        info!(provider = %config.oidc.provider, "oidc provider discovered");
        Some(Arc::new(client))
    };

    let listen_addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .context("invalid server.listen_addr")?;

    let state = AppState::new(
        db,
        config,
        server_key,
        derp_map,
        StateNotifier::new(),
        oidc,
    )?;
    let app = create_app(state);

    info!(addr = %listen_addr, "starting http server");
    let listener = TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// install the global tracing subscriber from the configured level.
fn init_logging(level: &str) -> Result<()> {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        // fatal and panic collapse into error, the strictest tracing level
        "error" | "fatal" | "panic" => Level::ERROR,
        other => {
            eprintln!("unknown log level {other:?}, defaulting to info");
            Level::INFO
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
