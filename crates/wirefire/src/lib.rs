//! wirefire library - application state, routing, and the coordination
//! protocol engine.

pub mod derp;
pub mod dns;
pub mod handlers;
pub mod mapper;
pub mod notifier;
pub mod oidc;
pub mod templates;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use url::Url;

use wirefire_db::WirefireDb;
use wirefire_proto::DerpMap;
use wirefire_types::{Config, Error, MachinePrivate};

pub use notifier::StateNotifier;

/// application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// the embedded store.
    pub db: WirefireDb,
    /// loaded configuration.
    pub config: Arc<Config>,
    /// parsed `server.url`, used for oidc redirects and follow-up checks.
    pub base_url: Url,
    /// the server's noise identity.
    pub server_key: MachinePrivate,
    /// relay directory loaded at startup.
    pub derp_map: Arc<DerpMap>,
    /// tailnet update conduit for streaming map sessions.
    pub notifier: StateNotifier,
    /// oidc provider client, when configured.
    pub oidc: Option<Arc<oidc::OidcClient>>,
}

impl AppState {
    /// assemble application state from its parts, parsing and validating
    /// the derived fields.
    pub fn new(
        db: WirefireDb,
        config: Config,
        server_key: MachinePrivate,
        derp_map: DerpMap,
        notifier: StateNotifier,
        oidc: Option<Arc<oidc::OidcClient>>,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(&config.server.url)
            .map_err(|e| Error::InvalidConfig(format!("server.url: {}", e)))?;

        Ok(Self {
            db,
            config: Arc::new(config),
            base_url,
            server_key,
            derp_map: Arc::new(derp_map),
            notifier,
            oidc,
        })
    }

    /// a fresh per-session map builder.
    pub fn new_mapper(&self) -> mapper::Mapper {
        mapper::Mapper::new(
            self.config.dns.magic_dns,
            &self.config.dns.magic_dns_suffix,
            self.derp_map.clone(),
        )
    }
}

/// the outer https router: key exchange, the noise upgrade, and the oidc
/// login surface.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/key", get(handlers::key))
        .route("/ts2021", post(handlers::ts2021))
        .route("/oidc/login", get(handlers::oidc::login))
        .route(
            "/oidc/callback",
            get(handlers::oidc::callback_form).post(handlers::oidc::callback_complete),
        )
        .with_state(state)
}

/// the router served over an upgraded noise channel. handlers read the
/// peer's machine key from request extensions.
pub fn machine_router(state: AppState) -> Router {
    Router::new()
        .route("/machine/register", post(handlers::register))
        .route("/machine/map", post(handlers::map))
        .with_state(state)
}
