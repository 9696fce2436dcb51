//! shared fixtures for the handler integration tests.

#![allow(dead_code)] // not every test binary uses every fixture

use std::net::Ipv4Addr;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use wirefire::handlers::MachineKeyContext;
use wirefire::{AppState, StateNotifier};
use wirefire_db::{WirefireDb, queries};
use wirefire_proto::{DerpMap, DerpNode, DerpRegion};
use wirefire_types::{
    Config, DiscoKey, Machine, MachineKey, MachinePrivate, NodeKey, Tailnet, User, UserClaims,
};

/// a fixed, valid server private key for tests.
pub const TEST_PRIVATE_KEY: &str =
    "privkey:4a186b51b2b4d09b4f3a586e83c2a2c4c744e1b4a38aebbc0944c0d3e8cbde49";

/// base url the test state is configured with.
pub const TEST_BASE_URL: &str = "https://wirefire.example.com";

/// application state backed by an in-memory store and a one-region relay
/// directory, with no oidc provider.
pub async fn test_state() -> AppState {
    let db = WirefireDb::open_in_memory().await.unwrap();

    let mut config = Config::default();
    config.noise.private_key = TEST_PRIVATE_KEY.to_string();
    config.server.url = TEST_BASE_URL.to_string();
    config.database.url = ":memory:".to_string();

    let server_key = MachinePrivate::from_text(TEST_PRIVATE_KEY).unwrap();

    AppState::new(
        db,
        config,
        server_key,
        test_derp_map(),
        StateNotifier::new(),
        None,
    )
    .unwrap()
}

/// a minimal single-region relay directory.
pub fn test_derp_map() -> DerpMap {
    DerpMap {
        regions: [(
            1,
            DerpRegion {
                region_id: 1,
                region_code: "nyc".to_string(),
                region_name: "New York City".to_string(),
                nodes: vec![DerpNode {
                    name: "1a".to_string(),
                    region_id: 1,
                    host_name: "derp1a.example.com".to_string(),
                    stun_port: 3478,
                    derp_port: 443,
                    ..Default::default()
                }],
            },
        )]
        .into_iter()
        .collect(),
    }
}

/// create a user, a tailnet named after them, and the membership.
pub async fn seed_user_and_tailnet(state: &AppState, name: &str) -> (User, Tailnet) {
    let conn = state.db.conn();
    let user = queries::upsert_user(
        conn,
        &UserClaims {
            issuer: "https://sso.example.com".to_string(),
            subject: format!("sub-{name}"),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            picture: String::new(),
        },
    )
    .await
    .unwrap();

    let tailnet = queries::create_tailnet(conn, name, "{}").await.unwrap();
    queries::add_member(conn, tailnet.id, user.id, "member").await.unwrap();

    (user, tailnet)
}

/// insert a machine owned by the given user.
pub async fn seed_machine(
    state: &AppState,
    tailnet: &Tailnet,
    owner: &User,
    name: &str,
    key_byte: u8,
    ipv4: Ipv4Addr,
) -> Machine {
    let now = Utc::now();
    let machine = Machine {
        id: 0,
        name: name.to_string(),
        name_idx: 0,
        noise_key: MachineKey::from_bytes(vec![key_byte; 32]),
        node_key: NodeKey::from_bytes(vec![key_byte.wrapping_add(1); 32]),
        disco_key: DiscoKey::from_bytes(vec![key_byte.wrapping_add(2); 32]),
        ephemeral: false,
        host_info: None,
        endpoints: vec![],
        ipv4,
        created_at: now,
        expires_at: now + Duration::days(180),
        last_seen: None,
        tailnet: tailnet.clone(),
        owner: owner.clone(),
    };
    queries::upsert_machine(state.db.conn(), &machine).await.unwrap()
}

/// the noise key a test peer presents, by key byte.
pub fn peer_key(key_byte: u8) -> MachineKey {
    MachineKey::from_bytes(vec![key_byte; 32])
}

/// POST a json body to a machine endpoint with the peer's noise key
/// injected the way the ts2021 channel does.
pub async fn machine_post(
    state: &AppState,
    path: &str,
    peer: &MachineKey,
    body: serde_json::Value,
) -> Response<Body> {
    let router = wirefire::machine_router(state.clone());
    router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .extension(MachineKeyContext(peer.clone()))
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// collect a (finite) response body.
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// hex string of a 32-byte key filled with `byte`.
pub fn hex_key(byte: u8) -> String {
    hex::encode([byte; 32])
}
