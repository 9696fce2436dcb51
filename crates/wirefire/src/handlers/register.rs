//! handler for the /machine/register endpoint, served over the noise
//! channel.
//!
//! `/machine/register` is the first endpoint a node talks to: it registers
//! the node's noise and node public keys and kicks off user authentication.
//! once the oidc flow completes, the registration request is marked
//! authenticated and the node is added to the selected tailnet.

use std::time::Duration;

use axum::{Json, extract::State};
use bytes::Bytes;
use chrono::Utc;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info};
use url::Url;

use wirefire_db::{TransactionTrait, queries};
use wirefire_proto::{
    RegisterRequest, RegisterResponse, SUPPORTED_CAPABILITY_VERSION, TailcfgLogin, TailcfgUser,
    UNSUPPORTED_CLIENT_VERSION_MESSAGE,
};
use wirefire_types::{Machine, MachineKey, User, sanitize_hostname};

use super::{ApiError, MachineKeyContext, ResultExt};
use crate::AppState;

/// cadence of the follow-up poll against the registration request.
const FOLLOWUP_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// handle node registration.
///
/// NOTE: the body is taken as `Bytes` and parsed manually because the real
/// tailscale client does not send a content-type header over ts2021/http2.
pub async fn register(
    State(state): State<AppState>,
    ctx: MachineKeyContext,
    body: Bytes,
) -> Result<Json<RegisterResponse>, ApiError> {
    let req: RegisterRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("invalid JSON request body"))?;

    let peer = ctx.machine_key().clone();
    info!(peer = %peer.short_string(), "POST /machine/register");

    if req.version < SUPPORTED_CAPABILITY_VERSION {
        return Ok(Json(RegisterResponse::error(
            UNSUPPORTED_CLIENT_VERSION_MESSAGE,
        )));
    }

    let machine = queries::find_machine_by_noise_key(state.db.conn(), &peer)
        .await
        .map_internal()?;

    match machine {
        None => register_new(state, peer, req).await,
        Some(machine) => register_returning(state, machine, req).await,
    }
}

/// first contact from an unknown noise key: either a follow-up poll on an
/// in-flight login, or the start of a fresh interactive registration.
async fn register_new(
    state: AppState,
    peer: MachineKey,
    req: RegisterRequest,
) -> Result<Json<RegisterResponse>, ApiError> {
    debug!(peer = %peer.short_string(), "no machine found for peer");

    if !req.followup.is_empty() {
        debug!(peer = %peer.short_string(), "peer requesting follow-up; entering follow-up loop");
        return followup(state, peer, &req.followup).await;
    }

    if let Some(auth) = &req.auth
        && !auth.auth_key.is_empty()
    {
        return Ok(Json(RegisterResponse::error(
            "Auth key based authentication is not supported",
        )));
    }

    let rid = flow_id();
    let data = serde_json::to_value(&req).map_internal()?;
    if let Err(e) = queries::create_registration_request(state.db.conn(), &rid, &peer, &data).await
    {
        return Ok(Json(RegisterResponse::error(e.to_string())));
    }

    let mut auth_url = state.base_url.join("/oidc/login").map_internal()?;
    auth_url.query_pairs_mut().append_pair("flow", &rid);

    debug!(registration_id = %rid, "starting oidc login");

    Ok(Json(RegisterResponse {
        auth_url: auth_url.to_string(),
        ..Default::default()
    }))
}

/// a machine we already know: enforce expiry, track hostname changes, and
/// refresh the stored record. runs in a transaction so the rename and the
/// upsert land together.
async fn register_returning(
    state: AppState,
    mut machine: Machine,
    req: RegisterRequest,
) -> Result<Json<RegisterResponse>, ApiError> {
    debug!(
        tailnet = machine.tailnet.id,
        machine = %machine.complete_name(),
        "found machine for peer"
    );

    let txn = state.db.conn().begin().await.map_internal()?;

    if machine.is_expired() {
        debug!(machine = %machine.complete_name(), "machine key has expired");
        return Ok(Json(RegisterResponse {
            node_key_expired: true,
            ..Default::default()
        }));
    }

    if let Some(expiry) = req.requested_expiry()
        && expiry < Utc::now()
    {
        debug!(machine = %machine.complete_name(), %expiry, "requested expiry has passed; expiring machine key");
        queries::delete_machine(&txn, &machine.noise_key).await.map_internal()?;
        txn.commit().await.map_internal()?;
        state.notifier.notify_state_changed();

        return Ok(Json(RegisterResponse {
            node_key_expired: true,
            ..Default::default()
        }));
    }

    let hostname = sanitize_hostname(req.hostname());
    if machine.name != hostname {
        debug!(machine = %machine.complete_name(), new_name = %hostname, "renaming machine");

        let next_idx = queries::next_name_index(&txn, machine.tailnet.id, &hostname)
            .await
            .map_internal()?;
        machine.name = hostname;
        machine.name_idx = next_idx;
    }

    let machine = queries::upsert_machine(&txn, &machine).await.map_internal()?;
    txn.commit().await.map_internal()?;
    state.notifier.notify_state_changed();

    Ok(Json(authorized_response(&machine.owner)))
}

/// poll the registration request every two seconds until the oidc flow
/// marks it authenticated or failed. client disconnect cancels the loop.
async fn followup(
    state: AppState,
    peer: MachineKey,
    followup_url: &str,
) -> Result<Json<RegisterResponse>, ApiError> {
    let auth_url = match Url::parse(followup_url) {
        Ok(url) => url,
        Err(e) => {
            debug!(peer = %peer.short_string(), error = %e, "failed to parse follow-up url");
            return Ok(Json(RegisterResponse::error(e.to_string())));
        }
    };

    let base = &state.base_url;
    let same_host = auth_url.host_str() == base.host_str()
        && auth_url.port_or_known_default() == base.port_or_known_default();
    if !same_host || !auth_url.path().ends_with("/oidc/login") {
        debug!(peer = %peer.short_string(), "invalid follow-up url");
        return Ok(Json(RegisterResponse::error("invalid follow-up request url")));
    }

    let flow = auth_url
        .query_pairs()
        .find(|(k, _)| k == "flow")
        .map(|(_, v)| v.to_string())
        .filter(|f| !f.is_empty());
    let Some(flow) = flow else {
        return Ok(Json(RegisterResponse::error("invalid follow-up request url")));
    };

    let mut ticker = interval_at(
        Instant::now() + FOLLOWUP_POLL_INTERVAL,
        FOLLOWUP_POLL_INTERVAL,
    );

    loop {
        ticker.tick().await;

        let rr = match queries::find_registration_request(state.db.conn(), &flow).await {
            Ok(Some(rr)) => rr,
            Ok(None) | Err(_) => {
                debug!(peer = %peer.short_string(), flow = %flow, "failed to fetch registration request");
                return Ok(Json(RegisterResponse {
                    machine_authorized: false,
                    error: "something went wrong".to_string(),
                    ..Default::default()
                }));
            }
        };

        if !rr.error.is_empty() {
            return Ok(Json(RegisterResponse {
                machine_authorized: false,
                error: rr.error,
                ..Default::default()
            }));
        }

        if rr.authenticated {
            debug!(peer = %peer.short_string(), flow = %flow, "request authenticated");

            let Some(user) = rr.user else {
                return Ok(Json(RegisterResponse {
                    machine_authorized: false,
                    error: "something went wrong".to_string(),
                    ..Default::default()
                }));
            };
            return Ok(Json(authorized_response(&user)));
        }
    }
}

/// success response carrying the owner's identity.
fn authorized_response(owner: &User) -> RegisterResponse {
    RegisterResponse {
        machine_authorized: true,
        user: TailcfgUser {
            id: owner.id,
            login_name: owner.name.clone(),
            display_name: owner.name.clone(),
            created: Some(owner.created_at),
        },
        login: TailcfgLogin {
            id: owner.id,
            login_name: owner.name.clone(),
            display_name: owner.name.clone(),
        },
        ..Default::default()
    }
}

/// random 8-byte flow id, hex encoded.
fn flow_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
