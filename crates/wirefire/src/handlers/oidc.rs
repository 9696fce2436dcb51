//! oidc login bridge: `/oidc/login` and `/oidc/callback`.
//!
//! three endpoints complete an interactive machine registration:
//! - `GET /oidc/login?flow=<id>` stores the flow id in a `state` cookie and
//!   redirects to the provider,
//! - `GET /oidc/callback` validates the state, exchanges the code, and
//!   renders the tailnet selection form,
//! - `POST /oidc/callback` re-verifies the id token and, in one
//!   transaction, creates (or keeps) the machine and marks the registration
//!   request authenticated.
//!
//! csrf protection uses a double-submit `csrf_token` cookie whose paired
//! form token is derived from a hash of the server's private key; the
//! cookie is `Secure` when the base url is https.

use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use base64::Engine;
use chrono::{Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info};

use wirefire_db::{DatabaseTransaction, TransactionTrait, ipam, queries};
use wirefire_proto::RegisterRequest;
use wirefire_types::{
    Machine, RegistrationRequest, Tailnet, User, UserClaims, sanitize_hostname,
};

use super::ApiError;
use crate::AppState;
use crate::templates;

/// how long a machine registration is valid before re-authentication.
const MACHINE_EXPIRY_DAYS: i64 = 180;

/// query parameters for `GET /oidc/login`.
#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    /// registration flow id issued by `/machine/register`.
    pub flow: Option<String>,
}

/// query parameters for `GET /oidc/callback`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// oauth state; mirrors the flow id.
    pub state: Option<String>,
    /// authorization code from the provider.
    pub code: Option<String>,
}

/// form fields of `POST /oidc/callback`.
#[derive(Debug, Deserialize)]
pub struct CallbackForm {
    /// csrf token paired with the `csrf_token` cookie.
    #[serde(default)]
    pub csrf_token: String,
    /// registration flow id.
    #[serde(default)]
    pub rid: String,
    /// base64-encoded id token.
    #[serde(default)]
    pub token: String,
    /// selected tailnet id.
    #[serde(default)]
    pub tailnet: String,
}

/// GET /oidc/login - start the provider authentication flow.
///
/// the flow value is not validated here; it is taken verbatim, stored in
/// the `state` cookie, and checked by the callback.
pub async fn login(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
) -> Result<Response, ApiError> {
    let Some(flow) = params.flow.filter(|f| !f.is_empty()) else {
        return Err(ApiError::bad_request("missing flow parameter"));
    };

    let oidc = state
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError::internal("oidc provider not configured"))?;

    info!(flow = %flow, "GET /oidc/login");

    let response = Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, oidc.auth_code_url(&flow))
        .header(
            header::SET_COOKIE,
            state_cookie(&flow, state.base_url.scheme() == "https"),
        )
        .body(axum::body::Body::empty())
        .expect("valid status and headers");

    Ok(response)
}

/// GET /oidc/callback - token exchange and tailnet selection.
pub async fn callback_form(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let flow = params.state.unwrap_or_default();
    if flow.is_empty() || cookie_value(&headers, "state").as_deref() != Some(flow.as_str()) {
        return Err(ApiError::bad_request("invalid state"));
    }

    let oidc = state
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError::internal("oidc provider not configured"))?;

    info!(flow = %flow, "GET /oidc/callback");

    let rr = queries::find_registration_request(state.db.conn(), &flow)
        .await
        .ok()
        .flatten()
        .ok_or_else(|| ApiError::not_found("invalid flow"))?;

    let raw = oidc
        .exchange(params.code.unwrap_or_default())
        .await
        .map_err(|e| {
            error!(error = %e, "failed to exchange code");
            ApiError::bad_request("failed to exchange code")
        })?;

    let claims = oidc.verify(&raw).map_err(|e| {
        error!(error = %e, "failed to verify token");
        ApiError::bad_request("failed to verify token")
    })?;

    let user = queries::upsert_user(state.db.conn(), &claims)
        .await
        .map_err(|_| ApiError::internal("failed to find or create user"))?;

    let tailnets = queries::list_tailnets_for_user(state.db.conn(), user.id)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to list tailnets");
            ApiError::internal("failed to list tailnets")
        })?;

    // base64 the raw token to prevent unwanted escaping inside the form
    let token_b64 = base64::engine::general_purpose::STANDARD.encode(raw.as_bytes());

    let (cookie, form_token) = issue_csrf(&state);
    let page = templates::tailnet_select_page(&form_token, &rr.id, &token_b64, &tailnets);

    Ok(([(header::SET_COOKIE, cookie)], Html(page)).into_response())
}

/// POST /oidc/callback - complete the authentication flow, adding the
/// machine to the selected tailnet.
pub async fn callback_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CallbackForm>,
) -> Result<Response, ApiError> {
    // csrf first: a rejected request must not touch any state
    let cookie = cookie_value(&headers, "csrf_token").unwrap_or_default();
    if !verify_csrf(&state, &cookie, &form.csrf_token) {
        return Err(ApiError::forbidden("invalid csrf token"));
    }

    let oidc = state
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError::internal("oidc provider not configured"))?;

    let raw = base64::engine::general_purpose::STANDARD
        .decode(&form.token)
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
        .unwrap_or_default();

    let claims = oidc.verify(&raw).map_err(|e| {
        error!(error = %e, "failed to verify token");
        ApiError::bad_request("failed to verify token")
    })?;

    info!(flow = %form.rid, user = %claims.subject, "POST /oidc/callback");

    let result = async {
        let txn = state
            .db
            .conn()
            .begin()
            .await
            .map_err(|e| e.to_string())?;
        complete(&txn, &form, &claims).await?;
        txn.commit().await.map_err(|e| e.to_string())
    }
    .await;

    match result {
        Ok(()) => {
            state.notifier.notify_state_changed();
            Ok("Authentication successful! Please close this window".into_response())
        }
        Err(message) => {
            // surface the failure to the polling client before answering
            if let Ok(Some(mut rr)) =
                queries::find_registration_request(state.db.conn(), &form.rid).await
            {
                rr.authenticated = false;
                rr.user = None;
                rr.error = message.clone();
                let _ = queries::save_registration_request(state.db.conn(), &rr).await;
            }

            error!(error = %message, "failed to complete authentication");
            Err(ApiError::internal("failed to complete authentication"))
        }
    }
}

/// the transactional tail of the flow: membership check, machine creation,
/// and the registration request flip to authenticated.
async fn complete(
    txn: &DatabaseTransaction,
    form: &CallbackForm,
    claims: &UserClaims,
) -> Result<(), String> {
    let rr = queries::find_registration_request(txn, &form.rid)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("registration request not found")?;

    let user = queries::find_user_by_subject(txn, &claims.subject)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("user not found")?;

    let tailnet_id: i64 = form.tailnet.parse().map_err(|_| "invalid tailnet id")?;
    let member = queries::is_member(txn, user.id, tailnet_id)
        .await
        .map_err(|e| e.to_string())?;
    if !member {
        return Err("user is not a member of the requested tailnet".to_string());
    }

    let tailnet = queries::find_tailnet(txn, tailnet_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("tailnet not found")?;

    let machine = queries::find_machine_by_noise_key(txn, &rr.noise_key)
        .await
        .map_err(|e| e.to_string())?;

    if machine.is_none() {
        create_machine(txn, &user, &tailnet, &rr).await?;
    }
    // a machine that already exists re-authenticated after expiry or
    // logout; its stored record is refreshed by /machine/register

    let mut rr = rr;
    rr.authenticated = true;
    rr.user = Some(user);
    rr.error.clear();
    queries::save_registration_request(txn, &rr)
        .await
        .map_err(|e| e.to_string())
}

/// create the machine for an authenticated registration: sanitised name
/// with the next free index, a fresh ip from the cgnat pool unique within
/// the tailnet, and the default expiry.
async fn create_machine(
    txn: &DatabaseTransaction,
    user: &User,
    tailnet: &Tailnet,
    rr: &RegistrationRequest,
) -> Result<Machine, String> {
    let data: RegisterRequest =
        serde_json::from_value(rr.data.clone()).map_err(|e| e.to_string())?;

    let name = sanitize_hostname(data.hostname());
    let name_idx = queries::next_name_index(txn, tailnet.id, &name)
        .await
        .map_err(|e| e.to_string())?;

    let tailnet_id = tailnet.id;
    let (ipv4, _ipv6) = ipam::select_ip(|candidate| async move {
        queries::ipv4_in_tailnet(txn, tailnet_id, candidate)
            .await
            .map(|taken| !taken)
    })
    .await
    .map_err(|e| e.to_string())?;

    debug!(
        flow = %rr.id,
        machine = %name,
        name_idx,
        %ipv4,
        tailnet = tailnet.id,
        "creating machine"
    );

    let now = Utc::now();
    let machine = Machine {
        id: 0,
        name,
        name_idx,
        noise_key: rr.noise_key.clone(),
        node_key: data.node_key.clone(),
        disco_key: Default::default(),
        ephemeral: data.ephemeral,
        host_info: data.hostinfo.clone(),
        endpoints: vec![],
        ipv4,
        created_at: now,
        expires_at: now + Duration::days(MACHINE_EXPIRY_DAYS),
        last_seen: None,
        tailnet: tailnet.clone(),
        owner: user.clone(),
    };

    queries::upsert_machine(txn, &machine)
        .await
        .map_err(|e| e.to_string())
}

// ─── cookies and csrf ────────────────────────────────────────────────────

/// the `state` cookie carrying the flow id between login and callback.
fn state_cookie(flow: &str, secure: bool) -> String {
    let mut cookie = format!("state={}; Path=/; HttpOnly", flow);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// read a cookie value from the request headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then(|| v.to_string())
        })
        .next()
}

/// csrf key: a hash of the server's private key text.
fn csrf_key(state: &AppState) -> [u8; 32] {
    Sha256::digest(state.config.noise.private_key.as_bytes()).into()
}

/// issue a fresh csrf pair: the `csrf_token` set-cookie value and the form
/// token derived from it.
fn issue_csrf(state: &AppState) -> (String, String) {
    use rand::RngCore;
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    let cookie = hex::encode(nonce);

    let token = form_token(state, &cookie);

    let mut set_cookie = format!("csrf_token={}; Path=/; HttpOnly", cookie);
    if state.base_url.scheme() == "https" {
        set_cookie.push_str("; Secure");
    }

    (set_cookie, token)
}

/// derive the form token paired with a csrf cookie value.
fn form_token(state: &AppState, cookie: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(csrf_key(state));
    hasher.update(cookie.as_bytes());
    hex::encode(hasher.finalize())
}

/// constant-time check of a submitted form token against the cookie.
fn verify_csrf(state: &AppState, cookie: &str, submitted: &str) -> bool {
    if cookie.is_empty() || submitted.is_empty() {
        return false;
    }
    let expected = form_token(state, cookie);
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "state=abc123; csrf_token=deadbeef".parse().unwrap(),
        );

        assert_eq!(cookie_value(&headers, "state").as_deref(), Some("abc123"));
        assert_eq!(
            cookie_value(&headers, "csrf_token").as_deref(),
            Some("deadbeef")
        );
        assert!(cookie_value(&headers, "missing").is_none());
    }

    #[test]
    fn state_cookie_secure_flag() {
        assert_eq!(state_cookie("f1", false), "state=f1; Path=/; HttpOnly");
        assert_eq!(
            state_cookie("f1", true),
            "state=f1; Path=/; HttpOnly; Secure"
        );
    }
}
