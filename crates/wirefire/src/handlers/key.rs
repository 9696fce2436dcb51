//! handler for the `/key` endpoint.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use wirefire_proto::NOISE_CAPABILITY_VERSION;
use wirefire_types::MachineKey;

use crate::AppState;

/// query parameters for `/key`.
#[derive(Debug, Default, Deserialize)]
pub struct KeyParams {
    /// client's noise capability version.
    pub v: Option<String>,
}

/// response body (matches tailscale's overtlspublickeyresponse).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyResponse {
    /// server's noise public key.
    pub public_key: MachineKey,
}

/// get /key - return the server's noise public key.
///
/// 404 without a version parameter, 400 when it fails to parse, and an
/// empty body for versions below the noise capability floor.
pub async fn key(State(state): State<AppState>, Query(params): Query<KeyParams>) -> Response {
    let Some(v) = params.v else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let client_version: u64 = match v.parse() {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid version").into_response(),
    };

    if client_version < NOISE_CAPABILITY_VERSION {
        return StatusCode::OK.into_response();
    }

    let public_key = state.server_key.public();
    debug!(key = %public_key.short_string(), "returning noise public key");
    Json(KeyResponse { public_key }).into_response()
}
