//! registration request type - an in-flight interactive login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MachineKey, User};

/// a node's request to join a tailnet.
///
/// created when a node first hits `/machine/register`, then mutated only by
/// the oidc completion handler: `authenticated` flips to true with the bound
/// user, or `error` records why the login failed. the follow-up loop in
/// `/machine/register` polls this row until one of the two happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// random 8-byte hex id, visible externally as the oidc `flow` parameter.
    pub id: String,

    /// noise public key of the requesting machine.
    pub noise_key: MachineKey,

    /// the original register request payload, kept verbatim so machine
    /// creation can read the node key, hostname, and ephemeral flag.
    pub data: serde_json::Value,

    /// becomes true once the oidc flow completes successfully.
    pub authenticated: bool,

    /// error from the authentication flow; empty on success.
    pub error: String,

    /// the user who authenticated the request, once bound.
    pub user: Option<User>,

    /// creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl RegistrationRequest {
    /// a request with `authenticated = false` must never be honored as a
    /// completed login; this also requires the bound user to be present.
    pub fn is_complete(&self) -> bool {
        self.authenticated && self.error.is_empty() && self.user.is_some()
    }
}
