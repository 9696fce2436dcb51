//! registerrequest / registerresponse for `/machine/register`.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use wirefire_types::{HostInfo, NodeKey};

/// a registerrequest from a tailscale client.
///
/// field names use pascalcase to match go's json encoding. keys use
/// prefixed hex format (e.g., "nodekey:abc123...").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RegisterRequest {
    /// client capability version.
    pub version: u64,

    /// node's current public key.
    pub node_key: NodeKey,

    /// previous node key (for key rotation).
    pub old_node_key: NodeKey,

    /// authentication info (contains the pre-auth key, which wirefire
    /// rejects).
    pub auth: Option<RegisterAuth>,

    /// requested expiry for the node key. a past expiry logs the node out.
    pub expiry: Option<DateTime<Utc>>,

    /// host information.
    pub hostinfo: Option<HostInfo>,

    /// request an ephemeral node.
    pub ephemeral: bool,

    /// url to poll for authentication completion (interactive login).
    /// when non-empty, the client is following up on a previous registration
    /// that returned an auth url.
    pub followup: String,
}

impl RegisterRequest {
    /// the requested expiry, filtering out go's zero time value
    /// (`0001-01-01T00:00:00Z`).
    pub fn requested_expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry.filter(|t| t.year() > 1)
    }

    /// the hostname reported in hostinfo, unsanitised.
    pub fn hostname(&self) -> &str {
        self.hostinfo.as_ref().map(|h| h.hostname.as_str()).unwrap_or("")
    }
}

/// authentication info nested in a registerrequest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RegisterAuth {
    /// pre-auth key for non-interactive registration.
    pub auth_key: String,
}

/// a registerresponse returned to the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RegisterResponse {
    /// user info for this node.
    pub user: TailcfgUser,

    /// login info for this node.
    pub login: TailcfgLogin,

    /// whether the node key has expired and the client must re-authenticate.
    pub node_key_expired: bool,

    /// whether the machine is authorized on its tailnet.
    pub machine_authorized: bool,

    /// if non-empty, the user must visit this url to complete auth.
    #[serde(rename = "AuthURL", skip_serializing_if = "String::is_empty")]
    pub auth_url: String,

    /// error message if registration failed; non-fatal to the connection.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl RegisterResponse {
    /// a response carrying only an inline error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            ..Default::default()
        }
    }
}

/// user info in a registerresponse (matches tailcfg.user).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TailcfgUser {
    /// user id.
    #[serde(rename = "ID")]
    pub id: i64,

    /// login name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub login_name: String,

    /// display name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,

    /// when the user was created.
    pub created: Option<DateTime<Utc>>,
}

/// login info in a registerresponse (matches tailcfg.login).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TailcfgLogin {
    /// login id.
    #[serde(rename = "ID")]
    pub id: i64,

    /// login name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub login_name: String,

    /// display name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
}
