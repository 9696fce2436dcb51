//! machine type - an individual node in a tailnet.

use std::net::{Ipv4Addr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DiscoKey, MachineKey, NodeKey, Tailnet, User};

/// host information reported by the client.
///
/// field names use pascalcase to match the client's json encoding. only the
/// subset the coordinator consumes is modelled; unknown fields are dropped
/// on re-serialisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostInfo {
    /// operating system name (e.g., "linux", "macOS").
    #[serde(rename = "OS", skip_serializing_if = "String::is_empty")]
    pub os: String,

    /// host name reported by the device (unsanitised).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    /// client version string.
    #[serde(rename = "IPNVersion", skip_serializing_if = "String::is_empty")]
    pub ipn_version: String,
}

/// an individual node in a tailnet.
///
/// a machine belongs to a user, and its lifecycle is tied to that user's
/// membership of the tailnet: losing the membership cascade-deletes the
/// machine. created by the oidc completion handler, updated by
/// `/machine/register` and `/machine/map`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// auto-generated unique machine identifier.
    pub id: i64,

    /// sanitised hostname.
    pub name: String,

    /// suffix index disambiguating duplicate hostnames within a tailnet
    /// (0 = no suffix).
    pub name_idx: i64,

    /// noise static public key presented on the `/ts2021` channel; unique.
    pub noise_key: MachineKey,

    /// key for the per-node tunnel and relay protocol.
    pub node_key: NodeKey,

    /// key for peer-to-peer path discovery.
    pub disco_key: DiscoKey,

    /// whether the device asked to be ephemeral.
    pub ephemeral: bool,

    /// host information from registration or the latest map request.
    pub host_info: Option<HostInfo>,

    /// the machine's udp ip:port endpoints.
    pub endpoints: Vec<SocketAddr>,

    /// assigned ipv4 address inside the cgnat pool; the paired ipv6 is
    /// derived, not stored.
    pub ipv4: Ipv4Addr,

    /// creation timestamp.
    pub created_at: DateTime<Utc>,

    /// when the machine's registration expires.
    pub expires_at: DateTime<Utc>,

    /// last time the machine reported its status.
    pub last_seen: Option<DateTime<Utc>>,

    /// the tailnet this machine is part of.
    pub tailnet: Tailnet,

    /// the user this machine belongs to.
    pub owner: User,
}

impl Machine {
    /// true if the machine's registration has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.timestamp() != 0 && self.expires_at < Utc::now()
    }

    /// the machine's name with the `-<idx>` suffix applied when needed.
    pub fn complete_name(&self) -> String {
        if self.name_idx != 0 {
            format!("{}-{}", self.name, self.name_idx)
        } else {
            self.name.clone()
        }
    }
}
