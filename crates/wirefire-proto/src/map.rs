//! maprequest / mapresponse for `/machine/map`.

use std::collections::HashMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wirefire_types::{DiscoKey, HostInfo, MachineKey, NodeKey};

use crate::{FilterRule, SshPolicy};

/// a maprequest from a tailscale client.
///
/// sent on `/machine/map` either as a one-shot status write
/// (`Stream: false`) or to open a long-poll session (`Stream: true`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MapRequest {
    /// client capability version.
    pub version: u64,

    /// requested payload compression; `"zstd"` or empty for raw json.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub compress: String,

    /// client's current node key.
    pub node_key: NodeKey,

    /// client's disco key.
    pub disco_key: DiscoKey,

    /// client's current udp endpoints.
    pub endpoints: Vec<SocketAddr>,

    /// client's host information.
    pub hostinfo: Option<HostInfo>,

    /// whether the client wants periodic keep-alive responses.
    pub keep_alive: bool,

    /// whether the connection stays open for streamed updates.
    pub stream: bool,

    /// whether to skip the peer list in the response.
    pub omit_peers: bool,
}

/// a mapresponse pushed to a tailscale client.
///
/// the synthesized view for one node: itself, its peers, dns config, relay
/// directory, packet filter, and ssh policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MapResponse {
    /// when true the response carries no data and only resets the client's
    /// poll timeout.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub keep_alive: bool,

    /// the requesting node's own view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,

    /// every other machine in the node's tailnet.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<Node>,

    /// dns configuration for the tailnet.
    #[serde(rename = "DNSConfig", skip_serializing_if = "Option::is_none")]
    pub dns_config: Option<DnsConfig>,

    /// relay directory; omitted when unchanged since the last response in
    /// the same session.
    #[serde(rename = "DERPMap", skip_serializing_if = "Option::is_none")]
    pub derp_map: Option<DerpMap>,

    /// sanitised tailnet name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub domain: String,

    /// packet filter compiled from the tailnet acl.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packet_filter: Vec<FilterRule>,

    /// ssh policy compiled from the tailnet acl.
    #[serde(rename = "SSHPolicy", skip_serializing_if = "Option::is_none")]
    pub ssh_policy: Option<SshPolicy>,

    /// profiles of every user owning the node or one of its peers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_profiles: Vec<UserProfile>,

    /// coordinator wall-clock time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_time: Option<DateTime<Utc>>,

    /// debug settings; sent on the first response of a session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Debug>,
}

impl MapResponse {
    /// an empty keep-alive response.
    pub fn keep_alive() -> Self {
        Self {
            keep_alive: true,
            ..Default::default()
        }
    }
}

/// a node as rendered in a mapresponse (self or peer).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Node {
    /// node id.
    #[serde(rename = "ID")]
    pub id: i64,

    /// stable string form of the node id.
    #[serde(rename = "StableID", skip_serializing_if = "String::is_empty")]
    pub stable_id: String,

    /// fully qualified machine name, with trailing dot.
    pub name: String,

    /// owning user id.
    pub user: i64,

    /// node public key.
    pub key: NodeKey,

    /// when the node key expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_expiry: Option<DateTime<Utc>>,

    /// machine (noise) public key.
    pub machine: MachineKey,

    /// disco key for path discovery.
    #[serde(skip_serializing_if = "DiscoKey::is_empty")]
    pub disco_key: DiscoKey,

    /// assigned addresses in cidr form (ipv4/32 and derived ipv6/128).
    pub addresses: Vec<String>,

    /// ip ranges routed to this node; always includes `addresses`.
    #[serde(rename = "AllowedIPs")]
    pub allowed_ips: Vec<String>,

    /// known udp endpoints.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,

    /// host information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostinfo: Option<HostInfo>,

    /// creation time of the machine record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// whether the node is currently reachable. wirefire has no presence
    /// service and reports peers as online optimistically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,

    /// whether the machine is authorized on its tailnet.
    pub machine_authorized: bool,
}

/// dns configuration pushed with the map response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DnsConfig {
    /// split-dns routes; a suffix mapping to an empty resolver list is
    /// handled by the client's built-in resolver.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub routes: HashMap<String, Vec<String>>,

    /// search domains pushed to clients.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,

    /// whether magic dns (proxied resolution) is active.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub proxied: bool,

    /// suffixes never resolved via an exit node.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exit_node_filtered_set: Vec<String>,
}

/// the relay directory: derp regions keyed by region id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DerpMap {
    /// relay regions by id.
    pub regions: HashMap<i32, DerpRegion>,
}

/// a derp relay region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DerpRegion {
    /// region id.
    #[serde(rename = "RegionID")]
    pub region_id: i32,

    /// short region code (e.g., "nyc").
    pub region_code: String,

    /// human-readable region name.
    pub region_name: String,

    /// relay nodes in this region.
    pub nodes: Vec<DerpNode>,
}

/// a single derp relay server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DerpNode {
    /// node name within the region.
    pub name: String,

    /// region this node belongs to.
    #[serde(rename = "RegionID")]
    pub region_id: i32,

    /// relay host name.
    pub host_name: String,

    /// ipv4 address override.
    #[serde(rename = "IPv4", skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,

    /// ipv6 address override.
    #[serde(rename = "IPv6", skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,

    /// stun port (0 means 3478, -1 disabled).
    #[serde(rename = "STUNPort")]
    pub stun_port: i32,

    /// whether the node serves stun only (no relay).
    #[serde(rename = "STUNOnly")]
    pub stun_only: bool,

    /// derp port (0 means 443).
    #[serde(rename = "DERPPort")]
    pub derp_port: i32,

    /// whether the node can serve on port 80 for captive portal checks.
    pub can_port_80: bool,
}

/// per-user display info.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserProfile {
    /// user id.
    #[serde(rename = "ID")]
    pub id: i64,

    /// login name.
    pub login_name: String,

    /// display name.
    pub display_name: String,

    /// profile picture url.
    #[serde(rename = "ProfilePicURL", skip_serializing_if = "String::is_empty")]
    pub profile_pic_url: String,
}

/// debug knobs sent to the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Debug {
    /// disable shipping client logs to the log service.
    pub disable_log_tail: bool,
}
