//! packet filter and ssh policy wire types.

use serde::{Deserialize, Serialize};

/// a packet filter rule: traffic from `src_ips` may reach `dst_ports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterRule {
    /// source addresses or cidrs; `"*"` matches everything.
    #[serde(rename = "SrcIPs")]
    pub src_ips: Vec<String>,

    /// allowed destinations.
    pub dst_ports: Vec<PortRange>,
}

/// a destination ip paired with a port range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortRange {
    /// destination address or cidr; `"*"` matches everything.
    #[serde(rename = "IP")]
    pub ip: String,

    /// inclusive port range.
    pub ports: Ports,
}

/// an inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ports {
    /// first port.
    pub first: u16,
    /// last port.
    pub last: u16,
}

impl Ports {
    /// the full 0-65535 range.
    pub const ALL: Ports = Ports {
        first: 0,
        last: 65535,
    };
}

/// ssh policy for one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SshPolicy {
    /// rules evaluated in order; first match wins.
    pub rules: Vec<SshRule>,
}

/// a single ssh rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SshRule {
    /// principals (peers) the rule applies to, as node ip or `"*"`.
    pub principals: Vec<SshPrincipal>,

    /// map of allowed local users; `"*"` maps any.
    #[serde(rename = "SSHUsers")]
    pub ssh_users: std::collections::HashMap<String, String>,

    /// what to do when the rule matches.
    pub action: SshAction,
}

/// a principal matched by an ssh rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SshPrincipal {
    /// node ip of the principal.
    #[serde(rename = "NodeIP", skip_serializing_if = "String::is_empty")]
    pub node_ip: String,

    /// match any principal.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub any: bool,
}

/// action taken when an ssh rule matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SshAction {
    /// accept the connection.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub accept: bool,

    /// reject the connection.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reject: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_rule_wire_names() {
        let rule = FilterRule {
            src_ips: vec!["*".to_string()],
            dst_ports: vec![PortRange {
                ip: "*".to_string(),
                ports: Ports::ALL,
            }],
        };

        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"SrcIPs\""));
        assert!(json.contains("\"DstPorts\""));
        assert!(json.contains("\"First\":0"));
        assert!(json.contains("\"Last\":65535"));
    }

    #[test]
    fn ssh_action_accept() {
        let action = SshAction {
            accept: true,
            reject: false,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, r#"{"Accept":true}"#);
    }
}
