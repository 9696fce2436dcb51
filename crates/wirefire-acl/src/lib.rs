//! access control policy for tailnets.
//!
//! a tailnet's policy is persisted as json text and parsed lazily by the map
//! builder. this crate carries the surface the coordinator consumes:
//! [`Acl::parse`], [`Acl::build_filter`], and [`Acl::build_ssh_policy`].
//! rules select peers by owner login name or the `*` wildcard; an absent or
//! empty policy compiles to an allow-all packet filter so a fresh tailnet is
//! usable before an operator writes rules.

#![warn(missing_docs)]

use serde::Deserialize;
use thiserror::Error;

use wirefire_proto::{FilterRule, PortRange, Ports, SshAction, SshPolicy, SshRule};
use wirefire_types::Machine;

/// errors from policy parsing.
#[derive(Debug, Error)]
pub enum Error {
    /// the persisted policy text is not valid json.
    #[error("invalid acl policy: {0}")]
    Parse(#[from] serde_json::Error),
}

/// a parsed access control policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Acl {
    /// packet filter rules.
    pub acls: Vec<AclRule>,

    /// ssh access rules.
    pub ssh: Vec<AclSshRule>,
}

/// a single packet filter rule.
#[derive(Debug, Clone, Deserialize)]
pub struct AclRule {
    /// rule action; only `"accept"` is meaningful (the filter is
    /// default-deny).
    #[serde(default = "accept")]
    pub action: String,

    /// source selectors: `*` or an owner login name.
    pub src: Vec<String>,

    /// destination selectors: `<selector>:<port-spec>` where the port spec
    /// is `*` or a port number.
    pub dst: Vec<String>,
}

/// a single ssh rule.
#[derive(Debug, Clone, Deserialize)]
pub struct AclSshRule {
    /// rule action (`"accept"` or `"check"`; the distinction is decided by
    /// the caller's action callback).
    #[serde(default = "accept")]
    pub action: String,

    /// source selectors.
    pub src: Vec<String>,

    /// destination selectors.
    pub dst: Vec<String>,

    /// local users ssh is allowed as.
    #[serde(default)]
    pub users: Vec<String>,
}

fn accept() -> String {
    "accept".to_string()
}

impl Acl {
    /// parse a policy from its persisted textual form.
    ///
    /// empty or whitespace-only text parses as the empty policy.
    pub fn parse(text: &str) -> Result<Self, Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(text)?)
    }

    /// compile the packet filter for `machine` against its tailnet peers.
    ///
    /// an empty rule set compiles to a single allow-all rule.
    pub fn build_filter(&self, machine: &Machine, peers: &[Machine]) -> Vec<FilterRule> {
        if self.acls.is_empty() {
            return vec![FilterRule {
                src_ips: vec!["*".to_string()],
                dst_ports: vec![PortRange {
                    ip: "*".to_string(),
                    ports: Ports::ALL,
                }],
            }];
        }

        let mut rules = Vec::new();
        for rule in &self.acls {
            if rule.action != "accept" {
                continue;
            }

            let dst_ports: Vec<PortRange> = rule
                .dst
                .iter()
                .filter_map(|d| self.resolve_dst(d, machine))
                .flatten()
                .collect();
            if dst_ports.is_empty() {
                continue; // rule does not target this machine
            }

            let src_ips = resolve_src(&rule.src, machine, peers);
            if src_ips.is_empty() {
                continue;
            }

            rules.push(FilterRule { src_ips, dst_ports });
        }

        rules
    }

    /// compile the ssh policy for `machine`; the caller supplies the action
    /// for each matched rule (the coordinator uses a fixed accept).
    pub fn build_ssh_policy<F>(
        &self,
        machine: &Machine,
        peers: &[Machine],
        mut action: F,
    ) -> Option<SshPolicy>
    where
        F: FnMut(&AclSshRule) -> SshAction,
    {
        if self.ssh.is_empty() {
            return None;
        }

        let mut rules = Vec::new();
        for rule in &self.ssh {
            if !rule.dst.iter().any(|d| selects_machine(d, machine)) {
                continue;
            }

            let principals = resolve_principals(&rule.src, peers);
            if principals.is_empty() {
                continue;
            }

            let ssh_users = rule
                .users
                .iter()
                .map(|u| (u.clone(), u.clone()))
                .collect();

            rules.push(SshRule {
                principals,
                ssh_users,
                action: action(rule),
            });
        }

        Some(SshPolicy { rules })
    }

    /// resolve a destination selector against the target machine, producing
    /// port ranges on its address when the selector matches.
    fn resolve_dst(&self, dst: &str, machine: &Machine) -> Option<Vec<PortRange>> {
        let (selector, ports) = dst.rsplit_once(':')?;
        if !selects_machine(selector, machine) {
            return None;
        }

        let ports = if ports == "*" {
            Ports::ALL
        } else {
            let port: u16 = ports.parse().ok()?;
            Ports {
                first: port,
                last: port,
            }
        };

        Some(vec![PortRange {
            ip: format!("{}/32", machine.ipv4),
            ports,
        }])
    }
}

/// whether a selector matches the given machine (wildcard or owner name).
fn selects_machine(selector: &str, machine: &Machine) -> bool {
    selector == "*" || selector == machine.owner.name
}

/// resolve source selectors to source addresses over the tailnet.
fn resolve_src(selectors: &[String], machine: &Machine, peers: &[Machine]) -> Vec<String> {
    let mut ips = Vec::new();
    for selector in selectors {
        if selector == "*" {
            return vec!["*".to_string()];
        }
        for m in peers.iter().chain(std::iter::once(machine)) {
            if m.owner.name == *selector {
                ips.push(format!("{}/32", m.ipv4));
            }
        }
    }
    ips.sort();
    ips.dedup();
    ips
}

/// resolve source selectors to ssh principals.
fn resolve_principals(
    selectors: &[String],
    peers: &[Machine],
) -> Vec<wirefire_proto::SshPrincipal> {
    use wirefire_proto::SshPrincipal;

    let mut principals = Vec::new();
    for selector in selectors {
        if selector == "*" {
            return vec![SshPrincipal {
                any: true,
                ..Default::default()
            }];
        }
        for m in peers {
            if m.owner.name == *selector {
                principals.push(SshPrincipal {
                    node_ip: m.ipv4.to_string(),
                    ..Default::default()
                });
            }
        }
    }
    principals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wirefire_types::{DiscoKey, MachineKey, NodeKey, Tailnet, User};

    fn machine(id: i64, owner_name: &str, ipv4: &str) -> Machine {
        let now = Utc::now();
        Machine {
            id,
            name: format!("node-{id}"),
            name_idx: 0,
            noise_key: MachineKey::from_bytes(vec![id as u8; 32]),
            node_key: NodeKey::from_bytes(vec![id as u8; 32]),
            disco_key: DiscoKey::default(),
            ephemeral: false,
            host_info: None,
            endpoints: vec![],
            ipv4: ipv4.parse().unwrap(),
            created_at: now,
            expires_at: now + chrono::Duration::days(180),
            last_seen: None,
            tailnet: Tailnet {
                id: 1,
                name: "corp".to_string(),
                acl: String::new(),
                created_at: now,
                updated_at: now,
                role: String::new(),
            },
            owner: User {
                id,
                subject: format!("sub-{id}"),
                name: owner_name.to_string(),
                claims: Default::default(),
                created_at: now,
            },
        }
    }

    #[test]
    fn empty_policy_is_allow_all() {
        let acl = Acl::parse("").unwrap();
        let rules = acl.build_filter(&machine(1, "alice", "100.64.0.1"), &[]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].src_ips, vec!["*".to_string()]);
        assert_eq!(rules[0].dst_ports[0].ip, "*");
        assert_eq!(rules[0].dst_ports[0].ports, Ports::ALL);
    }

    #[test]
    fn empty_json_object_is_allow_all() {
        let acl = Acl::parse("{}").unwrap();
        let rules = acl.build_filter(&machine(1, "alice", "100.64.0.1"), &[]);
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn invalid_policy_fails_to_parse() {
        assert!(Acl::parse("not json").is_err());
    }

    #[test]
    fn user_to_user_rule() {
        let policy = r#"{
            "acls": [
                {"action": "accept", "src": ["bob"], "dst": ["alice:22"]}
            ]
        }"#;
        let acl = Acl::parse(policy).unwrap();

        let alice = machine(1, "alice", "100.64.0.1");
        let bob = machine(2, "bob", "100.64.0.2");

        let rules = acl.build_filter(&alice, std::slice::from_ref(&bob));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].src_ips, vec!["100.64.0.2/32".to_string()]);
        assert_eq!(rules[0].dst_ports[0].ip, "100.64.0.1/32");
        assert_eq!(rules[0].dst_ports[0].ports, Ports { first: 22, last: 22 });

        // the same rule does not target bob's machine
        let rules = acl.build_filter(&bob, &[alice]);
        assert!(rules.is_empty());
    }

    #[test]
    fn ssh_policy_accept() {
        let policy = r#"{
            "ssh": [
                {"action": "check", "src": ["*"], "dst": ["alice"], "users": ["root", "ubuntu"]}
            ]
        }"#;
        let acl = Acl::parse(policy).unwrap();

        let alice = machine(1, "alice", "100.64.0.1");
        let policy = acl
            .build_ssh_policy(&alice, &[], |_| SshAction {
                accept: true,
                reject: false,
            })
            .unwrap();

        assert_eq!(policy.rules.len(), 1);
        assert!(policy.rules[0].action.accept);
        assert!(policy.rules[0].principals[0].any);
        assert_eq!(policy.rules[0].ssh_users.len(), 2);
    }

    #[test]
    fn no_ssh_section_means_no_policy() {
        let acl = Acl::parse("{}").unwrap();
        let alice = machine(1, "alice", "100.64.0.1");
        assert!(
            acl.build_ssh_policy(&alice, &[], |_| SshAction::default())
                .is_none()
        );
    }
}
