//! map response synthesis for one machine.
//!
//! a [`Mapper`] belongs to a single map session and keeps state across
//! builds: the invocation counter (the first response carries a debug
//! block) and the fingerprint of the last relay map sent (an unchanged
//! directory is omitted from subsequent responses).

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use wirefire_acl::Acl;
use wirefire_db::{ConnectionTrait, queries};
use wirefire_proto::{Debug as ProtoDebug, DerpMap, MapResponse, Node, SshAction, UserProfile};
use wirefire_types::{Machine, sanitize_tailnet_name};

use crate::derp;

/// per-session map response builder.
pub struct Mapper {
    magic_dns: bool,
    suffix: String,
    derp_map: Arc<DerpMap>,
    invocations: u64,
    derp_fingerprint: String,
}

impl Mapper {
    /// create a builder for one session.
    pub fn new(magic_dns: bool, suffix: &str, derp_map: Arc<DerpMap>) -> Self {
        Self {
            magic_dns,
            suffix: suffix.to_string(),
            derp_map,
            invocations: 0,
            derp_fingerprint: String::new(),
        }
    }

    /// build a full map response for the machine.
    ///
    /// returns `Ok(None)` when the store reports an interrupted query; the
    /// session skips the tick and carries on.
    pub async fn build<C: ConnectionTrait>(
        &mut self,
        conn: &C,
        machine: &Machine,
    ) -> Result<Option<MapResponse>, wirefire_db::Error> {
        self.invocations += 1;
        let first = self.invocations == 1;

        debug!(
            machine = %machine.complete_name(),
            tailnet = machine.tailnet.id,
            first,
            "preparing map response"
        );

        let mut resp = MapResponse {
            domain: sanitize_tailnet_name(&machine.tailnet.name),
            control_time: Some(Utc::now()),
            ..Default::default()
        };

        if first {
            resp.debug = Some(ProtoDebug {
                disable_log_tail: true,
            });
        }

        let mut node = self.project(machine);
        node.online = Some(true);
        resp.node = Some(node);

        resp.dns_config = Some(crate::dns::adapt(self.magic_dns, &self.suffix, &machine.tailnet));

        let checksum = derp::fingerprint(&self.derp_map);
        if first || checksum != self.derp_fingerprint {
            self.derp_fingerprint = checksum;
            resp.derp_map = Some((*self.derp_map).clone());
        }

        let machines = match queries::list_machines_in_tailnet(conn, &machine.tailnet).await {
            Ok(machines) => machines,
            Err(e) if e.is_interrupt() => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut profiles: Vec<UserProfile> = vec![profile(machine)];
        let mut peers = Vec::with_capacity(machines.len().saturating_sub(1));

        for peer in &machines {
            if peer.id == machine.id {
                continue;
            }

            let mut node = self.project(peer);
            // peers are reported as online optimistically; wirefire has no
            // presence service
            node.online = Some(true);
            resp.peers.push(node);

            if !profiles.iter().any(|p| p.id == peer.owner.id) {
                profiles.push(profile(peer));
            }
            peers.push(peer.clone());
        }

        let acl = Acl::parse(&machine.tailnet.acl)
            .map_err(|e| wirefire_db::Error::InvalidData(e.to_string()))?;
        resp.packet_filter = acl.build_filter(machine, &peers);
        resp.ssh_policy = acl.build_ssh_policy(machine, &peers, |_| SshAction {
            accept: true,
            reject: false,
        });

        resp.user_profiles = profiles;

        Ok(Some(resp))
    }

    /// project a machine into its protocol form.
    fn project(&self, machine: &Machine) -> Node {
        let ipv4 = machine.ipv4;
        let ipv6 = wirefire_db::ipam::to_ipv6(ipv4);
        let addresses = vec![format!("{ipv4}/32"), format!("{ipv6}/128")];

        Node {
            id: machine.id,
            stable_id: machine.id.to_string(),
            // the trailing dot is significant
            name: format!(
                "{}.{}.{}.",
                machine.complete_name(),
                sanitize_tailnet_name(&machine.tailnet.name),
                self.suffix
            ),
            user: machine.owner.id,
            key: machine.node_key.clone(),
            key_expiry: Some(machine.expires_at),
            machine: machine.noise_key.clone(),
            disco_key: machine.disco_key.clone(),
            allowed_ips: addresses.clone(),
            addresses,
            endpoints: machine.endpoints.iter().map(|e| e.to_string()).collect(),
            hostinfo: machine.host_info.clone(),
            created: Some(machine.created_at),
            online: None,
            machine_authorized: true,
        }
    }
}

/// display profile for a machine's owner.
fn profile(machine: &Machine) -> UserProfile {
    UserProfile {
        id: machine.owner.id,
        login_name: machine.owner.name.clone(),
        display_name: machine.owner.name.clone(),
        profile_pic_url: machine.owner.claims.picture.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::net::Ipv4Addr;
    use wirefire_db::WirefireDb;
    use wirefire_types::{DiscoKey, MachineKey, NodeKey, Tailnet, User, UserClaims};

    async fn seed(db: &WirefireDb, tailnet_name: &str) -> (Tailnet, User) {
        let conn = db.conn();
        let user = queries::upsert_user(
            conn,
            &UserClaims {
                issuer: "https://sso.example.com".to_string(),
                subject: "sub-1".to_string(),
                name: "alice".to_string(),
                email: "alice@example.com".to_string(),
                picture: String::new(),
            },
        )
        .await
        .unwrap();
        let tailnet = queries::create_tailnet(conn, tailnet_name, "{}").await.unwrap();
        queries::add_member(conn, tailnet.id, user.id, "member").await.unwrap();
        (tailnet, user)
    }

    async fn seed_machine(
        db: &WirefireDb,
        tailnet: &Tailnet,
        user: &User,
        name: &str,
        name_idx: i64,
        key_byte: u8,
        ipv4: Ipv4Addr,
    ) -> Machine {
        let now = Utc::now();
        let machine = Machine {
            id: 0,
            name: name.to_string(),
            name_idx,
            noise_key: MachineKey::from_bytes(vec![key_byte; 32]),
            node_key: NodeKey::from_bytes(vec![key_byte + 1; 32]),
            disco_key: DiscoKey::from_bytes(vec![key_byte + 2; 32]),
            ephemeral: false,
            host_info: None,
            endpoints: vec![],
            ipv4,
            created_at: now,
            expires_at: now + Duration::days(180),
            last_seen: None,
            tailnet: tailnet.clone(),
            owner: user.clone(),
        };
        queries::upsert_machine(db.conn(), &machine).await.unwrap()
    }

    fn test_derp_map() -> Arc<DerpMap> {
        use wirefire_proto::{DerpNode, DerpRegion};
        Arc::new(DerpMap {
            regions: [(
                1,
                DerpRegion {
                    region_id: 1,
                    region_code: "nyc".to_string(),
                    region_name: "New York City".to_string(),
                    nodes: vec![DerpNode::default()],
                },
            )]
            .into_iter()
            .collect(),
        })
    }

    #[tokio::test]
    async fn first_response_carries_everything() {
        let db = WirefireDb::open_in_memory().await.unwrap();
        let (tailnet, user) = seed(&db, "alice").await;
        let machine =
            seed_machine(&db, &tailnet, &user, "laptop", 0, 1, "100.64.0.1".parse().unwrap()).await;

        let mut mapper = Mapper::new(true, "wirefire.net", test_derp_map());
        let resp = mapper.build(db.conn(), &machine).await.unwrap().unwrap();

        assert_eq!(resp.domain, "alice");
        assert!(resp.debug.is_some(), "first response sets the debug block");
        assert!(resp.derp_map.is_some(), "first response includes the relay map");
        assert!(resp.peers.is_empty());
        assert_eq!(resp.user_profiles.len(), 1);
        assert!(!resp.packet_filter.is_empty());

        let node = resp.node.unwrap();
        assert_eq!(node.name, "laptop.alice.wirefire.net.");
        assert_eq!(node.online, Some(true));
        assert_eq!(
            node.addresses,
            vec![
                "100.64.0.1/32".to_string(),
                "fd7a:115c:a1e0:ab12:4843:cd96:6440:1/128".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn unchanged_relay_map_is_omitted_after_first_build() {
        let db = WirefireDb::open_in_memory().await.unwrap();
        let (tailnet, user) = seed(&db, "alice").await;
        let machine =
            seed_machine(&db, &tailnet, &user, "laptop", 0, 1, "100.64.0.1".parse().unwrap()).await;

        let mut mapper = Mapper::new(true, "wirefire.net", test_derp_map());

        let first = mapper.build(db.conn(), &machine).await.unwrap().unwrap();
        assert!(first.derp_map.is_some());

        let second = mapper.build(db.conn(), &machine).await.unwrap().unwrap();
        assert!(second.derp_map.is_none(), "unchanged relay map must be omitted");
        assert!(second.debug.is_none(), "debug block only on the first response");
    }

    #[tokio::test]
    async fn peers_appear_with_profiles() {
        let db = WirefireDb::open_in_memory().await.unwrap();
        let (tailnet, user) = seed(&db, "alice").await;
        let machine =
            seed_machine(&db, &tailnet, &user, "laptop", 0, 1, "100.64.0.1".parse().unwrap()).await;

        let mut mapper = Mapper::new(true, "wirefire.net", test_derp_map());
        mapper.build(db.conn(), &machine).await.unwrap().unwrap();

        // another machine with the same hostname joins the tailnet
        let peer =
            seed_machine(&db, &tailnet, &user, "laptop", 1, 2, "100.64.0.2".parse().unwrap()).await;

        let resp = mapper.build(db.conn(), &machine).await.unwrap().unwrap();
        assert_eq!(resp.peers.len(), 1);
        assert_eq!(resp.peers[0].name, "laptop-1.alice.wirefire.net.");
        assert_eq!(resp.peers[0].online, Some(true));
        assert_eq!(resp.peers[0].id, peer.id);
        // owner shared between self and peer appears once
        assert_eq!(resp.user_profiles.len(), 1);
    }
}
