//! machine entity for database storage.

use std::net::{Ipv4Addr, SocketAddr};

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};
use tracing::warn;

use wirefire_types::{HostInfo, Machine, Tailnet, User};

/// machine database model.
///
/// keys are stored in their prefixed-hex text form, matching their wire
/// representation. `host_info` and `endpoints` are json columns.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "machines")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub name: String,
    pub name_idx: i64,

    /// noise static public key in `mkey:<hex>` form; unique.
    #[sea_orm(unique)]
    pub noise_key: String,

    /// node key in `nodekey:<hex>` form.
    pub node_key: String,

    /// disco key in `discokey:<hex>` form.
    pub disco_key: String,

    pub ephemeral: bool,

    /// json-serialized hostinfo.
    #[sea_orm(column_type = "Text", nullable)]
    pub host_info: Option<String>,

    /// json-serialized vec<socketaddr>.
    #[sea_orm(column_type = "Text")]
    pub endpoints: String,

    /// assigned ipv4 address as text.
    pub ipv4: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,

    pub tailnet_id: i64,
    pub user_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tailnet::Entity",
        from = "Column::TailnetId",
        to = "super::tailnet::Column::Id"
    )]
    Tailnet,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::tailnet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tailnet.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// combine the row with its joined owner and tailnet into the domain type.
    pub fn into_machine(self, tailnet: Tailnet, owner: User) -> Machine {
        let endpoints: Vec<SocketAddr> = match serde_json::from_str(&self.endpoints) {
            Ok(v) => v,
            Err(e) => {
                warn!(machine_id = self.id, error = %e, "failed to parse machine endpoints JSON, using empty list");
                Vec::new()
            }
        };

        let host_info: Option<HostInfo> =
            self.host_info
                .as_ref()
                .and_then(|s| match serde_json::from_str(s) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!(machine_id = self.id, error = %e, "failed to parse machine host_info JSON");
                        None
                    }
                });

        let ipv4: Ipv4Addr = self.ipv4.parse().unwrap_or(Ipv4Addr::UNSPECIFIED);

        Machine {
            id: self.id,
            name: self.name,
            name_idx: self.name_idx,
            noise_key: self.noise_key.parse().unwrap_or_default(),
            node_key: self.node_key.parse().unwrap_or_default(),
            disco_key: self.disco_key.parse().unwrap_or_default(),
            ephemeral: self.ephemeral,
            host_info,
            endpoints,
            ipv4,
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_seen: self.last_seen,
            tailnet,
            owner,
        }
    }
}

impl From<&Machine> for ActiveModel {
    fn from(machine: &Machine) -> Self {
        let endpoints_json =
            serde_json::to_string(&machine.endpoints).unwrap_or_else(|_| "[]".to_string());
        let host_info_json = machine
            .host_info
            .as_ref()
            .and_then(|h| serde_json::to_string(h).ok());

        // the id is never bound: inserts let the engine assign one, and the
        // upsert path reaches existing rows through the noise_key conflict
        ActiveModel {
            id: NotSet,
            name: Set(machine.name.clone()),
            name_idx: Set(machine.name_idx),
            noise_key: Set(machine.noise_key.to_string()),
            node_key: Set(machine.node_key.to_string()),
            disco_key: Set(machine.disco_key.to_string()),
            ephemeral: Set(machine.ephemeral),
            host_info: Set(host_info_json),
            endpoints: Set(endpoints_json),
            ipv4: Set(machine.ipv4.to_string()),
            created_at: Set(machine.created_at),
            expires_at: Set(machine.expires_at),
            last_seen: Set(machine.last_seen),
            tailnet_id: Set(machine.tailnet.id),
            user_id: Set(machine.owner.id),
        }
    }
}
