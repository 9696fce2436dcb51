//! tailnet entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

use wirefire_types::Tailnet;

/// tailnet database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tailnets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// unique tailnet name.
    #[sea_orm(unique)]
    pub name: String,

    /// access control policy in its persisted textual form.
    #[sea_orm(column_type = "Text")]
    pub acl: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::membership::Entity")]
    Memberships,
    #[sea_orm(has_many = "super::machine::Entity")]
    Machines,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl Related<super::machine::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Machines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Tailnet {
    fn from(model: Model) -> Self {
        Tailnet {
            id: model.id,
            name: model.name,
            acl: model.acl,
            created_at: model.created_at,
            updated_at: model.updated_at,
            role: String::new(),
        }
    }
}
