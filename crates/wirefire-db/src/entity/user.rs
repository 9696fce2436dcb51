//! user entity for database storage.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::NotSet, Set};
use tracing::warn;

use wirefire_types::{User, UserClaims};

/// user database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// subject claim from the oidc token; unique.
    #[sea_orm(unique)]
    pub sub: String,

    pub name: String,

    /// json-serialized standard claims.
    #[sea_orm(column_type = "Text")]
    pub claims: String,

    pub created_at: DateTime<Utc>,
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

impl From<Model> for User {
    fn from(model: Model) -> Self {
        let claims: UserClaims = match serde_json::from_str(&model.claims) {
            Ok(c) => c,
            Err(e) => {
                warn!(user_id = model.id, error = %e, "failed to parse user claims JSON");
                UserClaims::default()
            }
        };

        User {
            id: model.id,
            subject: model.sub,
            name: model.name,
            claims,
            created_at: model.created_at,
        }
    }
}

impl From<&UserClaims> for ActiveModel {
    fn from(claims: &UserClaims) -> Self {
        let claims_json = serde_json::to_string(claims).unwrap_or_else(|_| "{}".to_string());

        ActiveModel {
            id: NotSet,
            sub: Set(claims.subject.clone()),
            name: Set(claims.name.clone()),
            claims: Set(claims_json),
            created_at: Set(Utc::now()),
        }
    }
}
