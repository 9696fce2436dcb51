//! registration request entity.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use tracing::warn;

use wirefire_types::{RegistrationRequest, User};

/// machine registration request database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "machine_registration_requests")]
pub struct Model {
    /// random hex id; exposed as the oidc `flow` parameter.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// noise key of the requesting machine, in `mkey:<hex>` form.
    pub noise_key: String,

    /// json-serialized original register request payload.
    #[sea_orm(column_type = "Text")]
    pub data: String,

    /// becomes true when the oidc flow completes successfully.
    pub authenticated: bool,

    /// user bound by the oidc completion handler, once authenticated.
    pub user_id: Option<i64>,

    /// error from the authentication flow; empty on success.
    pub error: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// combine the row with its (optionally) bound user into the domain type.
    pub fn into_request(self, user: Option<User>) -> RegistrationRequest {
        let data = match serde_json::from_str(&self.data) {
            Ok(v) => v,
            Err(e) => {
                warn!(request_id = %self.id, error = %e, "failed to parse registration request data JSON");
                serde_json::Value::Null
            }
        };

        RegistrationRequest {
            id: self.id,
            noise_key: self.noise_key.parse().unwrap_or_default(),
            data,
            authenticated: self.authenticated,
            error: self.error,
            user,
            created_at: self.created_at,
        }
    }
}
