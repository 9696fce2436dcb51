//! tailnet membership entity.
//!
//! the composite `(tailnet_id, user_id)` key is what machines reference:
//! dropping a membership cascade-deletes the member's machines.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// tailnet member database model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tailnet_members")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tailnet_id: i64,

    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,

    /// membership role; defaults to `member`.
    pub role: String,

    pub created_at: DateTime<Utc>,
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
