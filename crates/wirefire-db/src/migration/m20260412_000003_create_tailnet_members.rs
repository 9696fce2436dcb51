//! create tailnet_members table migration

use sea_orm_migration::prelude::*;

use super::m20260412_000001_create_users::Users;
use super::m20260412_000002_create_tailnets::Tailnets;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TailnetMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TailnetMembers::TailnetId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TailnetMembers::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TailnetMembers::Role)
                            .string()
                            .not_null()
                            .default("member"),
                    )
                    .col(
                        ColumnDef::new(TailnetMembers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(TailnetMembers::TailnetId)
                            .col(TailnetMembers::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tailnet_members_tailnet")
                            .from(TailnetMembers::Table, TailnetMembers::TailnetId)
                            .to(Tailnets::Table, Tailnets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tailnet_members_user")
                            .from(TailnetMembers::Table, TailnetMembers::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TailnetMembers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum TailnetMembers {
    Table,
    TailnetId,
    UserId,
    Role,
    CreatedAt,
}
