//! create machines table migration
//!
//! the composite foreign key to tailnet_members ties a machine's lifecycle
//! to its owner's membership: removing the membership removes the machine.

use sea_orm_migration::prelude::*;

use super::m20260412_000003_create_tailnet_members::TailnetMembers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Machines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Machines::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Machines::Name).string().not_null())
                    .col(
                        ColumnDef::new(Machines::NameIdx)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Machines::NoiseKey)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Machines::NodeKey).string().not_null())
                    .col(ColumnDef::new(Machines::DiscoKey).string().not_null())
                    .col(
                        ColumnDef::new(Machines::Ephemeral)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Machines::HostInfo).text())
                    .col(
                        ColumnDef::new(Machines::Endpoints)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Machines::Ipv4).string().not_null())
                    .col(
                        ColumnDef::new(Machines::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Machines::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Machines::LastSeen).timestamp_with_time_zone())
                    .col(ColumnDef::new(Machines::TailnetId).big_integer().not_null())
                    .col(ColumnDef::new(Machines::UserId).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_machines_membership")
                            .from(Machines::Table, (Machines::TailnetId, Machines::UserId))
                            .to(
                                TailnetMembers::Table,
                                (TailnetMembers::TailnetId, TailnetMembers::UserId),
                            )
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // disambiguate duplicate hostnames within a tailnet
        manager
            .create_index(
                Index::create()
                    .name("idx_machines_tailnet_name")
                    .table(Machines::Table)
                    .col(Machines::TailnetId)
                    .col(Machines::Name)
                    .col((Machines::NameIdx, IndexOrder::Desc))
                    .unique()
                    .to_owned(),
            )
            .await?;

        // lookup by tailnet for peer listing
        manager
            .create_index(
                Index::create()
                    .name("idx_machines_tailnet_id")
                    .table(Machines::Table)
                    .col(Machines::TailnetId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Machines::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Machines {
    Table,
    Id,
    Name,
    NameIdx,
    NoiseKey,
    NodeKey,
    DiscoKey,
    Ephemeral,
    HostInfo,
    Endpoints,
    Ipv4,
    CreatedAt,
    ExpiresAt,
    LastSeen,
    TailnetId,
    UserId,
}
