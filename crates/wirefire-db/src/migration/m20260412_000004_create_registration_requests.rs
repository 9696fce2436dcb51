//! create machine_registration_requests table migration

use sea_orm_migration::prelude::*;

use super::m20260412_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RegistrationRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RegistrationRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RegistrationRequests::NoiseKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RegistrationRequests::Data)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(RegistrationRequests::Authenticated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(RegistrationRequests::UserId).big_integer())
                    .col(
                        ColumnDef::new(RegistrationRequests::Error)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(RegistrationRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_registration_requests_user")
                            .from(RegistrationRequests::Table, RegistrationRequests::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RegistrationRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RegistrationRequests {
    #[sea_orm(iden = "machine_registration_requests")]
    Table,
    Id,
    NoiseKey,
    Data,
    Authenticated,
    UserId,
    Error,
    CreatedAt,
}
