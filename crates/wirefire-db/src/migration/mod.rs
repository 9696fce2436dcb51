//! database migrations for wirefire.

pub use sea_orm_migration::prelude::*;

mod m20260412_000001_create_users;
mod m20260412_000002_create_tailnets;
mod m20260412_000003_create_tailnet_members;
mod m20260412_000004_create_registration_requests;
mod m20260412_000005_create_machines;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260412_000001_create_users::Migration),
            Box::new(m20260412_000002_create_tailnets::Migration),
            Box::new(m20260412_000003_create_tailnet_members::Migration),
            Box::new(m20260412_000004_create_registration_requests::Migration),
            Box::new(m20260412_000005_create_machines::Migration),
        ]
    }
}
