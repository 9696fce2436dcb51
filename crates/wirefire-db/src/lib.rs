//! database layer for wirefire.
//!
//! this crate provides persistent storage for users, tailnets, memberships,
//! machines, and registration requests, plus ip address selection for new
//! machines. queries live in [`queries`] as functions generic over
//! [`sea_orm::ConnectionTrait`], so they run both on the pooled connection
//! and inside transactions.

#![warn(missing_docs)]

mod entity;
mod error;
pub mod ipam;
mod migration;
pub mod queries;

pub use error::Error;
pub use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait};

use sea_orm::Database as SeaOrmDatabase;
use sea_orm_migration::MigratorTrait;

use wirefire_types::DatabaseConfig;

/// result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// handle to the embedded store.
///
/// the underlying engine is single-writer sqlite fronted by sqlx's
/// connection pool; clones share the pool.
#[derive(Clone)]
pub struct WirefireDb {
    conn: DatabaseConnection,
}

impl WirefireDb {
    /// open the database from config and apply pending migrations.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let url = Self::connection_url(&config.url);
        let conn = SeaOrmDatabase::connect(&url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// build a sqlite connection url, adding create mode for plain paths.
    fn connection_url(url: &str) -> String {
        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite:{}", url)
        };
        if url.contains('?') {
            url
        } else {
            format!("{}?mode=rwc", url)
        }
    }

    /// create an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = SeaOrmDatabase::connect("sqlite::memory:")
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        migration::Migrator::up(&self.conn, None)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;
        Ok(())
    }

    /// the underlying connection, for queries and transactions.
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries;
    use chrono::{Duration, Utc};
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
    use std::net::Ipv4Addr;
    use wirefire_types::{
        DiscoKey, Machine, MachineKey, NodeKey, Tailnet, User, UserClaims,
    };

    async fn setup() -> WirefireDb {
        WirefireDb::open_in_memory().await.unwrap()
    }

    fn claims(sub: &str, name: &str) -> UserClaims {
        UserClaims {
            issuer: "https://sso.example.com".to_string(),
            subject: sub.to_string(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            picture: String::new(),
        }
    }

    fn new_machine(name: &str, key_byte: u8, ipv4: Ipv4Addr, tailnet: &Tailnet, owner: &User) -> Machine {
        let now = Utc::now();
        Machine {
            id: 0,
            name: name.to_string(),
            name_idx: 0,
            noise_key: MachineKey::from_bytes(vec![key_byte; 32]),
            node_key: NodeKey::from_bytes(vec![key_byte + 1; 32]),
            disco_key: DiscoKey::from_bytes(vec![key_byte + 2; 32]),
            ephemeral: false,
            host_info: None,
            endpoints: vec!["192.0.2.1:41641".parse().unwrap()],
            ipv4,
            created_at: now,
            expires_at: now + Duration::days(180),
            last_seen: None,
            tailnet: tailnet.clone(),
            owner: owner.clone(),
        }
    }

    #[tokio::test]
    async fn user_upsert_is_stable_on_subject() {
        let db = setup().await;
        let conn = db.conn();

        let created = queries::upsert_user(conn, &claims("sub-1", "alice")).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.name, "alice");

        // same subject with refreshed claims keeps the id
        let updated = queries::upsert_user(conn, &claims("sub-1", "alice-renamed")).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "alice-renamed");

        let found = queries::find_user_by_subject(conn, "sub-1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.claims.email, "alice-renamed@example.com");
    }

    #[tokio::test]
    async fn tailnet_membership_listing() {
        let db = setup().await;
        let conn = db.conn();

        let user = queries::upsert_user(conn, &claims("sub-1", "alice")).await.unwrap();
        let t1 = queries::create_tailnet(conn, "alice-net", "{}").await.unwrap();
        let t2 = queries::create_tailnet(conn, "shared-net", "{}").await.unwrap();
        queries::create_tailnet(conn, "other-net", "{}").await.unwrap();

        queries::add_member(conn, t1.id, user.id, "admin").await.unwrap();
        queries::add_member(conn, t2.id, user.id, "member").await.unwrap();

        let tailnets = queries::list_tailnets_for_user(conn, user.id).await.unwrap();
        assert_eq!(tailnets.len(), 2);
        assert_eq!(tailnets[0].name, "alice-net");
        assert_eq!(tailnets[0].role, "admin");
        assert_eq!(tailnets[1].role, "member");

        assert!(queries::is_member(conn, user.id, t1.id).await.unwrap());
        assert!(!queries::is_member(conn, user.id + 1, t1.id).await.unwrap());
    }

    #[tokio::test]
    async fn machine_crud_and_upsert_semantics() {
        let db = setup().await;
        let conn = db.conn();

        let user = queries::upsert_user(conn, &claims("sub-1", "alice")).await.unwrap();
        let tailnet = queries::create_tailnet(conn, "alice-net", "{}").await.unwrap();
        queries::add_member(conn, tailnet.id, user.id, "member").await.unwrap();

        let machine = new_machine("laptop", 1, "100.64.0.1".parse().unwrap(), &tailnet, &user);
        let created = queries::upsert_machine(conn, &machine).await.unwrap();
        assert!(created.id > 0);

        // same noise key updates in place: id, created_at, tailnet, ipv4
        // unchanged while expires_at and last_seen track the latest write
        let mut second = created.clone();
        second.id = 0;
        second.last_seen = Some(Utc::now());
        second.expires_at = created.expires_at + Duration::days(1);
        let updated = queries::upsert_machine(conn, &second).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.ipv4, created.ipv4);
        assert_eq!(updated.tailnet.id, created.tailnet.id);
        assert_eq!(updated.owner.id, created.owner.id);
        assert!(updated.last_seen.is_some());
        assert!(updated.expires_at > created.expires_at);

        let found = queries::find_machine_by_noise_key(conn, &created.noise_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.owner.name, "alice");
        assert_eq!(found.tailnet.name, "alice-net");
        assert_eq!(found.endpoints.len(), 1);

        queries::delete_machine(conn, &created.noise_key).await.unwrap();
        assert!(
            queries::find_machine_by_noise_key(conn, &created.noise_key)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn name_index_allocation() {
        let db = setup().await;
        let conn = db.conn();

        let user = queries::upsert_user(conn, &claims("sub-1", "alice")).await.unwrap();
        let tailnet = queries::create_tailnet(conn, "alice-net", "{}").await.unwrap();
        queries::add_member(conn, tailnet.id, user.id, "member").await.unwrap();

        assert_eq!(queries::next_name_index(conn, tailnet.id, "laptop").await.unwrap(), 0);

        let m1 = new_machine("laptop", 1, "100.64.0.1".parse().unwrap(), &tailnet, &user);
        queries::upsert_machine(conn, &m1).await.unwrap();
        assert_eq!(queries::next_name_index(conn, tailnet.id, "laptop").await.unwrap(), 1);

        let mut m2 = new_machine("laptop", 4, "100.64.0.2".parse().unwrap(), &tailnet, &user);
        m2.name_idx = 1;
        let m2 = queries::upsert_machine(conn, &m2).await.unwrap();
        assert_eq!(m2.complete_name(), "laptop-1");
        assert_eq!(queries::next_name_index(conn, tailnet.id, "laptop").await.unwrap(), 2);

        // a different name starts back at 0
        assert_eq!(queries::next_name_index(conn, tailnet.id, "desktop").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ipv4_uniqueness_check() {
        let db = setup().await;
        let conn = db.conn();

        let user = queries::upsert_user(conn, &claims("sub-1", "alice")).await.unwrap();
        let tailnet = queries::create_tailnet(conn, "alice-net", "{}").await.unwrap();
        let other = queries::create_tailnet(conn, "other-net", "{}").await.unwrap();
        queries::add_member(conn, tailnet.id, user.id, "member").await.unwrap();

        let ip: Ipv4Addr = "100.64.0.7".parse().unwrap();
        assert!(!queries::ipv4_in_tailnet(conn, tailnet.id, ip).await.unwrap());

        let m = new_machine("laptop", 1, ip, &tailnet, &user);
        queries::upsert_machine(conn, &m).await.unwrap();

        assert!(queries::ipv4_in_tailnet(conn, tailnet.id, ip).await.unwrap());
        // the same address is free in a different tailnet
        assert!(!queries::ipv4_in_tailnet(conn, other.id, ip).await.unwrap());
    }

    #[tokio::test]
    async fn membership_removal_cascades_to_machines() {
        let db = setup().await;
        let conn = db.conn();

        let user = queries::upsert_user(conn, &claims("sub-1", "alice")).await.unwrap();
        let tailnet = queries::create_tailnet(conn, "alice-net", "{}").await.unwrap();
        queries::add_member(conn, tailnet.id, user.id, "member").await.unwrap();

        let m = new_machine("laptop", 1, "100.64.0.1".parse().unwrap(), &tailnet, &user);
        let m = queries::upsert_machine(conn, &m).await.unwrap();

        queries::remove_member(conn, tailnet.id, user.id).await.unwrap();

        assert!(
            queries::find_machine_by_noise_key(conn, &m.noise_key)
                .await
                .unwrap()
                .is_none(),
            "machines must cascade-delete with the membership"
        );
    }

    #[tokio::test]
    async fn registration_request_lifecycle() {
        let db = setup().await;
        let conn = db.conn();

        let key = MachineKey::from_bytes(vec![9; 32]);
        let data = serde_json::json!({"Version": 68, "Hostinfo": {"Hostname": "laptop"}});
        queries::create_registration_request(conn, "a1b2c3d4e5f60718", &key, &data)
            .await
            .unwrap();

        let rr = queries::find_registration_request(conn, "a1b2c3d4e5f60718")
            .await
            .unwrap()
            .unwrap();
        assert!(!rr.authenticated);
        assert!(rr.error.is_empty());
        assert!(rr.user.is_none());
        assert_eq!(rr.noise_key, key);
        assert_eq!(rr.data["Hostinfo"]["Hostname"], "laptop");
        assert!(!rr.is_complete());

        // unknown id
        assert!(
            queries::find_registration_request(conn, "ffffffffffffffff")
                .await
                .unwrap()
                .is_none()
        );

        // bind a user and mark authenticated
        let user = queries::upsert_user(conn, &claims("sub-1", "alice")).await.unwrap();
        let mut rr = rr;
        rr.authenticated = true;
        rr.user = Some(user.clone());
        queries::save_registration_request(conn, &rr).await.unwrap();

        let rr = queries::find_registration_request(conn, "a1b2c3d4e5f60718")
            .await
            .unwrap()
            .unwrap();
        assert!(rr.authenticated);
        assert!(rr.is_complete());
        assert_eq!(rr.user.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let db = setup().await;

        let result: std::result::Result<(), sea_orm::TransactionError<Error>> = db
            .conn()
            .transaction(|txn| {
                Box::pin(async move {
                    queries::create_tailnet(txn, "doomed-net", "{}").await?;
                    Err(Error::InvalidData("boom".to_string()))
                })
            })
            .await;
        assert!(result.is_err());

        // the tailnet created inside the failed transaction is gone
        let found = crate::entity::tailnet::Entity::find()
            .filter(crate::entity::tailnet::Column::Name.eq("doomed-net"))
            .one(db.conn())
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
