//! typed store operations.
//!
//! every operation is a free function generic over [`ConnectionTrait`], so
//! the same queries run against the pooled connection or inside a
//! transaction started with [`sea_orm::TransactionTrait::transaction`]
//! (which commits on success and rolls back on error or panic).

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use wirefire_types::{MachineKey, Machine, RegistrationRequest, Tailnet, User, UserClaims};

use crate::entity::{machine, membership, registration_request, tailnet, user};
use crate::{Error, Result};

// ─── users ───────────────────────────────────────────────────────────────

/// find a user by oidc subject claim.
pub async fn find_user_by_subject<C: ConnectionTrait>(
    conn: &C,
    subject: &str,
) -> Result<Option<User>> {
    let result = user::Entity::find()
        .filter(user::Column::Sub.eq(subject))
        .one(conn)
        .await?;
    Ok(result.map(Into::into))
}

/// find an existing user by subject or create one from the given claims.
///
/// an existing row keeps its id and created_at; the name and claims are
/// refreshed from the latest login.
pub async fn upsert_user<C: ConnectionTrait>(conn: &C, claims: &UserClaims) -> Result<User> {
    let model: user::ActiveModel = claims.into();
    let result = user::Entity::insert(model)
        .on_conflict(
            OnConflict::column(user::Column::Sub)
                .update_columns([user::Column::Name, user::Column::Claims])
                .to_owned(),
        )
        .exec_with_returning(conn)
        .await?;
    Ok(result.into())
}

// ─── tailnets and memberships ────────────────────────────────────────────

/// find a tailnet by id.
pub async fn find_tailnet<C: ConnectionTrait>(conn: &C, id: i64) -> Result<Option<Tailnet>> {
    let result = tailnet::Entity::find_by_id(id).one(conn).await?;
    Ok(result.map(Into::into))
}

/// list all tailnets where the given user is a member, with their role.
pub async fn list_tailnets_for_user<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
) -> Result<Vec<Tailnet>> {
    let memberships = membership::Entity::find()
        .filter(membership::Column::UserId.eq(user_id))
        .all(conn)
        .await?;

    let roles: HashMap<i64, String> = memberships
        .iter()
        .map(|m| (m.tailnet_id, m.role.clone()))
        .collect();

    let tailnets = tailnet::Entity::find()
        .filter(tailnet::Column::Id.is_in(roles.keys().copied()))
        .order_by_asc(tailnet::Column::Id)
        .all(conn)
        .await?;

    Ok(tailnets
        .into_iter()
        .map(|model| {
            let role = roles.get(&model.id).cloned().unwrap_or_default();
            let mut t: Tailnet = model.into();
            t.role = role;
            t
        })
        .collect())
}

/// whether the user is a member of the given tailnet.
pub async fn is_member<C: ConnectionTrait>(conn: &C, user_id: i64, tailnet_id: i64) -> Result<bool> {
    let count = membership::Entity::find()
        .filter(membership::Column::UserId.eq(user_id))
        .filter(membership::Column::TailnetId.eq(tailnet_id))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// create a tailnet. used by out-of-band administration and tests.
pub async fn create_tailnet<C: ConnectionTrait>(conn: &C, name: &str, acl: &str) -> Result<Tailnet> {
    let now = Utc::now();
    let model = tailnet::ActiveModel {
        id: NotSet,
        name: Set(name.to_string()),
        acl: Set(acl.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let result = model.insert(conn).await?;
    Ok(result.into())
}

/// add a user to a tailnet. used by out-of-band administration and tests.
pub async fn add_member<C: ConnectionTrait>(
    conn: &C,
    tailnet_id: i64,
    user_id: i64,
    role: &str,
) -> Result<()> {
    let model = membership::ActiveModel {
        tailnet_id: Set(tailnet_id),
        user_id: Set(user_id),
        role: Set(role.to_string()),
        created_at: Set(Utc::now()),
    };
    membership::Entity::insert(model)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// remove a user's membership. machines owned by the pair cascade-delete.
pub async fn remove_member<C: ConnectionTrait>(
    conn: &C,
    tailnet_id: i64,
    user_id: i64,
) -> Result<()> {
    membership::Entity::delete_many()
        .filter(membership::Column::TailnetId.eq(tailnet_id))
        .filter(membership::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(())
}

// ─── machines ────────────────────────────────────────────────────────────

/// find a machine by its noise key, with its owner and tailnet loaded.
pub async fn find_machine_by_noise_key<C: ConnectionTrait>(
    conn: &C,
    key: &MachineKey,
) -> Result<Option<Machine>> {
    let Some(model) = machine::Entity::find()
        .filter(machine::Column::NoiseKey.eq(key.to_string()))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let tailnet = find_tailnet(conn, model.tailnet_id)
        .await?
        .ok_or_else(|| Error::InvalidData(format!("machine {} has no tailnet", model.id)))?;
    let owner = user::Entity::find_by_id(model.user_id)
        .one(conn)
        .await?
        .map(User::from)
        .ok_or_else(|| Error::InvalidData(format!("machine {} has no owner", model.id)))?;

    Ok(Some(model.into_machine(tailnet, owner)))
}

/// list all machines in a tailnet, with owners loaded.
pub async fn list_machines_in_tailnet<C: ConnectionTrait>(
    conn: &C,
    tailnet: &Tailnet,
) -> Result<Vec<Machine>> {
    let models = machine::Entity::find()
        .filter(machine::Column::TailnetId.eq(tailnet.id))
        .order_by_asc(machine::Column::Id)
        .all(conn)
        .await?;

    let user_ids: Vec<i64> = models.iter().map(|m| m.user_id).collect();
    let owners: HashMap<i64, User> = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|u| (u.id, u.into()))
        .collect();

    Ok(models
        .into_iter()
        .filter_map(|model| {
            let owner = owners.get(&model.user_id)?.clone();
            Some(model.into_machine(tailnet.clone(), owner))
        })
        .collect())
}

/// upsert a machine.
///
/// an existing row with the same noise key is updated in place on its
/// mutable subset (name, keys, host info, endpoints, address, expiry, last
/// seen); the id, created_at, and tailnet membership never change.
pub async fn upsert_machine<C: ConnectionTrait>(conn: &C, m: &Machine) -> Result<Machine> {
    let model: machine::ActiveModel = m.into();
    let result = machine::Entity::insert(model)
        .on_conflict(
            OnConflict::column(machine::Column::NoiseKey)
                .update_columns([
                    machine::Column::Name,
                    machine::Column::NameIdx,
                    machine::Column::NodeKey,
                    machine::Column::DiscoKey,
                    machine::Column::Ephemeral,
                    machine::Column::HostInfo,
                    machine::Column::Endpoints,
                    machine::Column::Ipv4,
                    machine::Column::ExpiresAt,
                    machine::Column::LastSeen,
                ])
                .to_owned(),
        )
        .exec_with_returning(conn)
        .await?;

    Ok(result.into_machine(m.tailnet.clone(), m.owner.clone()))
}

/// delete a machine by its noise key.
pub async fn delete_machine<C: ConnectionTrait>(conn: &C, key: &MachineKey) -> Result<()> {
    machine::Entity::delete_many()
        .filter(machine::Column::NoiseKey.eq(key.to_string()))
        .exec(conn)
        .await?;
    Ok(())
}

/// next name_idx to use for the given hostname in a tailnet.
///
/// returns (highest existing index) + 1, or 0 when the name is unused.
pub async fn next_name_index<C: ConnectionTrait>(
    conn: &C,
    tailnet_id: i64,
    name: &str,
) -> Result<i64> {
    let current = machine::Entity::find()
        .filter(machine::Column::TailnetId.eq(tailnet_id))
        .filter(machine::Column::Name.eq(name))
        .order_by_desc(machine::Column::NameIdx)
        .one(conn)
        .await?;
    Ok(current.map(|m| m.name_idx + 1).unwrap_or(0))
}

/// whether the given ipv4 is already assigned inside the tailnet.
pub async fn ipv4_in_tailnet<C: ConnectionTrait>(
    conn: &C,
    tailnet_id: i64,
    ip: Ipv4Addr,
) -> Result<bool> {
    let count = machine::Entity::find()
        .filter(machine::Column::TailnetId.eq(tailnet_id))
        .filter(machine::Column::Ipv4.eq(ip.to_string()))
        .count(conn)
        .await?;
    Ok(count > 0)
}

// ─── registration requests ───────────────────────────────────────────────

/// create a registration request for the node identified by its noise key.
pub async fn create_registration_request<C: ConnectionTrait>(
    conn: &C,
    id: &str,
    noise_key: &MachineKey,
    data: &serde_json::Value,
) -> Result<()> {
    let model = registration_request::ActiveModel {
        id: Set(id.to_string()),
        noise_key: Set(noise_key.to_string()),
        data: Set(data.to_string()),
        authenticated: Set(false),
        user_id: Set(None),
        error: Set(String::new()),
        created_at: Set(Utc::now()),
    };
    registration_request::Entity::insert(model)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// find a registration request by id, with its bound user loaded when set.
pub async fn find_registration_request<C: ConnectionTrait>(
    conn: &C,
    id: &str,
) -> Result<Option<RegistrationRequest>> {
    let Some(model) = registration_request::Entity::find_by_id(id).one(conn).await? else {
        return Ok(None);
    };

    let user = match model.user_id {
        Some(user_id) => user::Entity::find_by_id(user_id)
            .one(conn)
            .await?
            .map(User::from),
        None => None,
    };

    Ok(Some(model.into_request(user)))
}

/// persist the mutable state of a registration request: the authenticated
/// flag, the bound user, and the error string.
pub async fn save_registration_request<C: ConnectionTrait>(
    conn: &C,
    req: &RegistrationRequest,
) -> Result<()> {
    registration_request::Entity::update_many()
        .col_expr(
            registration_request::Column::Authenticated,
            sea_orm::sea_query::Expr::value(req.authenticated),
        )
        .col_expr(
            registration_request::Column::Error,
            sea_orm::sea_query::Expr::value(req.error.clone()),
        )
        .col_expr(
            registration_request::Column::UserId,
            sea_orm::sea_query::Expr::value(req.user.as_ref().map(|u| u.id)),
        )
        .filter(registration_request::Column::Id.eq(req.id.clone()))
        .exec(conn)
        .await?;
    Ok(())
}
