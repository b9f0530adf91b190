//! Users and groups: lookup, get-or-create helpers, and startup bootstrap.

use diesel::prelude::*;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::auth::{ROLE_ADMIN, ROLE_USER};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Group, NewGroup, NewGroupMember, NewUser, User};
use crate::schema::{group_members, groups, users};

pub fn find_user_by_username(conn: &mut PgConnection, name: &str) -> AppResult<Option<User>> {
    let user = users::table
        .filter(users::username.eq(name))
        .first::<User>(conn)
        .optional()?;
    Ok(user)
}

pub fn find_user(conn: &mut PgConnection, id: Uuid) -> AppResult<User> {
    let user = users::table
        .find(id)
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(user)
}

pub fn get_or_create_group(conn: &mut PgConnection, name: &str) -> AppResult<Group> {
    if let Some(group) = groups::table
        .filter(groups::name.eq(name))
        .first::<Group>(conn)
        .optional()?
    {
        return Ok(group);
    }

    let group = diesel::insert_into(groups::table)
        .values(NewGroup {
            id: Uuid::new_v4(),
            name: name.to_owned(),
        })
        .on_conflict(groups::name)
        .do_nothing()
        .get_result::<Group>(conn)
        .optional()?;

    match group {
        Some(group) => Ok(group),
        // Lost the race; the row exists now.
        None => Ok(groups::table
            .filter(groups::name.eq(name))
            .first::<Group>(conn)?),
    }
}

pub fn add_group_member(conn: &mut PgConnection, group_id: Uuid, user_id: Uuid) -> AppResult<()> {
    diesel::insert_into(group_members::table)
        .values(NewGroupMember { group_id, user_id })
        .on_conflict((group_members::group_id, group_members::user_id))
        .do_nothing()
        .execute(conn)?;
    Ok(())
}

/// All group ids the user belongs to, for resolving group-level grants.
pub fn user_group_ids(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = group_members::table
        .filter(group_members::user_id.eq(user_id))
        .select(group_members::group_id)
        .load::<Uuid>(conn)?;
    Ok(ids)
}

/// The placeholder account that inherits content when a real user is removed.
pub fn get_or_create_sentinel(conn: &mut PgConnection, username: &str) -> AppResult<User> {
    if let Some(user) = find_user_by_username(conn, username)? {
        return Ok(user);
    }

    // Random password, never meant to be logged into.
    let password_hash = hash_password(&Uuid::new_v4().to_string())
        .map_err(|err| AppError::internal(format!("failed to hash sentinel password: {err}")))?;
    let user = diesel::insert_into(users::table)
        .values(NewUser {
            id: Uuid::new_v4(),
            username: username.to_owned(),
            password_hash,
            role: ROLE_USER.to_owned(),
        })
        .on_conflict(users::username)
        .do_nothing()
        .get_result::<User>(conn)
        .optional()?;

    match user {
        Some(user) => Ok(user),
        None => find_user_by_username(conn, username)?
            .ok_or_else(|| AppError::internal("sentinel user vanished during creation")),
    }
}

/// Startup bootstrap: make sure the sentinel user and the moderators group
/// exist, and create the configured admin account if it is missing.
pub fn bootstrap(conn: &mut PgConnection, config: &AppConfig) -> AppResult<()> {
    get_or_create_sentinel(conn, &config.sentinel_username)?;
    get_or_create_group(conn, &config.moderator_group)?;

    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        if find_user_by_username(conn, username)?.is_none() {
            let password_hash = hash_password(password).map_err(|err| {
                AppError::internal(format!("failed to hash admin password: {err}"))
            })?;
            diesel::insert_into(users::table)
                .values(NewUser {
                    id: Uuid::new_v4(),
                    username: username.clone(),
                    password_hash,
                    role: ROLE_ADMIN.to_owned(),
                })
                .on_conflict(users::username)
                .do_nothing()
                .execute(conn)?;
            tracing::info!(username = %username, "created admin account");
        }
    }

    Ok(())
}
