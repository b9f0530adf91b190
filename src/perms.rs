//! Per-object permission ledger.
//!
//! Grants live in `object_permissions`, one row per (principal, object,
//! permission). A principal is either a user or a group, never both. Admins
//! never hit this table; callers check [`AuthenticatedUser::is_admin`] first.

use diesel::prelude::*;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::directory::user_group_ids;
use crate::error::AppResult;
use crate::models::NewObjectPermission;
use crate::schema::object_permissions;

pub const VIEW_FILE: &str = "view_file";
pub const CHANGE_FILE: &str = "change_file";
pub const DELETE_FILE: &str = "delete_file";
pub const APPROVE_FILE: &str = "approve_file";
pub const UNAPPROVE_FILE: &str = "unapprove_file";
pub const PUBLISH_FILE: &str = "publish_file";
pub const UNPUBLISH_FILE: &str = "unpublish_file";
pub const CHANGE_ALBUM: &str = "change_album";
pub const DELETE_ALBUM: &str = "delete_album";

/// Idempotent user grant. Re-granting an existing permission is a no-op.
pub fn assign_user(
    conn: &mut PgConnection,
    user_id: Uuid,
    object_id: Uuid,
    permission: &str,
) -> AppResult<()> {
    diesel::insert_into(object_permissions::table)
        .values(NewObjectPermission {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            group_id: None,
            object_id,
            permission: permission.to_owned(),
        })
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(())
}

/// Idempotent group grant.
pub fn assign_group(
    conn: &mut PgConnection,
    group_id: Uuid,
    object_id: Uuid,
    permission: &str,
) -> AppResult<()> {
    diesel::insert_into(object_permissions::table)
        .values(NewObjectPermission {
            id: Uuid::new_v4(),
            user_id: None,
            group_id: Some(group_id),
            object_id,
            permission: permission.to_owned(),
        })
        .on_conflict_do_nothing()
        .execute(conn)?;
    Ok(())
}

/// Remove a direct user grant. Group grants are untouched.
pub fn revoke_user(
    conn: &mut PgConnection,
    user_id: Uuid,
    object_id: Uuid,
    permission: &str,
) -> AppResult<()> {
    diesel::delete(
        object_permissions::table
            .filter(object_permissions::user_id.eq(user_id))
            .filter(object_permissions::object_id.eq(object_id))
            .filter(object_permissions::permission.eq(permission)),
    )
    .execute(conn)?;
    Ok(())
}

/// Remove a group grant. Direct user grants are untouched.
pub fn revoke_group(
    conn: &mut PgConnection,
    group_id: Uuid,
    object_id: Uuid,
    permission: &str,
) -> AppResult<()> {
    diesel::delete(
        object_permissions::table
            .filter(object_permissions::group_id.eq(group_id))
            .filter(object_permissions::object_id.eq(object_id))
            .filter(object_permissions::permission.eq(permission)),
    )
    .execute(conn)?;
    Ok(())
}

/// Whether the caller holds `permission` on `object_id`, either directly or
/// through group membership. Admins always pass.
pub fn has_permission(
    conn: &mut PgConnection,
    caller: &AuthenticatedUser,
    object_id: Uuid,
    permission: &str,
) -> AppResult<bool> {
    if caller.is_admin() {
        return Ok(true);
    }

    let group_ids = user_group_ids(conn, caller.user_id)?;
    let count: i64 = object_permissions::table
        .filter(object_permissions::object_id.eq(object_id))
        .filter(object_permissions::permission.eq(permission))
        .filter(
            object_permissions::user_id
                .eq(caller.user_id)
                .or(object_permissions::group_id.eq_any(group_ids)),
        )
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Object ids on which the caller holds `permission`, used by the listing
/// engine to widen visibility past published content.
pub fn granted_object_ids(
    conn: &mut PgConnection,
    caller: &AuthenticatedUser,
    permission: &str,
) -> AppResult<Vec<Uuid>> {
    let group_ids = user_group_ids(conn, caller.user_id)?;
    let ids = object_permissions::table
        .filter(object_permissions::permission.eq(permission))
        .filter(
            object_permissions::user_id
                .eq(caller.user_id)
                .or(object_permissions::group_id.eq_any(group_ids)),
        )
        .select(object_permissions::object_id)
        .distinct()
        .load::<Uuid>(conn)?;
    Ok(ids)
}
