//! Time-ranged album membership.
//!
//! Every file/album link is a period row. Adding a file opens a row with a
//! NULL end; removing it closes the open row at the current instant. The
//! `album_memberships_no_overlap` exclusion constraint is the single
//! authority preventing two open or overlapping periods for the same pair.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{AlbumMembership, NewAlbumMembership};
use crate::schema::album_memberships;

/// Open membership row for the pair, if one exists.
fn open_membership(
    conn: &mut PgConnection,
    album_id: Uuid,
    file_id: Uuid,
) -> AppResult<Option<AlbumMembership>> {
    let row = album_memberships::table
        .filter(album_memberships::album_id.eq(album_id))
        .filter(album_memberships::file_id.eq(file_id))
        .filter(album_memberships::period_end.is_null())
        .first::<AlbumMembership>(conn)
        .optional()?;
    Ok(row)
}

/// Add files to an album. Files already in the album are left alone, so the
/// call is idempotent; a genuine overlap race surfaces as a constraint
/// violation and maps to a wrong-state error.
pub fn add_members(conn: &mut PgConnection, album_id: Uuid, file_ids: &[Uuid]) -> AppResult<usize> {
    let now = Utc::now().naive_utc();
    let mut added = 0;
    for &file_id in file_ids {
        if open_membership(conn, album_id, file_id)?.is_some() {
            continue;
        }
        diesel::insert_into(album_memberships::table)
            .values(NewAlbumMembership {
                id: Uuid::new_v4(),
                file_id,
                album_id,
                period_start: now,
                period_end: None,
            })
            .execute(conn)?;
        added += 1;
    }
    Ok(added)
}

/// Remove files from an album by closing their open periods. History rows
/// are never deleted. Files without an open period are skipped.
pub fn remove_members(
    conn: &mut PgConnection,
    album_id: Uuid,
    file_ids: &[Uuid],
) -> AppResult<usize> {
    let now = Utc::now().naive_utc();
    let removed = diesel::update(
        album_memberships::table
            .filter(album_memberships::album_id.eq(album_id))
            .filter(album_memberships::file_id.eq_any(file_ids))
            .filter(album_memberships::period_end.is_null()),
    )
    .set(album_memberships::period_end.eq(now))
    .execute(conn)?;
    Ok(removed)
}

/// Replace the album's active membership with exactly `file_ids`: close
/// periods for files no longer wanted, open periods for newcomers.
pub fn set_members(conn: &mut PgConnection, album_id: Uuid, file_ids: &[Uuid]) -> AppResult<()> {
    let current = active_file_ids(conn, album_id, Utc::now().naive_utc())?;

    let to_remove: Vec<Uuid> = current
        .iter()
        .copied()
        .filter(|id| !file_ids.contains(id))
        .collect();
    let to_add: Vec<Uuid> = file_ids
        .iter()
        .copied()
        .filter(|id| !current.contains(id))
        .collect();

    if !to_remove.is_empty() {
        remove_members(conn, album_id, &to_remove)?;
    }
    if !to_add.is_empty() {
        add_members(conn, album_id, &to_add)?;
    }
    Ok(())
}

/// File ids whose membership period contains `at`, in period-start order.
pub fn active_file_ids(
    conn: &mut PgConnection,
    album_id: Uuid,
    at: NaiveDateTime,
) -> AppResult<Vec<Uuid>> {
    let ids = album_memberships::table
        .filter(album_memberships::album_id.eq(album_id))
        .filter(album_memberships::period_start.le(at))
        .filter(
            album_memberships::period_end
                .is_null()
                .or(album_memberships::period_end.gt(at)),
        )
        .order(album_memberships::period_start.asc())
        .select(album_memberships::file_id)
        .load::<Uuid>(conn)?;
    Ok(ids)
}

/// File ids currently in the album.
pub fn current_file_ids(conn: &mut PgConnection, album_id: Uuid) -> AppResult<Vec<Uuid>> {
    active_file_ids(conn, album_id, Utc::now().naive_utc())
}

/// Album ids the file is currently a member of.
pub fn current_album_ids(conn: &mut PgConnection, file_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = album_memberships::table
        .filter(album_memberships::file_id.eq(file_id))
        .filter(album_memberships::period_end.is_null())
        .select(album_memberships::album_id)
        .load::<Uuid>(conn)?;
    Ok(ids)
}

/// Album ids that currently contain every one of the given files. An empty
/// file list matches nothing.
pub fn album_ids_containing_all_files(
    conn: &mut PgConnection,
    file_ids: &[Uuid],
) -> AppResult<Vec<Uuid>> {
    let mut result: Option<Vec<Uuid>> = None;
    for &file_id in file_ids {
        let ids = current_album_ids(conn, file_id)?;
        result = Some(match result {
            None => ids,
            Some(acc) => acc.into_iter().filter(|id| ids.contains(id)).collect(),
        });
        if matches!(result.as_deref(), Some([])) {
            break;
        }
    }
    Ok(result.unwrap_or_default())
}

/// File ids currently in at least one of the given albums.
pub fn file_ids_in_any_album(
    conn: &mut PgConnection,
    album_ids: &[Uuid],
) -> AppResult<Vec<Uuid>> {
    let ids = album_memberships::table
        .filter(album_memberships::album_id.eq_any(album_ids))
        .filter(album_memberships::period_end.is_null())
        .select(album_memberships::file_id)
        .distinct()
        .load::<Uuid>(conn)?;
    Ok(ids)
}

/// File ids currently in every one of the given albums. An empty album list
/// matches nothing.
pub fn file_ids_in_all_albums(
    conn: &mut PgConnection,
    album_ids: &[Uuid],
) -> AppResult<Vec<Uuid>> {
    let mut result: Option<Vec<Uuid>> = None;
    for &album_id in album_ids {
        let ids = current_file_ids(conn, album_id)?;
        result = Some(match result {
            None => ids,
            Some(acc) => acc.into_iter().filter(|id| ids.contains(id)).collect(),
        });
        if matches!(result.as_deref(), Some([])) {
            break;
        }
    }
    Ok(result.unwrap_or_default())
}
