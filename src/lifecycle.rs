//! File moderation lifecycle.
//!
//! The state is stored as three booleans on the file row (`approved`,
//! `published`, `deleted`) and the externally visible status is derived from
//! them. Publishing implies approval; soft deletion wins over everything.

use chrono::Utc;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::File;
use crate::perms;
use crate::schema::files;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    PendingModeration,
    Unpublished,
    Published,
    PendingDeletion,
}

impl FileStatus {
    pub fn of(file: &File) -> Self {
        if file.deleted {
            FileStatus::PendingDeletion
        } else if !file.approved {
            FileStatus::PendingModeration
        } else if file.published {
            FileStatus::Published
        } else {
            FileStatus::Unpublished
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::PendingModeration => "PENDING_MODERATION",
            FileStatus::Unpublished => "UNPUBLISHED",
            FileStatus::Published => "PUBLISHED",
            FileStatus::PendingDeletion => "PENDING_DELETION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Approve,
    Unapprove,
    Publish,
    Unpublish,
}

impl FileAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(FileAction::Approve),
            "unapprove" => Some(FileAction::Unapprove),
            "publish" => Some(FileAction::Publish),
            "unpublish" => Some(FileAction::Unpublish),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileAction::Approve => "approve",
            FileAction::Unapprove => "unapprove",
            FileAction::Publish => "publish",
            FileAction::Unpublish => "unpublish",
        }
    }

    pub fn required_permission(self) -> &'static str {
        match self {
            FileAction::Approve => perms::APPROVE_FILE,
            FileAction::Unapprove => perms::UNAPPROVE_FILE,
            FileAction::Publish => perms::PUBLISH_FILE,
            FileAction::Unpublish => perms::UNPUBLISH_FILE,
        }
    }

    /// Whether the action is legal in the file's current state. Soft-deleted
    /// files accept no actions.
    pub fn eligible(self, file: &File) -> bool {
        if file.deleted {
            return false;
        }
        match self {
            FileAction::Approve => !file.approved,
            FileAction::Unapprove => file.approved,
            FileAction::Publish => file.approved && !file.published,
            FileAction::Unpublish => file.published,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub requested: usize,
    pub eligible: usize,
    pub updated: usize,
    /// Ids the action applied to (or would apply to, on a dry run).
    pub files: Vec<Uuid>,
}

fn write_transition(conn: &mut PgConnection, file: &File, action: FileAction) -> AppResult<File> {
    let now = Utc::now().naive_utc();
    let updated = match action {
        FileAction::Approve => diesel::update(files::table.find(file.id))
            .set((files::approved.eq(true), files::updated_at.eq(now)))
            .get_result::<File>(conn)?,
        // Unapproving also unpublishes, so published always implies approved.
        FileAction::Unapprove => diesel::update(files::table.find(file.id))
            .set((
                files::approved.eq(false),
                files::published.eq(false),
                files::updated_at.eq(now),
            ))
            .get_result::<File>(conn)?,
        FileAction::Publish => diesel::update(files::table.find(file.id))
            .set((files::published.eq(true), files::updated_at.eq(now)))
            .get_result::<File>(conn)?,
        FileAction::Unpublish => diesel::update(files::table.find(file.id))
            .set((files::published.eq(false), files::updated_at.eq(now)))
            .get_result::<File>(conn)?,
    };

    match action {
        FileAction::Approve => {
            perms::assign_user(conn, updated.uploader_id, updated.id, perms::PUBLISH_FILE)?;
            perms::assign_user(conn, updated.uploader_id, updated.id, perms::UNPUBLISH_FILE)?;
        }
        FileAction::Unapprove => {
            perms::revoke_user(conn, updated.uploader_id, updated.id, perms::PUBLISH_FILE)?;
            perms::revoke_user(conn, updated.uploader_id, updated.id, perms::UNPUBLISH_FILE)?;
        }
        FileAction::Publish | FileAction::Unpublish => {}
    }

    Ok(updated)
}

/// Apply an action to a single file with strict errors: missing permission is
/// 403, an ineligible state is 409. With `check` set nothing is written.
pub fn apply_action(
    conn: &mut PgConnection,
    caller: &AuthenticatedUser,
    file_id: Uuid,
    action: FileAction,
    check: bool,
) -> AppResult<File> {
    let file = files::table
        .find(file_id)
        .first::<File>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("file not found"))?;

    if !perms::has_permission(conn, caller, file.id, action.required_permission())? {
        return Err(AppError::permission_denied(format!(
            "not allowed to {} this file",
            action.as_str()
        )));
    }
    if !action.eligible(&file) {
        return Err(AppError::wrong_state(format!(
            "cannot {} a file in status {}",
            action.as_str(),
            FileStatus::of(&file).as_str()
        )));
    }
    if check {
        return Ok(file);
    }

    conn.transaction(|conn| write_transition(conn, &file, action))
}

/// Apply an action to a batch of files. Files the caller may not act on or
/// that are in the wrong state are skipped rather than failing the request;
/// the outcome reports how many were requested, eligible, and written.
pub fn apply_batch(
    conn: &mut PgConnection,
    caller: &AuthenticatedUser,
    file_ids: &[Uuid],
    action: FileAction,
    check: bool,
) -> AppResult<BatchOutcome> {
    let candidates = files::table
        .filter(files::id.eq_any(file_ids))
        .load::<File>(conn)?;

    let mut eligible = Vec::new();
    for file in candidates {
        if action.eligible(&file)
            && perms::has_permission(conn, caller, file.id, action.required_permission())?
        {
            eligible.push(file);
        }
    }

    let eligible_ids: Vec<Uuid> = eligible.iter().map(|file| file.id).collect();
    if check {
        return Ok(BatchOutcome {
            requested: file_ids.len(),
            eligible: eligible.len(),
            updated: 0,
            files: eligible_ids,
        });
    }

    let updated = conn.transaction(|conn| {
        let mut updated = 0;
        for file in &eligible {
            write_transition(conn, file, action)?;
            updated += 1;
        }
        Ok::<usize, AppError>(updated)
    })?;

    Ok(BatchOutcome {
        requested: file_ids.len(),
        eligible: eligible.len(),
        updated,
        files: eligible_ids,
    })
}
