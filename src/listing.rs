//! File listing: visibility, filters, search, sort, and paging, composed in
//! that order on top of a boxed diesel query.

use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::lifecycle::FileStatus;
use crate::media::FileKind;
use crate::membership::{file_ids_in_all_albums, file_ids_in_any_album};
use crate::models::File;
use crate::perms::{self, granted_object_ids};
use crate::schema::files;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 500;

type BoxedCond = Box<dyn BoxableExpression<files::table, Pg, SqlType = Bool>>;

/// Query-string parameters for `GET /api/v1/files/`. Multi-valued filters
/// are comma-separated lists.
#[derive(Debug, Default, Deserialize)]
pub struct FileListQuery {
    pub filetypes: Option<String>,
    pub statuses: Option<String>,
    pub licenses: Option<String>,
    pub uploaders: Option<String>,
    pub albums: Option<String>,
    pub not_albums: Option<String>,
    pub size: Option<i64>,
    pub size_lt: Option<i64>,
    pub size_gt: Option<i64>,
    pub search: Option<String>,
    pub sorting: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    TitleAsc,
    TitleDesc,
    CreatedAsc,
    CreatedDesc,
    UpdatedAsc,
    UpdatedDesc,
    SizeAsc,
    SizeDesc,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "title_asc" => Some(SortKey::TitleAsc),
            "title_desc" => Some(SortKey::TitleDesc),
            "created_asc" => Some(SortKey::CreatedAsc),
            "created_desc" => Some(SortKey::CreatedDesc),
            "updated_asc" => Some(SortKey::UpdatedAsc),
            "updated_desc" => Some(SortKey::UpdatedDesc),
            "file_size_asc" => Some(SortKey::SizeAsc),
            "file_size_desc" => Some(SortKey::SizeDesc),
            _ => None,
        }
    }
}

pub fn split_csv(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

pub fn parse_uuid_csv(value: &str, field: &str) -> AppResult<Vec<Uuid>> {
    split_csv(value)
        .into_iter()
        .map(|part| {
            Uuid::parse_str(part)
                .map_err(|_| AppError::validation(format!("invalid uuid in {field}: {part}")))
        })
        .collect()
}

fn status_condition(status: FileStatus) -> BoxedCond {
    match status {
        FileStatus::PendingModeration => {
            Box::new(files::approved.eq(false).and(files::deleted.eq(false)))
        }
        FileStatus::Unpublished => Box::new(
            files::approved
                .eq(true)
                .and(files::published.eq(false))
                .and(files::deleted.eq(false)),
        ),
        FileStatus::Published => {
            Box::new(files::published.eq(true).and(files::deleted.eq(false)))
        }
        FileStatus::PendingDeletion => Box::new(files::deleted.eq(true)),
    }
}

fn parse_status(value: &str) -> AppResult<FileStatus> {
    match value {
        "PENDING_MODERATION" => Ok(FileStatus::PendingModeration),
        "UNPUBLISHED" => Ok(FileStatus::Unpublished),
        "PUBLISHED" => Ok(FileStatus::Published),
        "PENDING_DELETION" => Ok(FileStatus::PendingDeletion),
        other => Err(AppError::validation(format!("unknown status: {other}"))),
    }
}

/// Run the list query for the caller. Anonymous callers see only published
/// content; authenticated callers additionally see files they hold a view
/// grant on; admins see everything.
pub fn list_files(
    conn: &mut PgConnection,
    caller: Option<&AuthenticatedUser>,
    params: &FileListQuery,
) -> AppResult<Vec<File>> {
    let mut query = files::table.into_boxed();

    // Visibility comes first so later filters can only narrow it.
    let public = || {
        files::approved
            .eq(true)
            .and(files::published.eq(true))
            .and(files::deleted.eq(false))
    };
    match caller {
        None => query = query.filter(public()),
        Some(user) if user.is_admin() => {}
        Some(user) => {
            let visible = granted_object_ids(conn, user, perms::VIEW_FILE)?;
            query = query.filter(public().or(files::id.eq_any(visible)));
        }
    }

    if let Some(types) = params.filetypes.as_deref() {
        let mut kinds = Vec::new();
        for part in split_csv(types) {
            let kind = FileKind::parse(part)
                .ok_or_else(|| AppError::validation(format!("unknown filetype: {part}")))?;
            kinds.push(kind.as_str());
        }
        if !kinds.is_empty() {
            query = query.filter(files::file_type.eq_any(kinds));
        }
    }

    if let Some(statuses) = params.statuses.as_deref() {
        let mut cond: Option<BoxedCond> = None;
        for part in split_csv(statuses) {
            let expr = status_condition(parse_status(part)?);
            cond = Some(match cond {
                None => expr,
                Some(acc) => Box::new(acc.or(expr)),
            });
        }
        if let Some(cond) = cond {
            query = query.filter(cond);
        }
    }

    if let Some(licenses) = params.licenses.as_deref() {
        let wanted: Vec<String> = split_csv(licenses)
            .into_iter()
            .map(str::to_owned)
            .collect();
        if !wanted.is_empty() {
            query = query.filter(files::license.eq_any(wanted));
        }
    }

    if let Some(uploaders) = params.uploaders.as_deref() {
        let ids = parse_uuid_csv(uploaders, "uploaders")?;
        if !ids.is_empty() {
            query = query.filter(files::uploader_id.eq_any(ids));
        }
    }

    // `albums` intersects: the file must currently be in every album.
    // `not_albums` excludes current members of any listed album.
    if let Some(albums) = params.albums.as_deref() {
        let album_ids = parse_uuid_csv(albums, "albums")?;
        if !album_ids.is_empty() {
            let member_ids = file_ids_in_all_albums(conn, &album_ids)?;
            query = query.filter(files::id.eq_any(member_ids));
        }
    }
    if let Some(not_albums) = params.not_albums.as_deref() {
        let album_ids = parse_uuid_csv(not_albums, "not_albums")?;
        if !album_ids.is_empty() {
            let member_ids = file_ids_in_any_album(conn, &album_ids)?;
            query = query.filter(files::id.ne_all(member_ids));
        }
    }

    if let Some(size) = params.size {
        query = query.filter(files::file_size.eq(size));
    }
    if let Some(size_lt) = params.size_lt {
        query = query.filter(files::file_size.lt(size_lt));
    }
    if let Some(size_gt) = params.size_gt {
        query = query.filter(files::file_size.gt(size_gt));
    }

    if let Some(search) = params.search.as_deref() {
        let trimmed = search.trim();
        if !trimmed.is_empty() {
            let pattern = format!("%{}%", trimmed.replace('%', "\\%").replace('_', "\\_"));
            query = query.filter(
                files::title
                    .ilike(pattern.clone())
                    .or(files::description.ilike(pattern)),
            );
        }
    }

    let sort = match params.sorting.as_deref() {
        None => SortKey::CreatedAsc,
        Some(value) => SortKey::parse(value)
            .ok_or_else(|| AppError::validation(format!("unknown sorting: {value}")))?,
    };
    query = match sort {
        SortKey::TitleAsc => query.order((files::title.asc(), files::id.asc())),
        SortKey::TitleDesc => query.order((files::title.desc(), files::id.asc())),
        SortKey::CreatedAsc => query.order((files::created_at.asc(), files::id.asc())),
        SortKey::CreatedDesc => query.order((files::created_at.desc(), files::id.asc())),
        SortKey::UpdatedAsc => query.order((files::updated_at.asc(), files::id.asc())),
        SortKey::UpdatedDesc => query.order((files::updated_at.desc(), files::id.asc())),
        SortKey::SizeAsc => query.order((files::file_size.asc(), files::id.asc())),
        SortKey::SizeDesc => query.order((files::file_size.desc(), files::id.asc())),
    };

    let offset = params.offset.unwrap_or(0).max(0);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);

    let results = query.offset(offset).limit(limit).load::<File>(conn)?;
    Ok(results)
}
