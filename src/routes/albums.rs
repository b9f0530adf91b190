use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    membership,
    models::{Album, NewAlbum},
    perms,
    schema::albums,
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CheckParams {
    pub check: Option<bool>,
}

impl CheckParams {
    fn is_check(&self) -> bool {
        self.check.unwrap_or(false)
    }
}

fn check_accepted() -> Response {
    (StatusCode::ACCEPTED, Json(json!({ "message": "OK" }))).into_response()
}

#[derive(Serialize)]
pub struct AlbumResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub files: Vec<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl AlbumResponse {
    fn build(conn: &mut PgConnection, album: Album, at: NaiveDateTime) -> AppResult<Self> {
        let files = membership::active_file_ids(conn, album.id, at)?;
        Ok(Self {
            id: album.id,
            owner_id: album.owner_id,
            title: album.title,
            description: album.description,
            files,
            created_at: album.created_at,
            updated_at: album.updated_at,
        })
    }
}

fn load_album(conn: &mut PgConnection, id: Uuid) -> AppResult<Album> {
    let album = albums::table
        .find(id)
        .first::<Album>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("album not found"))?;
    if album.deleted {
        return Err(AppError::not_found("album not found"));
    }
    Ok(album)
}

#[derive(Deserialize)]
pub struct CreateAlbumRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub files: Vec<Uuid>,
}

pub async fn create_album(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<CheckParams>,
    Json(payload): Json<CreateAlbumRequest>,
) -> AppResult<Response> {
    if payload.title.trim().is_empty() {
        return Err(AppError::validation("title is required"));
    }
    if params.is_check() {
        return Ok(check_accepted());
    }

    let mut conn = state.db()?;
    let album = conn.transaction::<Album, AppError, _>(|conn| {
        let album = diesel::insert_into(albums::table)
            .values(NewAlbum {
                id: Uuid::new_v4(),
                owner_id: user.user_id,
                title: payload.title.trim().to_owned(),
                description: payload.description,
            })
            .get_result::<Album>(conn)?;

        perms::assign_user(conn, user.user_id, album.id, perms::CHANGE_ALBUM)?;
        perms::assign_user(conn, user.user_id, album.id, perms::DELETE_ALBUM)?;

        if !payload.files.is_empty() {
            membership::add_members(conn, album.id, &payload.files)?;
        }
        Ok(album)
    })?;

    tracing::info!(album_id = %album.id, owner = %user.username, "album created");

    let now = Utc::now().naive_utc();
    let response = AlbumResponse::build(&mut conn, album, now)?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct AlbumListQuery {
    /// Comma-separated file ids; only albums currently containing all of
    /// them match.
    pub files: Option<String>,
    pub search: Option<String>,
    pub sorting: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_albums(
    State(state): State<AppState>,
    Query(params): Query<AlbumListQuery>,
) -> AppResult<Json<Vec<AlbumResponse>>> {
    let mut conn = state.db()?;

    let offset = params.offset.unwrap_or(0).max(0);
    let limit = params
        .limit
        .unwrap_or(crate::listing::DEFAULT_LIMIT)
        .clamp(1, crate::listing::MAX_LIMIT);

    let mut query = albums::table
        .filter(albums::deleted.eq(false))
        .into_boxed();

    if let Some(files) = params.files.as_deref() {
        let file_ids = crate::listing::parse_uuid_csv(files, "files")?;
        if !file_ids.is_empty() {
            let album_ids = membership::album_ids_containing_all_files(&mut conn, &file_ids)?;
            query = query.filter(albums::id.eq_any(album_ids));
        }
    }

    if let Some(search) = params.search.as_deref() {
        let trimmed = search.trim();
        if !trimmed.is_empty() {
            let pattern = format!("%{}%", trimmed.replace('%', "\\%").replace('_', "\\_"));
            query = query.filter(
                albums::title
                    .ilike(pattern.clone())
                    .or(albums::description.ilike(pattern)),
            );
        }
    }

    query = match params.sorting.as_deref() {
        None | Some("created_asc") => query.order((albums::created_at.asc(), albums::id.asc())),
        Some("created_desc") => query.order((albums::created_at.desc(), albums::id.asc())),
        Some("title_asc") => query.order((albums::title.asc(), albums::id.asc())),
        Some("title_desc") => query.order((albums::title.desc(), albums::id.asc())),
        Some("updated_asc") => query.order((albums::updated_at.asc(), albums::id.asc())),
        Some("updated_desc") => query.order((albums::updated_at.desc(), albums::id.asc())),
        Some(other) => {
            return Err(AppError::validation(format!("unknown sorting: {other}")));
        }
    };

    let results = query
        .offset(offset)
        .limit(limit)
        .load::<Album>(&mut conn)?;

    let now = Utc::now().naive_utc();
    let mut responses = Vec::with_capacity(results.len());
    for album in results {
        responses.push(AlbumResponse::build(&mut conn, album, now)?);
    }
    Ok(Json(responses))
}

#[derive(Debug, Default, Deserialize)]
pub struct AlbumGetQuery {
    /// RFC 3339 timestamp; when present the file list reflects membership at
    /// that instant instead of now.
    pub at: Option<String>,
}

pub async fn get_album(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<AlbumGetQuery>,
) -> AppResult<Json<AlbumResponse>> {
    let at = match params.at.as_deref() {
        None => Utc::now().naive_utc(),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|_| AppError::validation("at must be an RFC 3339 timestamp"))?
            .naive_utc(),
    };

    let mut conn = state.db()?;
    let album = load_album(&mut conn, id)?;
    Ok(Json(AlbumResponse::build(&mut conn, album, at)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct AlbumUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub files: Option<Vec<Uuid>>,
}

async fn update_inner(
    state: AppState,
    user: AuthenticatedUser,
    id: Uuid,
    params: CheckParams,
    payload: AlbumUpdateRequest,
    replace: bool,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    let album = load_album(&mut conn, id)?;
    if !perms::has_permission(&mut conn, &user, album.id, perms::CHANGE_ALBUM)? {
        return Err(AppError::permission_denied("not allowed to change this album"));
    }

    if replace && payload.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        return Err(AppError::validation("title is required"));
    }
    if let Some(title) = payload.title.as_deref() {
        if title.trim().is_empty() {
            return Err(AppError::validation("title cannot be empty"));
        }
    }

    if params.is_check() {
        return Ok(check_accepted());
    }

    let updated = conn.transaction::<Album, AppError, _>(|conn| {
        let now = Utc::now().naive_utc();
        let updated = if replace {
            diesel::update(albums::table.find(album.id))
                .set((
                    albums::title.eq(payload.title.unwrap_or_default()),
                    albums::description.eq(payload.description.unwrap_or_default()),
                    albums::updated_at.eq(now),
                ))
                .get_result::<Album>(conn)?
        } else {
            diesel::update(albums::table.find(album.id))
                .set((
                    payload.title.map(|v| albums::title.eq(v)),
                    payload.description.map(|v| albums::description.eq(v)),
                    albums::updated_at.eq(now),
                ))
                .get_result::<Album>(conn)?
        };

        // PUT without files empties the album; PATCH only reconciles when
        // the files key is present.
        match (&payload.files, replace) {
            (Some(file_ids), _) => membership::set_members(conn, album.id, file_ids)?,
            (None, true) => membership::set_members(conn, album.id, &[])?,
            (None, false) => {}
        }

        Ok(updated)
    })?;

    let now = Utc::now().naive_utc();
    Ok(Json(AlbumResponse::build(&mut conn, updated, now)?).into_response())
}

pub async fn replace_album(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<CheckParams>,
    Json(payload): Json<AlbumUpdateRequest>,
) -> AppResult<Response> {
    update_inner(state, user, id, params, payload, true).await
}

pub async fn update_album(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<CheckParams>,
    Json(payload): Json<AlbumUpdateRequest>,
) -> AppResult<Response> {
    update_inner(state, user, id, params, payload, false).await
}

pub async fn delete_album(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<CheckParams>,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    let album = load_album(&mut conn, id)?;
    if !perms::has_permission(&mut conn, &user, album.id, perms::DELETE_ALBUM)? {
        return Err(AppError::permission_denied("not allowed to delete this album"));
    }
    if params.is_check() {
        return Ok(check_accepted());
    }

    conn.transaction::<(), AppError, _>(|conn| {
        diesel::update(albums::table.find(album.id))
            .set((
                albums::deleted.eq(true),
                albums::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        // A deleted album keeps its history but holds nothing active.
        membership::set_members(conn, album.id, &[])?;
        Ok(())
    })?;

    tracing::info!(album_id = %album.id, "album soft-deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}
