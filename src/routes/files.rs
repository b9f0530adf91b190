use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
    auth::{AuthenticatedUser, OptionalUser},
    error::{AppError, AppResult},
    lifecycle::{self, BatchOutcome, FileAction, FileStatus},
    listing::{self, FileListQuery},
    media::{self, FileKind},
    membership,
    models::{File, NewFile},
    perms,
    schema::files,
    state::AppState,
};

const DOWNLOAD_URL_TTL: std::time::Duration = std::time::Duration::from_secs(15 * 60);

#[derive(Debug, Default, Deserialize)]
pub struct CheckParams {
    pub check: Option<bool>,
}

impl CheckParams {
    fn is_check(&self) -> bool {
        self.check.unwrap_or(false)
    }
}

fn check_accepted() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::ACCEPTED, Json(json!({ "message": "OK" })))
}

#[derive(Serialize)]
pub struct FileResponse {
    pub id: Uuid,
    pub uploader_id: Uuid,
    pub file_type: String,
    pub title: String,
    pub description: String,
    pub attribution: String,
    pub original_source: String,
    pub license: String,
    pub status: FileStatus,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub thumbnail_url: String,
    pub albums: Vec<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl FileResponse {
    fn build(conn: &mut PgConnection, file: File) -> AppResult<Self> {
        let albums = membership::current_album_ids(conn, file.id)?;
        let status = FileStatus::of(&file);
        Ok(Self {
            id: file.id,
            uploader_id: file.uploader_id,
            file_type: file.file_type,
            title: file.title,
            description: file.description,
            attribution: file.attribution,
            original_source: file.original_source,
            license: file.license,
            status,
            original_filename: file.original_filename,
            file_size: file.file_size,
            mime_type: file.mime_type,
            thumbnail_url: file.thumbnail_url,
            albums,
            created_at: file.created_at,
            updated_at: file.updated_at,
        })
    }
}

fn load_file(conn: &mut PgConnection, id: Uuid) -> AppResult<File> {
    files::table
        .find(id)
        .first::<File>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("file not found"))
}

fn is_public(file: &File) -> bool {
    file.approved && file.published && !file.deleted
}

/// Read access: public files are visible to everyone, anything else needs a
/// view grant or the admin role.
fn ensure_viewable(
    conn: &mut PgConnection,
    caller: Option<&AuthenticatedUser>,
    file: &File,
) -> AppResult<()> {
    if is_public(file) {
        return Ok(());
    }
    if let Some(user) = caller {
        if perms::has_permission(conn, user, file.id, perms::VIEW_FILE)? {
            return Ok(());
        }
    }
    Err(AppError::permission_denied("not allowed to view this file"))
}

fn sanitize_filename(raw: &str) -> String {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim()
        .to_owned();
    if name.is_empty() {
        "upload".to_owned()
    } else {
        name
    }
}

#[derive(Deserialize)]
struct UploadMetadata {
    title: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    attribution: String,
    #[serde(default)]
    original_source: String,
    license: String,
    thumbnail_url: Option<String>,
}

pub async fn upload_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<CheckParams>,
    mut multipart: Multipart,
) -> AppResult<axum::response::Response> {
    use axum::response::IntoResponse;

    let mut metadata: Option<UploadMetadata> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_filename = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        match field.name() {
            Some("metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("unreadable metadata: {err}")))?;
                metadata = Some(
                    serde_json::from_str(&text)
                        .map_err(|err| AppError::validation(format!("invalid metadata: {err}")))?,
                );
            }
            Some("file") => {
                original_filename =
                    sanitize_filename(field.file_name().unwrap_or("upload"));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("unreadable file: {err}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let metadata = metadata.ok_or_else(|| AppError::validation("missing metadata field"))?;
    let bytes = file_bytes.ok_or_else(|| AppError::validation("missing file field"))?;
    if bytes.is_empty() {
        return Err(AppError::validation("uploaded file is empty"));
    }

    media::validate_license(&metadata.license)?;
    let (kind, mime_type) = media::sniff_kind(&bytes)?;
    if let Some(url) = metadata.thumbnail_url.as_deref() {
        media::validate_thumbnail_url(url)?;
    }

    if params.is_check() {
        return Ok(check_accepted().into_response());
    }

    let hash = media::content_hash(&bytes);
    let s3_key = format!("media/{hash}/{original_filename}");

    // Client-supplied thumbnail beats the generated one, but only for safe
    // local paths.
    let thumbnail_url = match metadata.thumbnail_url {
        Some(url) => url,
        None if kind == FileKind::Picture => {
            let thumb = media::render_thumbnail(&bytes)?;
            let thumb_key = format!("thumbnails/{hash}.jpg");
            state
                .storage
                .put_object(&thumb_key, thumb, "image/jpeg")
                .await?;
            format!("/media/{thumb_key}")
        }
        None => kind.default_thumbnail_url(),
    };

    let file_size = bytes.len() as i64;
    state
        .storage
        .put_object(&s3_key, bytes, mime_type)
        .await?;

    let title = match metadata.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_owned(),
        _ => original_filename.clone(),
    };

    let mut conn = state.db()?;
    let moderator_group = state.moderator_group().to_owned();
    let file = conn.transaction::<File, AppError, _>(|conn| {
        let file = diesel::insert_into(files::table)
            .values(NewFile {
                id: Uuid::new_v4(),
                uploader_id: user.user_id,
                file_type: kind.as_str().to_owned(),
                title,
                description: metadata.description,
                attribution: metadata.attribution,
                original_source: metadata.original_source,
                license: metadata.license,
                original_filename,
                file_size,
                mime_type: mime_type.to_owned(),
                thumbnail_url,
                s3_key,
            })
            .get_result::<File>(conn)?;

        // Uploader controls their own file; moderators get the review verbs.
        perms::assign_user(conn, user.user_id, file.id, perms::VIEW_FILE)?;
        perms::assign_user(conn, user.user_id, file.id, perms::CHANGE_FILE)?;
        perms::assign_user(conn, user.user_id, file.id, perms::DELETE_FILE)?;

        let moderators = crate::directory::get_or_create_group(conn, &moderator_group)?;
        perms::assign_group(conn, moderators.id, file.id, perms::VIEW_FILE)?;
        perms::assign_group(conn, moderators.id, file.id, perms::APPROVE_FILE)?;
        perms::assign_group(conn, moderators.id, file.id, perms::UNAPPROVE_FILE)?;

        Ok(file)
    })?;

    tracing::info!(file_id = %file.id, uploader = %user.username, "file uploaded");

    let response = FileResponse::build(&mut conn, file)?;
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

pub async fn list_files(
    State(state): State<AppState>,
    OptionalUser(caller): OptionalUser,
    Query(params): Query<FileListQuery>,
) -> AppResult<Json<Vec<FileResponse>>> {
    let mut conn = state.db()?;
    let results = listing::list_files(&mut conn, caller.as_ref(), &params)?;

    let mut responses = Vec::with_capacity(results.len());
    for file in results {
        responses.push(FileResponse::build(&mut conn, file)?);
    }
    Ok(Json(responses))
}

pub async fn get_file(
    State(state): State<AppState>,
    OptionalUser(caller): OptionalUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<FileResponse>> {
    let mut conn = state.db()?;
    let file = load_file(&mut conn, id)?;
    ensure_viewable(&mut conn, caller.as_ref(), &file)?;
    Ok(Json(FileResponse::build(&mut conn, file)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct FileUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub attribution: Option<String>,
    pub original_source: Option<String>,
    pub thumbnail_url: Option<String>,
    pub license: Option<String>,
}

fn apply_file_update(
    conn: &mut PgConnection,
    caller: &AuthenticatedUser,
    id: Uuid,
    payload: FileUpdateRequest,
    replace: bool,
    check: bool,
) -> AppResult<Option<File>> {
    let file = load_file(conn, id)?;
    if !perms::has_permission(conn, caller, file.id, perms::CHANGE_FILE)? {
        return Err(AppError::permission_denied("not allowed to change this file"));
    }

    if let Some(license) = payload.license.as_deref() {
        if license != file.license {
            return Err(AppError::validation("license cannot be changed after upload"));
        }
    }
    if let Some(url) = payload.thumbnail_url.as_deref() {
        media::validate_thumbnail_url(url)?;
    }
    if replace && payload.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        return Err(AppError::validation("title is required"));
    }
    if let Some(title) = payload.title.as_deref() {
        if title.trim().is_empty() {
            return Err(AppError::validation("title cannot be empty"));
        }
    }

    if check {
        return Ok(None);
    }

    // PUT resets omitted optional fields, PATCH leaves them alone.
    let now = Utc::now().naive_utc();
    let updated = if replace {
        diesel::update(files::table.find(file.id))
            .set((
                files::title.eq(payload.title.unwrap_or_default()),
                files::description.eq(payload.description.unwrap_or_default()),
                files::attribution.eq(payload.attribution.unwrap_or_default()),
                files::original_source.eq(payload.original_source.unwrap_or_default()),
                files::thumbnail_url
                    .eq(payload.thumbnail_url.unwrap_or(file.thumbnail_url.clone())),
                files::updated_at.eq(now),
            ))
            .get_result::<File>(conn)?
    } else {
        diesel::update(files::table.find(file.id))
            .set((
                payload.title.map(|v| files::title.eq(v)),
                payload.description.map(|v| files::description.eq(v)),
                payload.attribution.map(|v| files::attribution.eq(v)),
                payload
                    .original_source
                    .map(|v| files::original_source.eq(v)),
                payload.thumbnail_url.map(|v| files::thumbnail_url.eq(v)),
                files::updated_at.eq(now),
            ))
            .get_result::<File>(conn)?
    };
    Ok(Some(updated))
}

pub async fn replace_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<CheckParams>,
    Json(payload): Json<FileUpdateRequest>,
) -> AppResult<axum::response::Response> {
    update_inner(state, user, id, params, payload, true).await
}

pub async fn update_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<CheckParams>,
    Json(payload): Json<FileUpdateRequest>,
) -> AppResult<axum::response::Response> {
    update_inner(state, user, id, params, payload, false).await
}

async fn update_inner(
    state: AppState,
    user: AuthenticatedUser,
    id: Uuid,
    params: CheckParams,
    payload: FileUpdateRequest,
    replace: bool,
) -> AppResult<axum::response::Response> {
    use axum::response::IntoResponse;

    let mut conn = state.db()?;
    match apply_file_update(&mut conn, &user, id, payload, replace, params.is_check())? {
        None => Ok(check_accepted().into_response()),
        Some(file) => Ok(Json(FileResponse::build(&mut conn, file)?).into_response()),
    }
}

pub async fn delete_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<CheckParams>,
) -> AppResult<axum::response::Response> {
    use axum::response::IntoResponse;

    let mut conn = state.db()?;
    let file = load_file(&mut conn, id)?;
    if !perms::has_permission(&mut conn, &user, file.id, perms::DELETE_FILE)? {
        return Err(AppError::permission_denied("not allowed to delete this file"));
    }
    if file.deleted {
        return Err(AppError::wrong_state("file is already pending deletion"));
    }
    if params.is_check() {
        return Ok(check_accepted().into_response());
    }

    diesel::update(files::table.find(file.id))
        .set((
            files::deleted.eq(true),
            files::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    tracing::info!(file_id = %file.id, "file soft-deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Serialize)]
pub struct DownloadResponse {
    pub url: String,
}

pub async fn download_file(
    State(state): State<AppState>,
    OptionalUser(caller): OptionalUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DownloadResponse>> {
    let mut conn = state.db()?;
    let file = load_file(&mut conn, id)?;
    ensure_viewable(&mut conn, caller.as_ref(), &file)?;
    drop(conn);

    let url = state
        .storage
        .presign_download(&file.s3_key, &file.original_filename, DOWNLOAD_URL_TTL)
        .await?;
    Ok(Json(DownloadResponse { url }))
}

pub async fn file_action(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, action)): Path<(Uuid, String)>,
    Query(params): Query<CheckParams>,
) -> AppResult<axum::response::Response> {
    use axum::response::IntoResponse;

    let action = FileAction::parse(&action)
        .ok_or_else(|| AppError::validation(format!("unknown action: {action}")))?;

    let mut conn = state.db()?;
    let file = lifecycle::apply_action(&mut conn, &user, id, action, params.is_check())?;
    if params.is_check() {
        return Ok(check_accepted().into_response());
    }
    Ok(Json(FileResponse::build(&mut conn, file)?).into_response())
}

#[derive(Deserialize)]
pub struct BatchActionRequest {
    pub files: Vec<Uuid>,
}

pub async fn batch_file_action(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(action): Path<String>,
    Query(params): Query<CheckParams>,
    Json(payload): Json<BatchActionRequest>,
) -> AppResult<(StatusCode, Json<BatchOutcome>)> {
    let action = FileAction::parse(&action)
        .ok_or_else(|| AppError::validation(format!("unknown action: {action}")))?;

    let mut conn = state.db()?;
    let outcome = lifecycle::apply_batch(
        &mut conn,
        &user,
        &payload.files,
        action,
        params.is_check(),
    )?;

    let status = if params.is_check() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}
