use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    directory,
    error::{AppError, AppResult},
    models::User,
    schema::{albums, files, users},
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

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    if !caller.is_admin() {
        return Err(AppError::permission_denied("admin role required"));
    }

    let mut conn = state.db()?;
    let result = users::table
        .order(users::username.asc())
        .load::<User>(&mut conn)?;
    Ok(Json(result.into_iter().map(UserResponse::from).collect()))
}

/// Remove an account. Uploaded files and owned albums are reassigned to the
/// sentinel user so content never dangles; grants and group memberships go
/// away with the row.
pub async fn delete_user(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Query(params): Query<CheckParams>,
) -> AppResult<axum::response::Response> {
    use axum::response::IntoResponse;

    if !caller.is_admin() {
        return Err(AppError::permission_denied("admin role required"));
    }

    let mut conn = state.db()?;
    let target = directory::find_user(&mut conn, id)?;
    if target.username == state.sentinel_username() {
        return Err(AppError::wrong_state("the sentinel user cannot be deleted"));
    }
    if target.id == caller.user_id {
        return Err(AppError::validation("cannot delete your own account"));
    }
    if params.is_check() {
        return Ok((
            axum::http::StatusCode::ACCEPTED,
            Json(serde_json::json!({ "message": "OK" })),
        )
            .into_response());
    }

    let sentinel_username = state.sentinel_username().to_owned();
    conn.transaction::<(), AppError, _>(|conn| {
        let sentinel = directory::get_or_create_sentinel(conn, &sentinel_username)?;
        let now = Utc::now().naive_utc();

        diesel::update(files::table.filter(files::uploader_id.eq(target.id)))
            .set((files::uploader_id.eq(sentinel.id), files::updated_at.eq(now)))
            .execute(conn)?;
        diesel::update(albums::table.filter(albums::owner_id.eq(target.id)))
            .set((albums::owner_id.eq(sentinel.id), albums::updated_at.eq(now)))
            .execute(conn)?;

        diesel::delete(users::table.find(target.id)).execute(conn)?;
        Ok(())
    })?;

    tracing::info!(user_id = %target.id, username = %target.username, "user deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}
