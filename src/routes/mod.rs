use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

pub mod albums;
pub mod auth;
pub mod files;
pub mod health;
pub mod users;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    // File reads take an optional caller so anonymous visitors get the
    // published subset; everything mutating requires a token.
    let files_routes = Router::new()
        .route("/", get(files::list_files).post(files::upload_file))
        .route(
            "/:id",
            get(files::get_file)
                .put(files::replace_file)
                .patch(files::update_file)
                .delete(files::delete_file),
        )
        .route("/:id/download", get(files::download_file))
        .route("/:id/:action", patch(files::file_action))
        .route("/bulk/:action", patch(files::batch_file_action));

    let albums_routes = Router::new()
        .route("/", get(albums::list_albums).post(albums::create_album))
        .route(
            "/:id",
            get(albums::get_album)
                .put(albums::replace_album)
                .patch(albums::update_album)
                .delete(albums::delete_album),
        );

    let users_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id", delete(users::delete_user));

    Router::new()
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1/files", files_routes)
        .nest("/api/v1/albums", albums_routes)
        .nest("/api/v1/users", users_routes)
        // Nested routers don't match the trailing-slash form of their root.
        .route(
            "/api/v1/files/",
            get(files::list_files).post(files::upload_file),
        )
        .route(
            "/api/v1/albums/",
            get(albums::list_albums).post(albums::create_album),
        )
        .route("/api/v1/users/", get(users::list_users))
        .route("/api/v1/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 512))
}
