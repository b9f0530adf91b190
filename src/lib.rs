pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod listing;
pub mod media;
pub mod membership;
pub mod models;
pub mod perms;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;

pub use routes::create_router;
