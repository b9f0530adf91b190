use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = groups)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = groups)]
pub struct NewGroup {
    pub id: Uuid,
    pub name: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = group_members)]
#[diesel(belongs_to(Group))]
#[diesel(belongs_to(User))]
#[diesel(primary_key(group_id, user_id))]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub added_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = group_members)]
pub struct NewGroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
}

/// One row per uploaded work, regardless of media kind. `file_type` holds the
/// concrete kind (picture/video/audio/document) and the three booleans carry
/// the moderation lifecycle; see [`crate::lifecycle::FileStatus`].
#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = files)]
#[diesel(belongs_to(User, foreign_key = uploader_id))]
pub struct File {
    pub id: Uuid,
    pub uploader_id: Uuid,
    pub file_type: String,
    pub title: String,
    pub description: String,
    pub attribution: String,
    pub original_source: String,
    pub license: String,
    pub approved: bool,
    pub published: bool,
    pub deleted: bool,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub thumbnail_url: String,
    pub s3_key: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = files)]
pub struct NewFile {
    pub id: Uuid,
    pub uploader_id: Uuid,
    pub file_type: String,
    pub title: String,
    pub description: String,
    pub attribution: String,
    pub original_source: String,
    pub license: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub thumbnail_url: String,
    pub s3_key: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = albums)]
#[diesel(belongs_to(User, foreign_key = owner_id))]
pub struct Album {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = albums)]
pub struct NewAlbum {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
}

/// A time-ranged link between a file and an album. Rows are never deleted:
/// removing a file from an album closes the open period instead, so the full
/// membership history stays queryable.
#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = album_memberships)]
#[diesel(belongs_to(File))]
#[diesel(belongs_to(Album))]
pub struct AlbumMembership {
    pub id: Uuid,
    pub file_id: Uuid,
    pub album_id: Uuid,
    pub period_start: NaiveDateTime,
    pub period_end: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = album_memberships)]
pub struct NewAlbumMembership {
    pub id: Uuid,
    pub file_id: Uuid,
    pub album_id: Uuid,
    pub period_start: NaiveDateTime,
    pub period_end: Option<NaiveDateTime>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = object_permissions)]
pub struct ObjectPermission {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub object_id: Uuid,
    pub permission: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = object_permissions)]
pub struct NewObjectPermission {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub object_id: Uuid,
    pub permission: String,
}
