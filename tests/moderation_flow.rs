mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, png_bytes, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

async fn upload_picture(app: &TestApp, token: &str, title: &str) -> Result<Uuid> {
    let response = app
        .upload_file(
            &format!("{title}.png"),
            "image/png",
            &png_bytes(),
            &json!({ "title": title, "license": "CC_BY_4_0" }),
            token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    Ok(Uuid::parse_str(body["id"].as_str().unwrap())?)
}

async fn act(
    app: &TestApp,
    token: &str,
    file_id: Uuid,
    action: &str,
) -> Result<hyper::Response<axum::body::Body>> {
    app.patch_json(
        &format!("/api/v1/files/{file_id}/{action}"),
        &json!({}),
        Some(token),
    )
    .await
}

#[tokio::test]
async fn moderation_walk_through_publish() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("alice", "pw", "user").await?;
    app.insert_moderator("mod", "pw").await?;
    let alice = app.login_token("alice", "pw").await?;
    let moderator = app.login_token("mod", "pw").await?;

    let file = upload_picture(&app, &alice, "pending").await?;

    // The uploader cannot approve their own file.
    let response = act(&app, &alice, file, "approve").await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Before approval the uploader cannot publish either.
    let response = act(&app, &alice, file, "publish").await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = act(&app, &moderator, file, "approve").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["status"], "UNPUBLISHED");

    // Approval granted the uploader the publish verb.
    let response = act(&app, &alice, file, "publish").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["status"], "PUBLISHED");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn approve_twice_is_a_conflict() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("alice", "pw", "user").await?;
    app.insert_moderator("mod", "pw").await?;
    let alice = app.login_token("alice", "pw").await?;
    let moderator = app.login_token("mod", "pw").await?;

    let file = upload_picture(&app, &alice, "once").await?;

    let response = act(&app, &moderator, file, "approve").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = act(&app, &moderator, file, "approve").await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn unapprove_revokes_publish_rights() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("alice", "pw", "user").await?;
    app.insert_moderator("mod", "pw").await?;
    let alice = app.login_token("alice", "pw").await?;
    let moderator = app.login_token("mod", "pw").await?;

    let file = upload_picture(&app, &alice, "retracted").await?;
    let response = act(&app, &moderator, file, "approve").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let response = act(&app, &alice, file, "publish").await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Unapproving pulls the file back to pending and takes publish away.
    let response = act(&app, &moderator, file, "unapprove").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["status"], "PENDING_MODERATION");

    let response = act(&app, &alice, file, "publish").await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn single_action_dry_run_writes_nothing() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("alice", "pw", "user").await?;
    app.insert_moderator("mod", "pw").await?;
    let alice = app.login_token("alice", "pw").await?;
    let moderator = app.login_token("mod", "pw").await?;

    let file = upload_picture(&app, &alice, "untouched").await?;

    let response = app
        .patch_json(
            &format!("/api/v1/files/{file}/approve?check=true"),
            &json!({}),
            Some(&moderator),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app.get(&format!("/api/v1/files/{file}"), Some(&alice)).await?;
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["status"], "PENDING_MODERATION");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn batch_actions_skip_ineligible_files() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("alice", "pw", "user").await?;
    app.insert_moderator("mod", "pw").await?;
    let alice = app.login_token("alice", "pw").await?;
    let moderator = app.login_token("mod", "pw").await?;

    let pending = upload_picture(&app, &alice, "pending").await?;
    let already = upload_picture(&app, &alice, "already").await?;
    let response = act(&app, &moderator, already, "approve").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let missing = Uuid::new_v4();

    let response = app
        .patch_json(
            "/api/v1/files/bulk/approve",
            &json!({ "files": [pending, already, missing] }),
            Some(&moderator),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["requested"], 3);
    assert_eq!(body["eligible"], 1);
    assert_eq!(body["updated"], 1);
    assert_eq!(body["files"], json!([pending]));

    // Dry run reports the same eligibility without writing.
    let fresh = upload_picture(&app, &alice, "fresh").await?;
    let response = app
        .patch_json(
            "/api/v1/files/bulk/approve?check=true",
            &json!({ "files": [fresh] }),
            Some(&moderator),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["eligible"], 1);
    assert_eq!(body["updated"], 0);

    let response = app.get(&format!("/api/v1/files/{fresh}"), Some(&alice)).await?;
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body["status"], "PENDING_MODERATION");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn revoking_a_group_grant_removes_inherited_access() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let user_id = app.insert_user("meg", "pw", "user").await?;
    let object_id = Uuid::new_v4();

    let (before, after) = app
        .with_conn(move |conn| {
            use bma_backend::auth::AuthenticatedUser;
            use bma_backend::{directory, perms};

            let group = directory::get_or_create_group(conn, "curators")?;
            directory::add_group_member(conn, group.id, user_id)?;
            perms::assign_group(conn, group.id, object_id, perms::VIEW_FILE)?;

            let caller = AuthenticatedUser {
                user_id,
                username: "meg".to_owned(),
                role: "user".to_owned(),
            };
            let before = perms::has_permission(conn, &caller, object_id, perms::VIEW_FILE)?;
            perms::revoke_group(conn, group.id, object_id, perms::VIEW_FILE)?;
            let after = perms::has_permission(conn, &caller, object_id, perms::VIEW_FILE)?;
            Ok((before, after))
        })
        .await?;

    assert!(before);
    assert!(!after);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_action_is_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("alice", "pw", "user").await?;
    let alice = app.login_token("alice", "pw").await?;
    let file = upload_picture(&app, &alice, "whatever").await?;

    let response = act(&app, &alice, file, "vaporize").await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    app.cleanup().await?;
    Ok(())
}
