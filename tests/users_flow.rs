mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, png_bytes, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn user_listing_is_admin_only() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("alice", "pw", "user").await?;
    app.insert_user("root", "pw", "admin").await?;
    let alice = app.login_token("alice", "pw").await?;
    let admin = app.login_token("root", "pw").await?;

    let response = app.get("/api/v1/users/", Some(&alice)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get("/api/v1/users/", Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_eq!(body.as_array().unwrap().len(), 2);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn deleting_a_user_reassigns_content_to_sentinel() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let alice_id = app.insert_user("alice", "pw", "user").await?;
    app.insert_user("root", "pw", "admin").await?;
    let alice = app.login_token("alice", "pw").await?;
    let admin = app.login_token("root", "pw").await?;

    let response = app
        .upload_file(
            "orphan.png",
            "image/png",
            &png_bytes(),
            &json!({ "title": "orphan", "license": "CC_BY_4_0" }),
            &alice,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let file: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    let file_id = file["id"].as_str().unwrap().to_owned();

    let response = app
        .delete(&format!("/api/v1/users/{alice_id}"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The file survives under the sentinel account.
    let response = app.get(&format!("/api/v1/files/{file_id}"), Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert_ne!(body["uploader_id"].as_str().unwrap(), alice_id.to_string());

    let response = app.get("/api/v1/users/", Some(&admin)).await?;
    let body: Value = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    let usernames: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert!(!usernames.contains(&"alice"));
    assert!(usernames.contains(&"deleted-user"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn admin_cannot_delete_self_and_users_cannot_delete_anyone() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let alice_id = app.insert_user("alice", "pw", "user").await?;
    let root_id = app.insert_user("root", "pw", "admin").await?;
    let alice = app.login_token("alice", "pw").await?;
    let admin = app.login_token("root", "pw").await?;

    let response = app
        .delete(&format!("/api/v1/users/{root_id}"), Some(&admin))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .delete(&format!("/api/v1/users/{alice_id}"), Some(&alice))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}
