mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{admin, developer, TestApp};
use serde_json::{json, Value};

async fn create_template(app: &TestApp, name: &str) -> Result<Value> {
    let (status, holder) = app
        .post(
            "/v3/templates",
            &developer(),
            json!({ "templateType": "email_sign_in", "name": name }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(holder)
}

#[tokio::test]
async fn listing_requires_a_type_and_sane_paging() -> Result<()> {
    let app = TestApp::new().await?;
    let dev = developer();

    let (status, body) = app.get("/v3/templates", &dev).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Template type is required");

    let (status, body) = app.get("/v3/templates?type=email_sign_in&pageSize=2", &dev).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "pageSize must be from 5-100 records");

    let (status, _) = app.get("/v3/templates?type=carrier_pigeon", &dev).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn create_list_and_update() -> Result<()> {
    let app = TestApp::new().await?;
    let dev = developer();
    let holder = create_template(&app, "Sign in link").await?;
    create_template(&app, "Second link").await?;

    let (status, page) = app.get("/v3/templates?type=email_sign_in", &dev).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["type"], "PagedResourceList");
    assert_eq!(page["total"], 2);
    assert_eq!(page["requestParams"]["templateType"], "email_sign_in");
    assert_eq!(page["requestParams"]["type"], "RequestParams");
    assert_eq!(page["requestParams"]["offsetBy"], 0);
    assert_eq!(page["items"][0]["type"], "Template");

    let path = format!("/v3/templates/{}", holder["guid"].as_str().unwrap_or_default());
    let (status, updated) = app
        .post(
            &path,
            &dev,
            json!({ "templateType": "sms_phone_sign_in", "name": "Renamed", "version": holder["version"] }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["type"], "GuidVersionHolder");

    let (_, template) = app.get(&path, &dev).await?;
    assert_eq!(template["name"], "Renamed");
    assert_eq!(template["templateType"], "email_sign_in");
    Ok(())
}

#[tokio::test]
async fn delete_is_logical_unless_admin() -> Result<()> {
    let app = TestApp::new().await?;
    let dev = developer();
    let holder = create_template(&app, "Sign in link").await?;
    let path = format!("/v3/templates/{}", holder["guid"].as_str().unwrap_or_default());

    let (status, body) = app.delete(&format!("{}?physical=true", path), &dev).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Template has been deleted.");

    let (status, template) = app.get(&path, &dev).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(template["deleted"], true);

    let (_, page) = app.get("/v3/templates?type=email_sign_in", &dev).await?;
    assert_eq!(page["total"], 0);
    let (_, page) = app.get("/v3/templates?type=email_sign_in&includeDeleted=true", &dev).await?;
    assert_eq!(page["total"], 1);

    let (status, _) = app.delete(&path, &dev).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.delete(&format!("{}?physical=true", path), &admin()).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&path, &dev).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
