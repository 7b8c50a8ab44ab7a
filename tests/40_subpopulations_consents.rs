mod common;

use anyhow::Result;
use axum::http::StatusCode;
use bridge_server::types::Role;
use common::{developer, token, TestApp};
use serde_json::{json, Value};

async fn create_subpop(app: &TestApp, dev: &str) -> Result<Value> {
    let (status, holder) = app
        .post("/v3/subpopulations", dev, json!({ "name": "Cohort A", "required": false }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(holder["type"], "GuidVersionHolder");
    Ok(holder)
}

#[tokio::test]
async fn study_starts_with_a_default_subpopulation() -> Result<()> {
    let app = TestApp::new().await?;
    let (status, list) = app.get("/v3/subpopulations", &developer()).await?;
    assert_eq!(status, StatusCode::OK);
    let items = list["items"].as_array().cloned().unwrap_or_default();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["guid"], "api");
    assert_eq!(items[0]["defaultGroup"], true);
    assert_eq!(items[0]["type"], "Subpopulation");

    let (status, body) = app.delete("/v3/subpopulations/api", &developer()).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot delete the default subpopulation for a study.");
    Ok(())
}

#[tokio::test]
async fn new_subpopulation_has_a_published_placeholder_consent() -> Result<()> {
    let app = TestApp::new().await?;
    let dev = developer();
    let holder = create_subpop(&app, &dev).await?;
    let guid = holder["guid"].as_str().unwrap_or_default().to_string();

    let (status, subpop) = app.get(&format!("/v3/subpopulations/{}", guid), &dev).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(subpop["publishedConsentCreatedOn"].is_string());

    let (status, active) = app
        .get(&format!("/v3/subpopulations/{}/consents/published", guid), &dev)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["active"], true);
    assert_eq!(active["type"], "StudyConsent");
    Ok(())
}

#[tokio::test]
async fn publishing_moves_the_active_flag() -> Result<()> {
    let app = TestApp::new().await?;
    let dev = developer();
    let holder = create_subpop(&app, &dev).await?;
    let base = format!("/v3/subpopulations/{}/consents", holder["guid"].as_str().unwrap_or_default());

    let (status, added) = app
        .post(&base, &dev, json!({ "documentContent": "<p>Version two</p>" }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(added["active"], false);
    let created_on = added["createdOn"].as_str().unwrap_or_default().to_string();

    let (_, recent) = app.get(&format!("{}/recent", base), &dev).await?;
    assert_eq!(recent["createdOn"], created_on.as_str());
    assert_eq!(recent["documentContent"], "<p>Version two</p>");

    let (status, body) = app
        .post_empty(&format!("{}/{}/publish", base, created_on), &dev)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Consent document set as active.");

    let (_, list) = app.get(&base, &dev).await?;
    let items = list["items"].as_array().cloned().unwrap_or_default();
    assert_eq!(items.len(), 2);
    let active: Vec<&Value> = items.iter().filter(|c| c["active"] == true).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["createdOn"], created_on.as_str());
    assert!(items[0].get("documentContent").is_none());

    let (_, one) = app.get(&format!("{}/{}", base, created_on), &dev).await?;
    assert_eq!(one["active"], true);
    Ok(())
}

#[tokio::test]
async fn blank_consent_and_bad_timestamps_are_rejected() -> Result<()> {
    let app = TestApp::new().await?;
    let dev = developer();

    let (status, body) = app.post("/v3/consents", &dev, json!({ "documentContent": "  " })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["documentContent"], "is required");

    let (status, body) = app.get("/v3/consents/yesterday", &dev).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["type"], "InvalidEntityException");

    let (status, _) = app.get("/v3/consents/2001-01-01T00:00:00.000Z", &dev).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn study_level_consent_paths_use_the_default_subpopulation() -> Result<()> {
    let app = TestApp::new().await?;
    let dev = developer();

    let (status, _) = app.post("/v3/consents", &dev, json!({ "documentContent": "<p>Study</p>" })).await?;
    assert_eq!(status, StatusCode::CREATED);

    let (_, legacy) = app.get("/v3/consents/recent", &dev).await?;
    let (_, scoped) = app.get("/v3/subpopulations/api/consents/recent", &dev).await?;
    assert_eq!(legacy["createdOn"], scoped["createdOn"]);
    assert_eq!(scoped["documentContent"], "<p>Study</p>");
    Ok(())
}

#[tokio::test]
async fn other_studies_cannot_see_a_subpopulation() -> Result<()> {
    let app = TestApp::new().await?;
    let holder = create_subpop(&app, &developer()).await?;
    let guid = holder["guid"].as_str().unwrap_or_default().to_string();

    let other_dev = token("other", &[Role::Developer]);
    let (status_foreign, body_foreign) = app.get(&format!("/v3/subpopulations/{}", guid), &other_dev).await?;
    let (status_missing, body_missing) = app.get("/v3/subpopulations/no-such-guid", &other_dev).await?;
    assert_eq!(status_foreign, StatusCode::NOT_FOUND);
    assert_eq!(status_foreign, status_missing);
    assert_eq!(body_foreign, body_missing);

    let (status, _) = app
        .get(&format!("/v3/subpopulations/{}/consents", guid), &other_dev)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn update_and_delete_subpopulation() -> Result<()> {
    let app = TestApp::new().await?;
    let dev = developer();
    let holder = create_subpop(&app, &dev).await?;
    let path = format!("/v3/subpopulations/{}", holder["guid"].as_str().unwrap_or_default());

    let (status, updated) = app
        .post(&path, &dev, json!({ "name": "Cohort B", "version": holder["version"] }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["guid"], holder["guid"]);

    let (_, subpop) = app.get(&path, &dev).await?;
    assert_eq!(subpop["name"], "Cohort B");

    let (status, body) = app.delete(&path, &dev).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Subpopulation has been deleted.");

    let (_, list) = app.get("/v3/subpopulations", &dev).await?;
    assert_eq!(list["items"].as_array().map(Vec::len), Some(1));
    let (_, list) = app.get("/v3/subpopulations?includeDeleted=true", &dev).await?;
    assert_eq!(list["items"].as_array().map(Vec::len), Some(2));
    Ok(())
}
