// handlers/protected/upload_schemas.rs - /v3/uploadschemas and /v4/uploadschemas handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::api::extract::{JsonBody, QueryParams};
use crate::api::format::{ResourceList, StatusMessage, Typed};
use crate::api::AppState;
use crate::auth::UserSession;
use crate::database::models::UploadSchema;
use crate::error::ApiError;
use crate::middleware::{created, ok, ApiResult, Created, SessionStudy};
use crate::types::{DeleteMode, Role};

pub fn parse_revision(raw: &str) -> Result<i32, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Revision '{}' is not a valid integer", raw)))
}

/// POST /v4/uploadschemas - new revision, numbered by the store unless given
pub async fn create_schema_revision_v4(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    JsonBody(schema): JsonBody<UploadSchema>,
) -> ApiResult<Created<Typed<UploadSchema>>> {
    session.require_any(&[Role::Developer])?;
    let schema = state
        .schemas
        .create_schema_revision_v4(&study.identifier, schema)
        .await?;
    Ok(created(schema.without_study_id()))
}

/// POST /v3/uploadschemas - legacy create, guarded by the submitted revision
pub async fn create_or_update_upload_schema(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    JsonBody(schema): JsonBody<UploadSchema>,
) -> ApiResult<Json<Typed<UploadSchema>>> {
    session.require_any(&[Role::Developer])?;
    let schema = state
        .schemas
        .create_or_update_upload_schema(&study.identifier, schema)
        .await?;
    Ok(ok(schema.without_study_id()))
}

/// GET /v3/uploadschemas - current revision of every schema in the study
pub async fn get_upload_schemas_for_study(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    params: QueryParams,
) -> ApiResult<Json<ResourceList<Typed<UploadSchema>>>> {
    session.require_any(&[Role::Developer, Role::Researcher])?;
    let include_deleted = params.flag("includeDeleted");
    let schemas: Vec<UploadSchema> = state
        .schemas
        .get_upload_schemas_for_study(&study.identifier, include_deleted)
        .await?
        .into_iter()
        .map(UploadSchema::without_study_id)
        .collect();
    Ok(Json(ResourceList::new(schemas).with_param("includeDeleted", include_deleted)))
}

/// GET /v3/uploadschemas/:schemaId - every revision, newest first
pub async fn get_upload_schema_all_revisions(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(schema_id): Path<String>,
    params: QueryParams,
) -> ApiResult<Json<ResourceList<Typed<UploadSchema>>>> {
    session.require_any(&[Role::Developer])?;
    let include_deleted = params.flag("includeDeleted");
    let revisions: Vec<UploadSchema> = state
        .schemas
        .get_upload_schema_all_revisions(&study.identifier, &schema_id, include_deleted)
        .await?
        .into_iter()
        .map(UploadSchema::without_study_id)
        .collect();
    Ok(Json(ResourceList::new(revisions).with_param("includeDeleted", include_deleted)))
}

/// GET /v3/uploadschemas/:schemaId/recent
pub async fn get_upload_schema(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(schema_id): Path<String>,
    params: QueryParams,
) -> ApiResult<Json<Typed<UploadSchema>>> {
    session.require_any(&[Role::Developer])?;
    let schema = state
        .schemas
        .get_upload_schema(&study.identifier, &schema_id, params.flag("includeDeleted"))
        .await?;
    Ok(ok(schema.without_study_id()))
}

/// GET /v3/uploadschemas/:schemaId/revisions/:revision
pub async fn get_upload_schema_by_id_and_rev(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path((schema_id, revision)): Path<(String, String)>,
) -> ApiResult<Json<Typed<UploadSchema>>> {
    session.require_any(&[Role::Developer, Role::Worker])?;
    let revision = parse_revision(&revision)?;
    let schema = state
        .schemas
        .get_upload_schema_by_id_and_rev(&study.identifier, &schema_id, revision)
        .await?;
    Ok(ok(schema.without_study_id()))
}

/// POST /v4/uploadschemas/:schemaId/revisions/:revision - edit one revision in place
pub async fn update_schema_revision_v4(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path((schema_id, revision)): Path<(String, String)>,
    JsonBody(schema): JsonBody<UploadSchema>,
) -> ApiResult<Json<Typed<UploadSchema>>> {
    session.require_any(&[Role::Developer])?;
    let revision = parse_revision(&revision)?;
    let schema = state
        .schemas
        .update_schema_revision_v4(&study.identifier, &schema_id, revision, schema)
        .await?;
    Ok(ok(schema.without_study_id()))
}

/// DELETE /v3/uploadschemas/:schemaId?physical=true
pub async fn delete_all_revisions_of_upload_schema(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(schema_id): Path<String>,
    params: QueryParams,
) -> ApiResult<Json<StatusMessage>> {
    session.require_any(&[Role::Developer, Role::Admin])?;
    let mode = DeleteMode::effective(params.flag("physical"), session.roles);
    state
        .schemas
        .delete_upload_schema_by_id(&study.identifier, &schema_id, mode)
        .await?;
    Ok(Json(StatusMessage::new("Schemas have been deleted.")))
}

/// DELETE /v3/uploadschemas/:schemaId/revisions/:revision?physical=true
pub async fn delete_schema_revision(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path((schema_id, revision)): Path<(String, String)>,
    params: QueryParams,
) -> ApiResult<Json<StatusMessage>> {
    session.require_any(&[Role::Developer, Role::Admin])?;
    let revision = parse_revision(&revision)?;
    let mode = DeleteMode::effective(params.flag("physical"), session.roles);
    state
        .schemas
        .delete_upload_schema_by_id_and_revision(&study.identifier, &schema_id, revision, mode)
        .await?;
    Ok(Json(StatusMessage::new("Schema revision has been deleted.")))
}
