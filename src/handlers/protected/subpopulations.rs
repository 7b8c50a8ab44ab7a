// handlers/protected/subpopulations.rs - /v3/subpopulations handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::api::extract::{JsonBody, QueryParams};
use crate::api::format::{GuidVersionHolder, ResourceList, StatusMessage, Typed};
use crate::api::AppState;
use crate::auth::UserSession;
use crate::database::models::Subpopulation;
use crate::middleware::{ok, ApiResult, Created, SessionStudy};
use crate::types::Role;

/// GET /v3/subpopulations
pub async fn get_all_subpopulations(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    params: QueryParams,
) -> ApiResult<Json<ResourceList<Typed<Subpopulation>>>> {
    session.require_any(&[Role::Developer])?;
    let include_deleted = params.flag("includeDeleted");
    let subpops = state
        .subpopulations
        .get_subpopulations(&study.identifier, include_deleted)
        .await?;
    Ok(Json(ResourceList::new(subpops).with_param("includeDeleted", include_deleted)))
}

/// POST /v3/subpopulations
pub async fn create_subpopulation(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    JsonBody(subpop): JsonBody<Subpopulation>,
) -> ApiResult<Created<GuidVersionHolder>> {
    session.require_any(&[Role::Developer])?;
    let created = state.subpopulations.create_subpopulation(&study, subpop).await?;
    Ok(Created(GuidVersionHolder::new(created.guid, created.version)))
}

/// GET /v3/subpopulations/:guid
pub async fn get_subpopulation(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
) -> ApiResult<Json<Typed<Subpopulation>>> {
    session.require_any(&[Role::Developer])?;
    let subpop = state.subpopulations.get_subpopulation(&study.identifier, &guid).await?;
    Ok(ok(subpop))
}

/// POST /v3/subpopulations/:guid
pub async fn update_subpopulation(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
    JsonBody(subpop): JsonBody<Subpopulation>,
) -> ApiResult<Json<GuidVersionHolder>> {
    session.require_any(&[Role::Developer])?;
    let updated = state
        .subpopulations
        .update_subpopulation(&study.identifier, &guid, subpop)
        .await?;
    Ok(Json(GuidVersionHolder::new(updated.guid, updated.version)))
}

/// DELETE /v3/subpopulations/:guid
pub async fn delete_subpopulation(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
) -> ApiResult<Json<StatusMessage>> {
    session.require_any(&[Role::Developer])?;
    state.subpopulations.delete_subpopulation(&study.identifier, &guid).await?;
    Ok(Json(StatusMessage::new("Subpopulation has been deleted.")))
}
