// handlers/protected/templates.rs - /v3/templates handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::api::extract::{JsonBody, QueryParams};
use crate::api::format::{GuidVersionHolder, PagedResourceList, StatusMessage, Typed};
use crate::api::AppState;
use crate::auth::UserSession;
use crate::config::config;
use crate::database::models::{Template, TemplateType};
use crate::middleware::{ok, ApiResult, Created, SessionStudy};
use crate::types::{DeleteMode, Role};

/// GET /v3/templates?type=&offsetBy=&pageSize=&includeDeleted=
pub async fn get_templates(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    params: QueryParams,
) -> ApiResult<Json<PagedResourceList<Template>>> {
    session.require_any(&[Role::Developer])?;
    let template_type = params.parsed::<TemplateType>("type")?;
    let offset_by = params.int("offsetBy", 0)?;
    let page_size = params.int("pageSize", config().api.default_page_size)?;
    let include_deleted = params.flag("includeDeleted");

    let page = state
        .templates
        .get_templates(&study.identifier, template_type, offset_by, page_size, include_deleted)
        .await?;

    let mut list = PagedResourceList::new(page.items, page.total)
        .with_param("offsetBy", offset_by)
        .with_param("pageSize", page_size)
        .with_param("includeDeleted", include_deleted);
    if let Some(template_type) = template_type {
        list = list.with_param("templateType", template_type.to_string());
    }
    Ok(Json(list))
}

/// POST /v3/templates
pub async fn create_template(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    JsonBody(template): JsonBody<Template>,
) -> ApiResult<Created<GuidVersionHolder>> {
    session.require_any(&[Role::Developer])?;
    let created = state.templates.create_template(&study.identifier, template).await?;
    Ok(Created(GuidVersionHolder::new(created.guid, created.version)))
}

/// GET /v3/templates/:guid
pub async fn get_template(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
) -> ApiResult<Json<Typed<Template>>> {
    session.require_any(&[Role::Developer])?;
    Ok(ok(state.templates.get_template(&study.identifier, &guid).await?))
}

/// POST /v3/templates/:guid
pub async fn update_template(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
    JsonBody(template): JsonBody<Template>,
) -> ApiResult<Json<GuidVersionHolder>> {
    session.require_any(&[Role::Developer])?;
    let updated = state
        .templates
        .update_template(&study.identifier, &guid, template)
        .await?;
    Ok(Json(GuidVersionHolder::new(updated.guid, updated.version)))
}

/// DELETE /v3/templates/:guid?physical=true
pub async fn delete_template(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
    params: QueryParams,
) -> ApiResult<Json<StatusMessage>> {
    session.require_any(&[Role::Developer, Role::Admin])?;
    let mode = DeleteMode::effective(params.flag("physical"), session.roles);
    state.templates.delete_template(&study.identifier, &guid, mode).await?;
    Ok(Json(StatusMessage::new("Template has been deleted.")))
}
