// handlers/protected/study_consents.rs - consent documents of a subpopulation
//
// The /v3/consents paths predate subpopulations and act on the study's
// default subpopulation, whose guid is the study identifier.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::api::extract::JsonBody;
use crate::api::format::{ResourceList, StatusMessage, Typed};
use crate::api::AppState;
use crate::auth::UserSession;
use crate::database::models::{Study, StudyConsent, StudyConsentForm, StudyConsentView, Subpopulation};
use crate::middleware::{created, ok, ApiResult, Created, SessionStudy};
use crate::services::study_consent_service::parse_created_on;
use crate::types::Role;

/// Developer check plus the subpopulation lookup every consent call starts with.
/// A guid owned by another study is a 404, same as an unknown one.
async fn authorized_subpopulation(
    state: &AppState,
    session: &UserSession,
    study: &Study,
    guid: &str,
) -> ApiResult<Subpopulation> {
    session.require_any(&[Role::Developer])?;
    state.subpopulations.get_subpopulation(&study.identifier, guid).await
}

async fn list(state: AppState, session: UserSession, study: Study, guid: String) -> ApiResult<Json<ResourceList<Typed<StudyConsent>>>> {
    let subpop = authorized_subpopulation(&state, &session, &study, &guid).await?;
    let consents = state.consents.get_all_consents(&subpop).await?;
    Ok(Json(ResourceList::new(consents)))
}

async fn active(state: AppState, session: UserSession, study: Study, guid: String) -> ApiResult<Json<Typed<StudyConsentView>>> {
    let subpop = authorized_subpopulation(&state, &session, &study, &guid).await?;
    Ok(ok(state.consents.get_active_consent(&subpop).await?))
}

async fn most_recent(state: AppState, session: UserSession, study: Study, guid: String) -> ApiResult<Json<Typed<StudyConsentView>>> {
    let subpop = authorized_subpopulation(&state, &session, &study, &guid).await?;
    Ok(ok(state.consents.get_most_recent_consent(&subpop).await?))
}

async fn one(
    state: AppState,
    session: UserSession,
    study: Study,
    guid: String,
    created_on: String,
) -> ApiResult<Json<Typed<StudyConsentView>>> {
    let subpop = authorized_subpopulation(&state, &session, &study, &guid).await?;
    let created_on = parse_created_on(&created_on)?;
    Ok(ok(state.consents.get_consent(&subpop, created_on).await?))
}

async fn add(
    state: AppState,
    session: UserSession,
    study: Study,
    guid: String,
    form: StudyConsentForm,
) -> ApiResult<Created<Typed<StudyConsentView>>> {
    let subpop = authorized_subpopulation(&state, &session, &study, &guid).await?;
    Ok(created(state.consents.add_consent(&subpop, form).await?))
}

async fn publish(
    state: AppState,
    session: UserSession,
    study: Study,
    guid: String,
    created_on: String,
) -> ApiResult<Json<StatusMessage>> {
    let subpop = authorized_subpopulation(&state, &session, &study, &guid).await?;
    let created_on = parse_created_on(&created_on)?;
    state.consents.publish_consent(&study, &subpop, created_on).await?;
    Ok(Json(StatusMessage::new("Consent document set as active.")))
}

/// GET /v3/subpopulations/:guid/consents
pub async fn get_all_consents_v2(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
) -> ApiResult<Json<ResourceList<Typed<StudyConsent>>>> {
    list(state, session, study, guid).await
}

/// GET /v3/subpopulations/:guid/consents/published
pub async fn get_active_consent_v2(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
) -> ApiResult<Json<Typed<StudyConsentView>>> {
    active(state, session, study, guid).await
}

/// GET /v3/subpopulations/:guid/consents/recent
pub async fn get_most_recent_consent_v2(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
) -> ApiResult<Json<Typed<StudyConsentView>>> {
    most_recent(state, session, study, guid).await
}

/// GET /v3/subpopulations/:guid/consents/:createdOn
pub async fn get_consent_v2(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path((guid, created_on)): Path<(String, String)>,
) -> ApiResult<Json<Typed<StudyConsentView>>> {
    one(state, session, study, guid, created_on).await
}

/// POST /v3/subpopulations/:guid/consents
pub async fn add_consent_v2(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(guid): Path<String>,
    JsonBody(form): JsonBody<StudyConsentForm>,
) -> ApiResult<Created<Typed<StudyConsentView>>> {
    add(state, session, study, guid, form).await
}

/// POST /v3/subpopulations/:guid/consents/:createdOn/publish
pub async fn publish_consent_v2(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path((guid, created_on)): Path<(String, String)>,
) -> ApiResult<Json<StatusMessage>> {
    publish(state, session, study, guid, created_on).await
}

/// GET /v3/consents
pub async fn get_all_consents(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
) -> ApiResult<Json<ResourceList<Typed<StudyConsent>>>> {
    let guid = study.identifier.clone();
    list(state, session, study, guid).await
}

/// GET /v3/consents/published
pub async fn get_active_consent(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
) -> ApiResult<Json<Typed<StudyConsentView>>> {
    let guid = study.identifier.clone();
    active(state, session, study, guid).await
}

/// GET /v3/consents/recent
pub async fn get_most_recent_consent(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
) -> ApiResult<Json<Typed<StudyConsentView>>> {
    let guid = study.identifier.clone();
    most_recent(state, session, study, guid).await
}

/// GET /v3/consents/:createdOn
pub async fn get_consent(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(created_on): Path<String>,
) -> ApiResult<Json<Typed<StudyConsentView>>> {
    let guid = study.identifier.clone();
    one(state, session, study, guid, created_on).await
}

/// POST /v3/consents
pub async fn add_consent(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    JsonBody(form): JsonBody<StudyConsentForm>,
) -> ApiResult<Created<Typed<StudyConsentView>>> {
    let guid = study.identifier.clone();
    add(state, session, study, guid, form).await
}

/// POST /v3/consents/:createdOn/publish
pub async fn publish_consent(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(created_on): Path<String>,
) -> ApiResult<Json<StatusMessage>> {
    let guid = study.identifier.clone();
    publish(state, session, study, guid, created_on).await
}
