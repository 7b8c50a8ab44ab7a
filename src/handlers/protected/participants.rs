// handlers/protected/participants.rs - /v3/participants handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde_json::Value;

use crate::api::extract::{JsonBody, QueryParams};
use crate::api::format::{IdentifierHolder, PagedResourceList, StatusMessage, Typed};
use crate::api::AppState;
use crate::auth::UserSession;
use crate::config::config;
use crate::database::models::{Account, AccountStatus, AccountSummary, AccountSummarySearch};
use crate::error::ApiError;
use crate::middleware::{ok, ApiResult, Created, SessionStudy};
use crate::types::Role;

fn summary_search(params: &QueryParams) -> Result<AccountSummarySearch, ApiError> {
    Ok(AccountSummarySearch {
        offset_by: params.int("offsetBy", 0)?,
        page_size: params.int("pageSize", config().api.default_page_size)?,
        email_filter: params.string("emailFilter").map(str::to_string),
        phone_filter: params.string("phoneFilter").map(str::to_string),
        role: params.parsed::<Role>("roles")?,
        status: params.parsed::<AccountStatus>("status")?,
        start_time: params.timestamp("startTime")?,
        end_time: params.timestamp("endTime")?,
    })
}

/// GET /v3/participants
pub async fn get_participants(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    params: QueryParams,
) -> ApiResult<Json<PagedResourceList<AccountSummary>>> {
    session.require_any(&[Role::Researcher])?;
    let search = summary_search(&params)?;
    let page = state.accounts.get_paged_account_summaries(&study, &search).await?;

    let mut list = PagedResourceList::new(page.items, page.total);
    // Echo the effective search, defaults included
    if let Ok(Value::Object(fields)) = serde_json::to_value(&search) {
        for (key, value) in fields {
            list = list.with_param(&key, value);
        }
    }
    Ok(Json(list))
}

/// POST /v3/participants
pub async fn create_participant(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    JsonBody(account): JsonBody<Account>,
) -> ApiResult<Created<IdentifierHolder>> {
    session.require_any(&[Role::Researcher])?;
    let created = state.accounts.create_account(&study, session.roles, account).await?;
    Ok(Created(IdentifierHolder::new(created.id)))
}

/// GET /v3/participants/:userId
pub async fn get_participant(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Typed<Account>>> {
    session.require_any(&[Role::Researcher])?;
    Ok(ok(state.accounts.get_account(&study, &user_id).await?))
}

/// POST /v3/participants/:userId
pub async fn update_participant(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(user_id): Path<String>,
    JsonBody(changes): JsonBody<Account>,
) -> ApiResult<Json<StatusMessage>> {
    session.require_any(&[Role::Researcher])?;
    state
        .accounts
        .update_account(&study, session.roles, &user_id, changes)
        .await?;
    Ok(Json(StatusMessage::new("Participant updated.")))
}

/// DELETE /v3/participants/:userId
pub async fn delete_participant(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Extension(SessionStudy(study)): Extension<SessionStudy>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<StatusMessage>> {
    session.require_any(&[Role::Admin])?;
    state.accounts.delete_account(&study, &user_id).await?;
    Ok(Json(StatusMessage::new("User deleted.")))
}
